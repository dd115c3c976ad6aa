// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge configuration.
//!
//! Three JSON documents configure the bridge:
//!
//! - `config.json` - [`BridgeConfig`]: serial port, MQTT broker, device id,
//!   setup hooks, expected device identity and timer overrides
//! - `commands.json` - [`CommandTable`](crate::command::CommandTable)
//! - `lookups.json` - [`Lookups`]
//!
//! # Examples
//!
//! ```
//! use optoma_bridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::from_json(r#"{
//!     "serial_device": "/dev/ttyUSB0",
//!     "device_id": 1,
//!     "mqtt_conf": { "host": "broker.local", "topic_prefix": "projector" }
//! }"#).unwrap();
//!
//! assert_eq!(config.baud_rate, 9600);
//! assert_eq!(config.mqtt.port, 1883);
//! assert_eq!(config.mqtt.ping_topic(), "projector/ping");
//! ```

pub mod lookup;

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::command::LogicalCommand;
use crate::error::ConfigError;

pub use lookup::Lookups;

/// Top-level configuration from `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Path of the serial device.
    pub serial_device: String,
    /// Serial baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Projector RS-232 id (0-99).
    #[serde(default)]
    pub device_id: u8,
    /// Log every raw line sent and received.
    #[serde(default)]
    pub raw_data: bool,
    /// Log state updates and setup hook execution.
    #[serde(default)]
    pub verbose: bool,
    /// Log command dispatch details.
    #[serde(default)]
    pub debug: bool,
    /// Topic that receives `stop` as last will when set.
    #[serde(default)]
    pub status_topic: Option<String>,
    /// MQTT connection settings.
    #[serde(rename = "mqtt_conf")]
    pub mqtt: MqttSettings,
    /// Commands run at lifecycle transition points.
    #[serde(default)]
    pub setup: SetupHooks,
    /// Expected discovery attributes. Any mismatch is fatal.
    #[serde(default, rename = "amx")]
    pub expected_identity: HashMap<String, String>,
    /// Timer overrides.
    #[serde(default)]
    pub timing: Timing,
}

fn default_baud_rate() -> u32 {
    9600
}

impl BridgeConfig {
    /// Loads and validates the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates the configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Json {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id > 99 {
            return Err(ConfigError::invalid(
                "device_id",
                format!("{} is outside 0..=99", self.device_id),
            ));
        }
        if self.mqtt.host.is_empty() {
            return Err(ConfigError::invalid("mqtt_conf.host", "must not be empty"));
        }
        if self.mqtt.topic_prefix.is_empty() {
            return Err(ConfigError::invalid(
                "mqtt_conf.topic_prefix",
                "must not be empty",
            ));
        }
        self.timing.validate()?;
        // Parse every hook now so a typo fails at startup.
        for point in [HookPoint::OnStart, HookPoint::OnReady, HookPoint::OnShutdown] {
            self.setup.commands(point)?;
        }
        Ok(())
    }
}

/// MQTT connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// `mqtt` or `mqtts`.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Optional user name.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive: u64,
    /// CA bundle for `mqtts`.
    #[serde(default)]
    pub cafile: Option<String>,
    /// Prefix of every device topic.
    pub topic_prefix: String,
    /// Heartbeat topic. Defaults to `<topic_prefix>/ping`.
    #[serde(default)]
    ping_topic: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_protocol() -> String {
    "mqtt".to_string()
}

fn default_keepalive() -> u64 {
    30
}

impl MqttSettings {
    /// Returns the heartbeat topic.
    #[must_use]
    pub fn ping_topic(&self) -> String {
        self.ping_topic
            .clone()
            .unwrap_or_else(|| format!("{}/ping", self.topic_prefix))
    }

    /// Returns `true` if the connection should use TLS.
    #[must_use]
    pub fn use_tls(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("mqtts")
    }
}

/// Named lists of dotted commands run at lifecycle transition points.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetupHooks {
    #[serde(default)]
    on_start: Vec<String>,
    #[serde(default)]
    on_ready: Vec<String>,
    #[serde(default)]
    on_shutdown: Vec<String>,
}

/// Lifecycle transition points that run setup hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// First line received from the device, or first line after power loss.
    OnStart,
    /// Device reported ready after power-on.
    OnReady,
    /// A shutdown command was received while the device was on.
    OnShutdown,
}

impl HookPoint {
    /// Returns the configuration key of the hook.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnStart => "on_start",
            Self::OnReady => "on_ready",
            Self::OnShutdown => "on_shutdown",
        }
    }
}

impl SetupHooks {
    /// Creates hooks from lists of dotted commands.
    #[must_use]
    pub fn new(on_start: Vec<String>, on_ready: Vec<String>, on_shutdown: Vec<String>) -> Self {
        Self {
            on_start,
            on_ready,
            on_shutdown,
        }
    }

    /// Returns the parsed commands of a hook.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an entry is not a valid dotted command.
    pub fn commands(&self, point: HookPoint) -> Result<Vec<LogicalCommand>, ConfigError> {
        let raw = match point {
            HookPoint::OnStart => &self.on_start,
            HookPoint::OnReady => &self.on_ready,
            HookPoint::OnShutdown => &self.on_shutdown,
        };
        raw.iter()
            .map(|s| {
                s.parse::<LogicalCommand>().map_err(|e| {
                    ConfigError::invalid(format!("setup.{}", point.as_str()), e.to_string())
                })
            })
            .collect()
    }
}

/// Timer intervals, in milliseconds unless noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Dispatch delay after an enqueue.
    pub enqueue_debounce_ms: u64,
    /// Dispatch delay after a device line.
    pub line_received_ms: u64,
    /// Re-check delay after the device reports warming.
    pub warming_recheck_ms: u64,
    /// Re-check delay after the device accepts power-on.
    pub power_on_recheck_ms: u64,
    /// Dispatch re-arm while polling a warming device.
    pub warming_poll_ms: u64,
    /// Dispatch delay after an item is skipped.
    pub skip_ms: u64,
    /// Dispatch re-arm after a send.
    pub safety_ms: u64,
    /// Device keepalive poll period.
    pub keepalive_poll_ms: u64,
    /// Bus heartbeat period.
    pub bus_ping_ms: u64,
    /// Inactivity watchdog period.
    pub watchdog_ms: u64,
    /// Bus silence that terminates the bridge.
    pub bus_inactivity_ms: u64,
    /// Device silence that counts as power loss.
    pub receive_silence_ms: u64,
    /// Longest line the frame assembler buffers, in bytes.
    pub max_line_len: usize,
}

/// Upper bound for every timing value, one day.
const MAX_TIMING_MS: u64 = 24 * 60 * 60 * 1000;

impl Timing {
    fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("enqueue_debounce_ms", self.enqueue_debounce_ms),
            ("line_received_ms", self.line_received_ms),
            ("warming_recheck_ms", self.warming_recheck_ms),
            ("power_on_recheck_ms", self.power_on_recheck_ms),
            ("warming_poll_ms", self.warming_poll_ms),
            ("skip_ms", self.skip_ms),
            ("safety_ms", self.safety_ms),
            ("keepalive_poll_ms", self.keepalive_poll_ms),
            ("bus_ping_ms", self.bus_ping_ms),
            ("watchdog_ms", self.watchdog_ms),
            ("bus_inactivity_ms", self.bus_inactivity_ms),
            ("receive_silence_ms", self.receive_silence_ms),
        ];
        for (field, value) in intervals {
            if value > MAX_TIMING_MS {
                return Err(ConfigError::invalid(
                    format!("timing.{field}"),
                    format!("{value} exceeds {MAX_TIMING_MS}"),
                ));
            }
        }
        // Periodic timers need a non-zero period.
        for (field, value) in [
            ("keepalive_poll_ms", self.keepalive_poll_ms),
            ("bus_ping_ms", self.bus_ping_ms),
            ("watchdog_ms", self.watchdog_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(format!("timing.{field}"), "must not be 0"));
            }
        }
        Ok(())
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            enqueue_debounce_ms: 100,
            line_received_ms: 250,
            warming_recheck_ms: 500,
            power_on_recheck_ms: 7000,
            warming_poll_ms: 5000,
            skip_ms: 1000,
            safety_ms: 2000,
            keepalive_poll_ms: 10_000,
            bus_ping_ms: 60_000,
            watchdog_ms: 5000,
            bus_inactivity_ms: 90_000,
            receive_silence_ms: 31_000,
            max_line_len: 256,
        }
    }
}
