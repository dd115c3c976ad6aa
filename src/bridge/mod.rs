// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The bridge context and its event handlers.
//!
//! [`Bridge`] owns every piece of mutable state: device lifecycle, command
//! queue, published-state cache, discovery attributes and timer bookkeeping.
//! Each handler is a synchronous transition that takes the current instant
//! and records the side effects it wants as [`Action`]s. The runtime drains
//! them with [`Bridge::take_actions`] and performs the I/O, so the whole
//! protocol can be driven in tests without a serial port or broker.
//!
//! # Examples
//!
//! ```
//! use std::time::{Duration, Instant};
//!
//! use optoma_bridge::bridge::{Action, Bridge};
//! use optoma_bridge::command::CommandTable;
//! use optoma_bridge::config::{BridgeConfig, Lookups};
//!
//! let config = BridgeConfig::from_json(r#"{
//!     "serial_device": "/dev/ttyUSB0",
//!     "mqtt_conf": { "host": "localhost", "topic_prefix": "projector" }
//! }"#).unwrap();
//! let commands = CommandTable::from_json(r#"{ "query": { "power": "124 1" } }"#).unwrap();
//! let lookups = Lookups::from_json("{}").unwrap();
//!
//! let now = Instant::now();
//! let mut bridge = Bridge::new(&config, commands, lookups, now);
//! bridge.start(now);
//!
//! // Discovery goes out once the enqueue debounce has elapsed.
//! bridge.on_dispatch_due(now + Duration::from_millis(100));
//! assert_eq!(bridge.take_actions(), vec![Action::Write(b"AMX\r".to_vec())]);
//! ```

mod device;
mod inbound;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::command::resolver::{Resolver, frame};
use crate::command::{CommandTable, LogicalCommand};
use crate::config::{BridgeConfig, HookPoint, Lookups, SetupHooks, Timing};
use crate::error::FatalError;
use crate::protocol::framer::FrameAssembler;
use crate::response::{DiscoveryInfo, InfoString};
use crate::scheduler::{Arm, DiscardReason, Dispatch, Scheduler};
use crate::state::{DeviceState, Publication, StateChange, StatePublisher};

pub use inbound::{slug, translate};

/// A side effect requested by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write framed bytes to the device.
    Write(Vec<u8>),
    /// Publish a message on the bus.
    Publish(Publication),
    /// Terminate the bridge.
    Exit(FatalError),
}

/// Bridge context.
#[derive(Debug)]
pub struct Bridge {
    resolver: Resolver,
    lookups: Lookups,
    hooks: SetupHooks,
    expected_identity: HashMap<String, String>,
    timing: Timing,
    ping_topic: String,

    framer: FrameAssembler,
    state: DeviceState,
    scheduler: Scheduler,
    publisher: StatePublisher,
    discovery: DiscoveryInfo,
    last_info: Option<InfoString>,
    poll_enabled: bool,
    seen_device: bool,
    last_received: Instant,
    last_bus_activity: Instant,

    actions: Vec<Action>,
}

impl Bridge {
    /// Creates a bridge from validated configuration and tables.
    ///
    /// `now` seeds the receive and bus activity clocks.
    #[must_use]
    pub fn new(
        config: &BridgeConfig,
        commands: CommandTable,
        lookups: Lookups,
        now: Instant,
    ) -> Self {
        Self {
            resolver: Resolver::new(commands, config.device_id),
            lookups,
            hooks: config.setup.clone(),
            expected_identity: config.expected_identity.clone(),
            timing: config.timing,
            ping_topic: config.mqtt.ping_topic(),
            framer: FrameAssembler::new(config.timing.max_line_len),
            state: DeviceState::new(),
            scheduler: Scheduler::new(),
            publisher: StatePublisher::new(config.mqtt.topic_prefix.clone()),
            discovery: DiscoveryInfo::default(),
            last_info: None,
            poll_enabled: true,
            seen_device: false,
            last_received: now,
            last_bus_activity: now,
            actions: Vec::new(),
        }
    }

    /// Queues the discovery handshake ahead of everything else.
    pub fn start(&mut self, now: Instant) {
        tracing::info!(address = %self.resolver.address(), "Starting bridge");
        self.enqueue_first(LogicalCommand::discovery(), now);
    }

    /// Returns and clears the actions recorded so far.
    pub fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    /// Returns when the dispatcher wants to run next.
    #[must_use]
    pub fn dispatch_deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    /// Returns the topics the bridge listens on.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        let prefix = self.publisher.prefix();
        vec![
            self.ping_topic.clone(),
            format!("{prefix}/+/set"),
            format!("{prefix}/+/query"),
            format!("{prefix}/key"),
        ]
    }

    /// Returns the device state.
    #[must_use]
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Returns the command queue.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Returns the attributes reported by discovery.
    #[must_use]
    pub fn discovery(&self) -> &DiscoveryInfo {
        &self.discovery
    }

    /// Returns `true` if device polling is on.
    #[must_use]
    pub fn poll_enabled(&self) -> bool {
        self.poll_enabled
    }

    /// Returns the timer configuration.
    #[must_use]
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Runs the dispatcher: evaluates the queue head and re-arms the timer.
    ///
    /// Called when the dispatch deadline fires. An empty queue leaves the
    /// timer disarmed until the next enqueue.
    pub fn on_dispatch_due(&mut self, now: Instant) {
        self.scheduler.disarm();

        match self.scheduler.decide(&self.state) {
            Dispatch::Idle => {}
            Dispatch::Pause(hold) if hold.is_zero() => {
                self.arm(now, self.timing.skip_ms, Arm::IfIdle);
            }
            Dispatch::Pause(hold) => {
                tracing::debug!(seconds = hold.as_secs(), "Pausing command queue");
                self.scheduler.arm(now, hold, Arm::Replace);
            }
            Dispatch::SetPoll(enabled) => {
                if let Some(enabled) = enabled {
                    self.poll_enabled = enabled;
                }
                tracing::info!(enabled = self.poll_enabled, "Device polling");
                self.arm(now, self.timing.skip_ms, Arm::IfIdle);
            }
            Dispatch::Discard(cmd, DiscardReason::NoPower) => {
                tracing::debug!(command = %cmd, "No power to device, dropping command");
                self.arm(now, self.timing.skip_ms, Arm::IfIdle);
            }
            Dispatch::Discard(cmd, DiscardReason::PoweredOff) => {
                tracing::warn!(command = %cmd, "Device is off, dropping command");
                self.arm(now, self.timing.skip_ms, Arm::IfIdle);
            }
            Dispatch::Deferred(cmd) => {
                tracing::debug!(command = %cmd, "Device warming up, holding command");
                self.arm(now, self.timing.skip_ms, Arm::IfIdle);
            }
            Dispatch::Send(cmd) => self.send(cmd, now),
        }
    }

    /// Keepalive poll of the device.
    ///
    /// Queues `query info_string` when the device is on, `query power`
    /// otherwise. While warming a second `query power` goes in and the
    /// dispatcher is moved out so the device gets time to settle.
    pub fn on_keepalive_poll(&mut self, now: Instant) {
        if !self.poll_enabled {
            return;
        }
        if self.state.is_powered_on() {
            self.enqueue_first(LogicalCommand::query_info_string(), now);
            return;
        }
        self.enqueue_first(LogicalCommand::query_power(), now);
        if self.state.is_warming() {
            self.enqueue_first(LogicalCommand::query_power(), now);
            self.arm(now, self.timing.warming_poll_ms, Arm::Replace);
        }
    }

    /// Publishes the bus heartbeat.
    pub fn on_bus_ping(&mut self, _now: Instant) {
        let payload = json!({ "timestamp": chrono::Local::now().to_rfc2822() });
        tracing::trace!(topic = %self.ping_topic, "Bus ping");
        self.actions.push(Action::Publish(Publication {
            topic: self.ping_topic.clone(),
            payload: payload.to_string(),
        }));
    }

    /// Inactivity watchdog.
    ///
    /// Bus silence past the limit is fatal. Device silence past its limit,
    /// while polling a device that had power, is treated as power loss.
    pub fn on_watchdog(&mut self, now: Instant) {
        let idle = now.saturating_duration_since(self.last_bus_activity);
        if idle >= Duration::from_millis(self.timing.bus_inactivity_ms) {
            tracing::error!(idle_secs = idle.as_secs(), "No message bus activity");
            self.actions.push(Action::Exit(FatalError::BusInactivity { idle }));
            return;
        }

        let silence = now.saturating_duration_since(self.last_received);
        if self.poll_enabled
            && self.state.has_power()
            && silence > Duration::from_millis(self.timing.receive_silence_ms)
        {
            tracing::warn!(silence_secs = silence.as_secs(), "No power to device");
            let changes = self.state.on_power_loss();
            self.discovery.clear();
            self.last_info = None;
            self.publish_changes(changes, false);
        }
    }

    fn send(&mut self, cmd: LogicalCommand, now: Instant) {
        match self.resolver.resolve(&cmd) {
            Ok(wire) => {
                tracing::debug!(command = %cmd, wire = %wire, "Sending command");
                tracing::trace!(line = %wire, "TX");
                self.actions.push(Action::Write(frame(&wire)));
                self.scheduler.record_sent(cmd, wire, now);
            }
            Err(e) => tracing::warn!(command = %cmd, error = %e, "Unexpected command"),
        }
        self.arm(now, self.timing.safety_ms, Arm::IfIdle);
    }

    fn enqueue(&mut self, cmd: LogicalCommand, now: Instant) {
        tracing::debug!(command = %cmd, "Queued");
        self.scheduler.push_back(cmd);
        self.arm(now, self.timing.enqueue_debounce_ms, Arm::IfIdle);
    }

    fn enqueue_first(&mut self, cmd: LogicalCommand, now: Instant) {
        tracing::debug!(command = %cmd, "Queued first");
        self.scheduler.push_front(cmd);
        self.arm(now, self.timing.enqueue_debounce_ms, Arm::IfIdle);
    }

    fn arm(&mut self, now: Instant, delay_ms: u64, mode: Arm) {
        self.scheduler.arm(now, Duration::from_millis(delay_ms), mode);
    }

    fn run_hook(&mut self, point: HookPoint, now: Instant) {
        let commands = match self.hooks.commands(point) {
            Ok(commands) => commands,
            Err(e) => {
                tracing::warn!(hook = point.as_str(), error = %e, "Invalid setup hook");
                return;
            }
        };
        if commands.is_empty() {
            return;
        }
        tracing::info!(hook = point.as_str(), count = commands.len(), "Running setup hook");
        for cmd in commands {
            self.enqueue(cmd, now);
        }
    }

    fn publish_changes(&mut self, changes: Vec<StateChange>, force: bool) {
        for change in changes {
            let value = self.change_value(change);
            self.publish(change.attribute(), value, force);
        }
    }

    fn change_value(&self, change: StateChange) -> Value {
        match change {
            StateChange::Status(code) => self
                .lookups
                .status_label(code.value())
                .map_or_else(|| Value::from(code.value()), Value::from),
            StateChange::Power(on) => self.power_value(on),
        }
    }

    fn power_value(&self, on: bool) -> Value {
        match self.lookups.label("power", i64::from(on)) {
            Some(label) => Value::from(label),
            None => Value::from(if on { "on" } else { "off" }),
        }
    }

    fn publish(&mut self, attribute: &str, value: impl Into<Value>, force: bool) {
        if let Some(publication) = self.publisher.publish(attribute, value, force) {
            self.actions.push(Action::Publish(publication));
        }
    }
}
