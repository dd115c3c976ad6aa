// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `optoma_bridge` - Bridge an Optoma projector's RS-232 port to MQTT.
//!
//! The projector speaks a line-oriented ASCII protocol and accepts only one
//! command at a time. The bridge translates bus messages into projector
//! commands, paces them through a single queue gated by the projector's power
//! lifecycle, and publishes the projector's state back to the bus.
//!
//! # Architecture
//!
//! - [`command`]: logical commands (`verb.noun.argument`) and their
//!   resolution into wire strings through the command table
//! - [`response`]: classification of device lines, info-string and discovery
//!   parsing
//! - [`state`]: the lifecycle state machine and the debounced publisher
//! - [`scheduler`]: the command queue and its single dispatch timer
//! - [`bridge`]: the context tying them together; handlers return actions
//!   instead of doing I/O
//! - [`protocol`]: line framing, the [`MessageBus`](protocol::MessageBus)
//!   trait, and the MQTT and serial transports
//! - [`runtime`]: the event loop that feeds the bridge
//!
//! # Topics
//!
//! With topic prefix `office/projector`:
//!
//! | Topic                              | Meaning                                   |
//! |------------------------------------|-------------------------------------------|
//! | `office/projector/<name>/set`      | `set.<name>.<payload>`                    |
//! | `office/projector/<name>/query`    | `query.<name>`                            |
//! | `office/projector/key`             | `key.<payload>`                           |
//! | `office/projector/<attribute>`     | published state (`power`, `status`, ...)  |
//! | `office/projector/ping`            | heartbeat, both directions                |
//!
//! # Quick Start
//!
//! ```no_run
//! use optoma_bridge::bridge::Bridge;
//! use optoma_bridge::command::CommandTable;
//! use optoma_bridge::config::{BridgeConfig, Lookups};
//! use optoma_bridge::protocol::{MqttBus, open_port};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> optoma_bridge::Result<()> {
//!     let config = BridgeConfig::load("config.json")?;
//!     let commands = CommandTable::load("commands.json")?;
//!     let lookups = Lookups::load("lookups.json")?;
//!
//!     let port = open_port(&config.serial_device, config.baud_rate)?;
//!     let (bus, events) = MqttBus::from_settings(&config.mqtt)?.build().await?;
//!
//!     let bridge = Bridge::new(&config, commands, lookups, std::time::Instant::now());
//!     let fatal = optoma_bridge::runtime::run(bridge, port, &bus, events).await;
//!     std::process::exit(i32::from(fatal.exit_code()));
//! }
//! ```

pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod protocol;
pub mod response;
pub mod runtime;
pub mod scheduler;
pub mod state;

pub use bridge::{Action, Bridge};
pub use command::{CommandTable, LogicalCommand, Verb};
pub use config::{BridgeConfig, Lookups};
pub use error::{
    CommandError, ConfigError, Error, FatalError, ParseError, ProtocolError, Result,
};
pub use state::{DeviceState, Lifecycle};
