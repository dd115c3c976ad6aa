// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the bridge.
//!
//! Recoverable failures (a malformed line, a command that cannot be resolved)
//! are logged and the bridge keeps running. The conditions in [`FatalError`]
//! terminate the process with a dedicated exit code.

use std::time::Duration;

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred while loading or validating configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error occurred on the serial link or the message bus.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a device response.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A logical command could not be turned into a wire command.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// A condition that must terminate the process.
    #[error("fatal: {0}")]
    Fatal(#[from] FatalError),
}

/// Errors raised while loading the configuration documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for its schema.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// Path of the file.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A value passed schema checks but is semantically invalid.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Description of the problem.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors related to the serial transport and the MQTT bus.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Serial port could not be opened.
    #[cfg(feature = "serial")]
    #[error("serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Reading or writing the transport failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors related to parsing device response lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The numeric part of a status line is not a number.
    #[error("invalid status code: {0:?}")]
    InvalidStatus(String),

    /// An info string has a length with no known field layout.
    #[error("info string has unsupported length {0}")]
    InfoStringLength(usize),

    /// A numeric field of an info string is not a number.
    #[error("failed to parse {field}: {value:?}")]
    InvalidField {
        /// The field that failed to parse.
        field: &'static str,
        /// The raw text of the field.
        value: String,
    },

    /// A discovery segment is not a `key=value` pair.
    #[error("malformed discovery pair: {0:?}")]
    DiscoveryPair(String),
}

/// Errors related to logical commands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No wire command exists for this logical command.
    #[error("no wire command for {command}")]
    Unresolvable {
        /// The dotted form of the logical command.
        command: String,
    },

    /// The text does not describe a logical command.
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),
}

/// Conditions that terminate the bridge.
///
/// Each variant maps to a distinct process exit status so a supervisor can
/// tell a wiring problem apart from a lost connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalError {
    /// The discovery handshake reported a device other than the configured one.
    #[error("identity mismatch on '{attribute}': wanted '{expected}', got '{actual}'")]
    IdentityMismatch {
        /// Discovery attribute that differs.
        attribute: String,
        /// Configured value.
        expected: String,
        /// Value reported by the device.
        actual: String,
    },

    /// Nothing has been received from the bus for too long.
    #[error("no message bus activity for {}s", .idle.as_secs())]
    BusInactivity {
        /// Time since the last bus message.
        idle: Duration,
    },

    /// The connection to the message bus was closed.
    #[error("message bus connection closed")]
    BusConnectionLost,

    /// The serial transport closed or failed.
    #[error("serial transport lost: {0}")]
    TransportLost(String),
}

impl FatalError {
    /// Exit status for an identity mismatch.
    pub const EXIT_IDENTITY_MISMATCH: u8 = 10;
    /// Exit status for bus inactivity or bus connection loss.
    pub const EXIT_BUS_LOST: u8 = 11;
    /// Exit status for a lost serial transport.
    pub const EXIT_TRANSPORT_LOST: u8 = 12;

    /// Returns the process exit status for this condition.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::IdentityMismatch { .. } => Self::EXIT_IDENTITY_MISMATCH,
            Self::BusInactivity { .. } | Self::BusConnectionLost => Self::EXIT_BUS_LOST,
            Self::TransportLost(_) => Self::EXIT_TRANSPORT_LOST,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = ParseError::InfoStringLength(9);
        assert_eq!(err.to_string(), "info string has unsupported length 9");
    }

    #[test]
    fn command_error_display() {
        let err = CommandError::Unresolvable {
            command: "set.volume".to_string(),
        };
        assert_eq!(err.to_string(), "no wire command for set.volume");
    }

    #[test]
    fn error_from_config_error() {
        let err: Error = ConfigError::invalid("device_id", "out of range").into();
        assert!(matches!(err, Error::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn fatal_exit_codes_are_distinct() {
        let identity = FatalError::IdentityMismatch {
            attribute: "make".to_string(),
            expected: "Optoma".to_string(),
            actual: "Other".to_string(),
        };
        let idle = FatalError::BusInactivity {
            idle: Duration::from_secs(90),
        };

        assert_eq!(identity.exit_code(), 10);
        assert_eq!(idle.exit_code(), 11);
        assert_eq!(FatalError::BusConnectionLost.exit_code(), 11);
        assert_eq!(FatalError::TransportLost("eof".into()).exit_code(), 12);
        assert_ne!(identity.exit_code(), idle.exit_code());
    }

    #[test]
    fn bus_inactivity_display() {
        let err = FatalError::BusInactivity {
            idle: Duration::from_secs(95),
        };
        assert_eq!(err.to_string(), "no message bus activity for 95s");
    }
}
