// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logical commands.
//!
//! A [`LogicalCommand`] is the device-independent description of something
//! the bridge should do: a verb, a noun and an optional argument. It is written
//! in dotted form in configuration files and logs:
//!
//! | Dotted form | Verb | Noun | Argument |
//! |-------------|------|------|----------|
//! | `set.power.on` | `set` | `power` | `on` |
//! | `query.info_string` | `query` | `info_string` | - |
//! | `key.menu` | `key` | `menu` | - |
//! | `pause.5` | `pause` | `5` | - |
//! | `AMX` | discovery | - | - |
//!
//! Logical commands are turned into wire strings by the
//! [`CommandTable`](resolver::CommandTable).
//!
//! # Examples
//!
//! ```
//! use optoma_bridge::command::{LogicalCommand, Verb};
//!
//! let cmd: LogicalCommand = "set.input.hdmi1".parse().unwrap();
//! assert_eq!(cmd.verb(), &Verb::Set);
//! assert_eq!(cmd.noun(), "input");
//! assert_eq!(cmd.argument(), Some("hdmi1"));
//! assert_eq!(cmd.to_string(), "set.input.hdmi1");
//! ```

pub mod resolver;

use std::fmt;
use std::str::FromStr;

use crate::error::CommandError;

pub use resolver::CommandTable;

/// The verb of a logical command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Change a device setting.
    Set,
    /// Read a device setting.
    Query,
    /// Emulate a remote-control key press.
    Key,
    /// Hold the queue for a number of seconds.
    Pause,
    /// Meta marker for a setup hook.
    Setup,
    /// The discovery handshake.
    Discovery,
    /// Any other verb found in the command table.
    Other(String),
}

impl Verb {
    /// Returns the textual form used in command tables and topics.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Set => "set",
            Self::Query => "query",
            Self::Key => "key",
            Self::Pause => "pause",
            Self::Setup => "setup",
            Self::Discovery => LogicalCommand::DISCOVERY_TOKEN,
            Self::Other(verb) => verb,
        }
    }
}

impl From<&str> for Verb {
    fn from(s: &str) -> Self {
        match s {
            "set" => Self::Set,
            "query" => Self::Query,
            "key" => Self::Key,
            "pause" => Self::Pause,
            "setup" => Self::Setup,
            LogicalCommand::DISCOVERY_TOKEN => Self::Discovery,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands that may be sent whatever the power, warm-up or cool-down state.
const EXEMPT: &[&str] = &[
    "AMX",
    "key.info",
    "key.poweron",
    "key.power_on",
    "query.power",
    "set.power.on",
    "query.info_string",
];

/// Commands that start a device shutdown.
const SHUTDOWN: &[&str] = &["set.power.off", "key.poweroff", "key.power_off"];

/// A verb, a noun and an optional argument.
///
/// Immutable once built; equality compares all three parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalCommand {
    verb: Verb,
    noun: String,
    argument: Option<String>,
}

impl LogicalCommand {
    /// Wire token, and verb, of the discovery handshake.
    pub const DISCOVERY_TOKEN: &'static str = "AMX";

    /// Creates a command with a verb and a noun.
    #[must_use]
    pub fn new(verb: impl Into<Verb>, noun: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            noun: noun.into(),
            argument: None,
        }
    }

    /// Creates a command with a verb, a noun and an argument.
    #[must_use]
    pub fn with_argument(
        verb: impl Into<Verb>,
        noun: impl Into<String>,
        argument: impl Into<String>,
    ) -> Self {
        Self {
            verb: verb.into(),
            noun: noun.into(),
            argument: Some(argument.into()),
        }
    }

    /// The discovery handshake command.
    #[must_use]
    pub fn discovery() -> Self {
        Self::new(Verb::Discovery, "")
    }

    /// `query.power`
    #[must_use]
    pub fn query_power() -> Self {
        Self::new(Verb::Query, "power")
    }

    /// `query.info_string`
    #[must_use]
    pub fn query_info_string() -> Self {
        Self::new(Verb::Query, "info_string")
    }

    /// Returns the verb.
    #[must_use]
    pub fn verb(&self) -> &Verb {
        &self.verb
    }

    /// Returns the noun. Empty for the discovery command.
    #[must_use]
    pub fn noun(&self) -> &str {
        &self.noun
    }

    /// Returns the argument, if any.
    #[must_use]
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// Returns `true` if the command has the given verb and noun.
    #[must_use]
    pub fn is(&self, verb: &Verb, noun: &str) -> bool {
        &self.verb == verb && self.noun == noun
    }

    /// Returns `true` for `set.poll.*`.
    #[must_use]
    pub fn is_poll_toggle(&self) -> bool {
        self.is(&Verb::Set, "poll")
    }

    /// Returns `true` if the command may be sent regardless of device state.
    #[must_use]
    pub fn is_exempt(&self) -> bool {
        EXEMPT.contains(&self.to_string().as_str())
    }

    /// Returns `true` if the command starts a device shutdown.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        SHUTDOWN.contains(&self.to_string().as_str())
    }

    /// Returns the table path under the verb: `noun` or `noun.argument`.
    #[must_use]
    pub fn path(&self) -> String {
        match &self.argument {
            Some(arg) => format!("{}.{arg}", self.noun),
            None => self.noun.clone(),
        }
    }
}

impl fmt::Display for LogicalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb.as_str())?;
        if !self.noun.is_empty() {
            write!(f, ".{}", self.noun)?;
        }
        if let Some(arg) = &self.argument {
            write!(f, ".{arg}")?;
        }
        Ok(())
    }
}

impl FromStr for LogicalCommand {
    type Err = CommandError;

    /// Parses the dotted form. Everything after the second dot is the argument.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '.');
        let verb = parts.next().unwrap_or_default();
        if verb.is_empty() {
            return Err(CommandError::InvalidCommand(s.to_string()));
        }
        let noun = parts.next().unwrap_or_default();
        if noun.is_empty() && verb != Self::DISCOVERY_TOKEN {
            return Err(CommandError::InvalidCommand(s.to_string()));
        }

        Ok(Self {
            verb: Verb::from(verb),
            noun: noun.to_string(),
            argument: parts.next().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_three_parts() {
        let cmd: LogicalCommand = "set.power.on".parse().unwrap();
        assert_eq!(cmd, LogicalCommand::with_argument(Verb::Set, "power", "on"));
    }

    #[test]
    fn parse_keeps_dotted_argument() {
        let cmd: LogicalCommand = "set.zoom.in.fast".parse().unwrap();
        assert_eq!(cmd.argument(), Some("in.fast"));
        assert_eq!(cmd.path(), "zoom.in.fast");
    }

    #[test]
    fn parse_discovery() {
        let cmd: LogicalCommand = "AMX".parse().unwrap();
        assert_eq!(cmd, LogicalCommand::discovery());
        assert_eq!(cmd.to_string(), "AMX");
    }

    #[test]
    fn parse_rejects_bare_verb() {
        assert!("set".parse::<LogicalCommand>().is_err());
        assert!("".parse::<LogicalCommand>().is_err());
    }

    #[test]
    fn unknown_verb_is_kept() {
        let cmd: LogicalCommand = "custom.thing".parse().unwrap();
        assert_eq!(cmd.verb(), &Verb::Other("custom".to_string()));
        assert_eq!(cmd.to_string(), "custom.thing");
    }

    #[test]
    fn exempt_commands() {
        assert!(LogicalCommand::query_power().is_exempt());
        assert!(LogicalCommand::discovery().is_exempt());
        assert!(LogicalCommand::query_info_string().is_exempt());
        assert!(LogicalCommand::with_argument(Verb::Set, "power", "on").is_exempt());
        assert!(!LogicalCommand::with_argument(Verb::Set, "power", "off").is_exempt());
        assert!(!LogicalCommand::with_argument(Verb::Set, "input", "hdmi1").is_exempt());
    }

    #[test]
    fn shutdown_commands() {
        assert!(LogicalCommand::with_argument(Verb::Set, "power", "off").is_shutdown());
        assert!(LogicalCommand::new(Verb::Key, "power_off").is_shutdown());
        assert!(!LogicalCommand::new(Verb::Key, "menu").is_shutdown());
    }

    #[test]
    fn poll_toggle() {
        assert!(LogicalCommand::with_argument(Verb::Set, "poll", "off").is_poll_toggle());
        assert!(!LogicalCommand::query_power().is_poll_toggle());
    }
}
