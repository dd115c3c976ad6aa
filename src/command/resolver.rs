// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolution of logical commands into wire strings.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::command::{LogicalCommand, Verb};
use crate::error::{CommandError, ConfigError};

/// Placeholders accepted in command templates.
const PLACEHOLDERS: [&str; 2] = ["%s", "%d"];

/// Byte that terminates every command on the wire.
pub const LINE_TERMINATOR: u8 = b'\r';

/// Two-level table `verb → noun path → wire template`.
///
/// A noun path is either a bare noun (`volume`) or a noun with its argument
/// (`power.on`). Templates may contain a single `%s` or `%d` placeholder that
/// receives the command argument.
///
/// # Examples
///
/// ```
/// use optoma_bridge::command::{CommandTable, LogicalCommand};
///
/// let table = CommandTable::from_json(r#"{
///     "set": { "power.on": "00 1", "volume": "140 %d" }
/// }"#).unwrap();
///
/// let on: LogicalCommand = "set.power.on".parse().unwrap();
/// assert_eq!(table.resolve(&on).unwrap(), "00 1");
///
/// let volume: LogicalCommand = "set.volume.12".parse().unwrap();
/// assert_eq!(table.resolve(&volume).unwrap(), "140 12");
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct CommandTable {
    verbs: HashMap<String, HashMap<String, String>>,
}

impl CommandTable {
    /// Loads and validates a table from a JSON file.
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
        let table: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })?;
        table.validate()?;
        Ok(table)
    }

    /// Parses and validates a table from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let table: Self = serde_json::from_str(json).map_err(|source| ConfigError::Json {
            path: "<inline>".to_string(),
            source,
        })?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (verb, nouns) in &self.verbs {
            if verb.is_empty() {
                return Err(ConfigError::invalid("commands", "empty verb"));
            }
            for (noun, template) in nouns {
                let count: usize = PLACEHOLDERS
                    .iter()
                    .map(|p| template.matches(p).count())
                    .sum();
                if count > 1 {
                    return Err(ConfigError::invalid(
                        format!("commands.{verb}.{noun}"),
                        "template has more than one placeholder",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Returns the number of verbs in the table.
    #[must_use]
    pub fn verb_count(&self) -> usize {
        self.verbs.len()
    }

    /// Resolves a logical command to its wire token, without device address.
    ///
    /// Looks up `verb → noun.argument` first, then falls back to a `verb → noun`
    /// template with a placeholder for the argument. The discovery command
    /// resolves to its fixed token.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Unresolvable` if neither lookup succeeds.
    pub fn resolve(&self, cmd: &LogicalCommand) -> Result<String, CommandError> {
        if cmd.verb() == &Verb::Discovery {
            return Ok(LogicalCommand::DISCOVERY_TOKEN.to_string());
        }

        let unresolvable = || CommandError::Unresolvable {
            command: cmd.to_string(),
        };

        let nouns = self.verbs.get(cmd.verb().as_str()).ok_or_else(unresolvable)?;

        if let Some(wire) = nouns.get(&cmd.path()) {
            return Ok(wire.clone());
        }

        let template = nouns.get(cmd.noun()).ok_or_else(unresolvable)?;
        let argument = cmd.argument().ok_or_else(unresolvable)?;
        substitute(template, argument).ok_or_else(unresolvable)
    }
}

/// Replaces the template's placeholder with `argument`.
///
/// Returns `None` if there is no placeholder, or if `%d` receives a
/// non-numeric argument.
fn substitute(template: &str, argument: &str) -> Option<String> {
    let (at, placeholder) = PLACEHOLDERS
        .iter()
        .filter_map(|p| template.find(p).map(|at| (at, *p)))
        .min_by_key(|(at, _)| *at)?;

    if placeholder == "%d" && argument.parse::<i64>().is_err() {
        return None;
    }

    let mut out = String::with_capacity(template.len() + argument.len());
    out.push_str(&template[..at]);
    out.push_str(argument);
    out.push_str(&template[at + placeholder.len()..]);
    Some(out)
}

/// Resolves logical commands into complete, addressed wire commands.
#[derive(Debug, Clone)]
pub struct Resolver {
    table: CommandTable,
    address: String,
}

impl Resolver {
    /// Creates a resolver for the device with the given numeric id.
    ///
    /// The address token is `~` followed by the id zero-padded to two digits.
    #[must_use]
    pub fn new(table: CommandTable, device_id: u8) -> Self {
        Self {
            table,
            address: format!("~{device_id:02}"),
        }
    }

    /// Returns the device address token.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Resolves a command to the string written to the device, without the
    /// line terminator.
    ///
    /// The discovery command is sent bare; every other command carries the
    /// device address.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Unresolvable` if the table has no entry.
    pub fn resolve(&self, cmd: &LogicalCommand) -> Result<String, CommandError> {
        let token = self.table.resolve(cmd)?;
        if cmd.verb() == &Verb::Discovery {
            Ok(token)
        } else {
            Ok(format!("{}{token}", self.address))
        }
    }
}

/// Appends the line terminator to a resolved command.
#[must_use]
pub fn frame(wire: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(wire.len() + 1);
    bytes.extend_from_slice(wire.as_bytes());
    bytes.push(LINE_TERMINATOR);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CommandTable {
        CommandTable::from_json(
            r#"{
                "set": {
                    "power.on": "00 1",
                    "power.off": "00 0",
                    "input.hdmi1": "12 1",
                    "volume": "140 %d",
                    "brightness": "46 %s"
                },
                "query": { "power": "124 1", "info_string": "150 1" },
                "key": { "menu": "140 20" }
            }"#,
        )
        .unwrap()
    }

    fn cmd(s: &str) -> LogicalCommand {
        s.parse().unwrap()
    }

    #[test]
    fn direct_entry_with_argument() {
        assert_eq!(table().resolve(&cmd("set.input.hdmi1")).unwrap(), "12 1");
    }

    #[test]
    fn direct_entry_without_argument() {
        assert_eq!(table().resolve(&cmd("query.power")).unwrap(), "124 1");
    }

    #[test]
    fn template_substitution() {
        assert_eq!(table().resolve(&cmd("set.volume.25")).unwrap(), "140 25");
        assert_eq!(table().resolve(&cmd("set.brightness.-5")).unwrap(), "46 -5");
    }

    #[test]
    fn numeric_placeholder_rejects_text() {
        assert!(table().resolve(&cmd("set.volume.loud")).is_err());
    }

    #[test]
    fn template_without_argument_is_unresolvable() {
        assert!(table().resolve(&cmd("set.volume")).is_err());
    }

    #[test]
    fn unknown_verb_and_noun() {
        let err = table().resolve(&cmd("zoom.in")).unwrap_err();
        assert_eq!(
            err,
            CommandError::Unresolvable {
                command: "zoom.in".to_string()
            }
        );
        assert!(table().resolve(&cmd("set.input.vga")).is_err());
    }

    #[test]
    fn discovery_is_fixed() {
        assert_eq!(
            CommandTable::default()
                .resolve(&LogicalCommand::discovery())
                .unwrap(),
            "AMX"
        );
    }

    #[test]
    fn rejects_two_placeholders() {
        let result = CommandTable::from_json(r#"{"set": {"pos": "1 %s %d"}}"#);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn resolver_prefixes_address() {
        let resolver = Resolver::new(table(), 1);
        assert_eq!(resolver.address(), "~01");
        assert_eq!(resolver.resolve(&cmd("set.power.on")).unwrap(), "~0100 1");
        assert_eq!(resolver.resolve(&LogicalCommand::discovery()).unwrap(), "AMX");
    }

    #[test]
    fn frame_appends_carriage_return() {
        assert_eq!(frame("~0000 1"), b"~0000 1\r".to_vec());
    }
}
