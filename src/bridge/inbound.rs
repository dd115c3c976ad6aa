// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus-side handlers: topic translation and command admission.

use std::time::Instant;

use serde_json::Value;

use crate::command::{LogicalCommand, Verb};
use crate::config::HookPoint;
use crate::state::StateChange;

use super::Bridge;

/// Normalizes a name: lower case, every run of non-alphanumeric characters
/// becomes one `_`, leading and trailing `_` removed.
///
/// # Examples
///
/// ```
/// use optoma_bridge::bridge::slug;
///
/// assert_eq!(slug("Power Off"), "power_off");
/// assert_eq!(slug("  HDMI-1 "), "hdmi_1");
/// ```
#[must_use]
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut gap = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('_');
            }
            gap = false;
            out.push(c);
        } else {
            gap = true;
        }
    }
    out
}

/// Translates an inbound bus message into a logical command.
///
/// | Topic                               | Command                      |
/// |-------------------------------------|------------------------------|
/// | `<prefix>/key`, `<prefix>/key/set`  | `key.<slug(payload)>`        |
/// | `<prefix>/<name>/set`               | `set.<slug(name)>.<payload>` |
/// | `<prefix>/<name>/query`             | `query.<slug(name)>`         |
///
/// The `set` argument is the lower-cased payload, omitted when empty.
/// Returns `None` for any other topic or an empty name.
///
/// # Examples
///
/// ```
/// use optoma_bridge::bridge::translate;
///
/// let cmd = translate("projector/input/set", "HDMI1", "projector").unwrap();
/// assert_eq!(cmd.to_string(), "set.input.hdmi1");
///
/// let cmd = translate("projector/key", "Menu", "projector").unwrap();
/// assert_eq!(cmd.to_string(), "key.menu");
///
/// assert!(translate("projector/input", "x", "projector").is_none());
/// ```
#[must_use]
pub fn translate(topic: &str, payload: &str, prefix: &str) -> Option<LogicalCommand> {
    let topic = topic.to_lowercase();
    let prefix = format!("{}/", prefix.to_lowercase());

    if topic.ends_with("/key") || topic.ends_with("/key/set") {
        let noun = slug(payload);
        return (!noun.is_empty()).then(|| LogicalCommand::new(Verb::Key, noun));
    }

    let (verb, name) = if let Some(name) = topic.strip_suffix("/set") {
        (Verb::Set, name)
    } else if let Some(name) = topic.strip_suffix("/query") {
        (Verb::Query, name)
    } else {
        return None;
    };

    let noun = slug(name.strip_prefix(&prefix).unwrap_or(name));
    if noun.is_empty() {
        return None;
    }

    let argument = payload.trim().to_lowercase();
    if verb == Verb::Set && !argument.is_empty() {
        Some(LogicalCommand::with_argument(verb, noun, argument))
    } else {
        Some(LogicalCommand::new(verb, noun))
    }
}

impl Bridge {
    /// Handles a message received from the bus.
    ///
    /// Every message counts as bus activity. `query.power` and
    /// `query.status` are answered from local state; everything else is
    /// queued when the device has power.
    pub fn on_bus_message(&mut self, topic: &str, payload: &str, now: Instant) {
        self.last_bus_activity = now;
        if topic == self.ping_topic {
            return;
        }

        let Some(cmd) = translate(topic, payload, self.publisher.prefix()) else {
            tracing::debug!(topic = %topic, "Ignoring message on unhandled topic");
            return;
        };
        tracing::info!(command = %cmd, "Command received");

        if cmd == LogicalCommand::query_power() {
            let value = self.power_value(self.state.is_powered_on());
            self.publish("power", value, true);
            return;
        }
        if cmd == LogicalCommand::new(Verb::Query, "status") {
            let value = self.state.last_status().map_or(Value::Null, |code| {
                self.change_value(StateChange::Status(code))
            });
            self.publish("status", value, true);
            return;
        }

        if cmd.is_poll_toggle() {
            self.enqueue(cmd, now);
            return;
        }

        if !self.state.has_power() {
            tracing::warn!(command = %cmd, "No power to device, ignoring command");
            return;
        }

        if self.state.is_powered_on() && cmd.is_shutdown() {
            self.run_hook(HookPoint::OnShutdown, now);
        }
        self.enqueue(cmd, now);
    }
}
