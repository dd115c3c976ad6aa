// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Debounced state publishing.

use std::collections::HashMap;

use serde_json::Value;

/// A message ready to be published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Full topic.
    pub topic: String,
    /// Payload text.
    pub payload: String,
}

/// Publishes device attributes under `<prefix>/<attribute>`.
///
/// Remembers the last value of every attribute and suppresses unchanged
/// values unless the publish is forced. Strings are sent as-is, every other
/// value as JSON.
///
/// # Examples
///
/// ```
/// use optoma_bridge::state::StatePublisher;
///
/// let mut publisher = StatePublisher::new("office/projector");
///
/// let first = publisher.publish("input", "HDMI1", false).unwrap();
/// assert_eq!(first.topic, "office/projector/input");
/// assert_eq!(first.payload, "HDMI1");
///
/// assert!(publisher.publish("input", "HDMI1", false).is_none());
/// assert!(publisher.publish("input", "HDMI1", true).is_some());
/// ```
#[derive(Debug, Clone)]
pub struct StatePublisher {
    prefix: String,
    cache: HashMap<String, Value>,
}

impl StatePublisher {
    /// Creates a publisher for a topic prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            cache: HashMap::new(),
        }
    }

    /// Returns the topic prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the last published value of an attribute.
    #[must_use]
    pub fn cached(&self, attribute: &str) -> Option<&Value> {
        self.cache.get(attribute)
    }

    /// Publishes a value unless it equals the cached one and `force` is false.
    ///
    /// Returns the message to send, or `None` when suppressed.
    pub fn publish(
        &mut self,
        attribute: &str,
        value: impl Into<Value>,
        force: bool,
    ) -> Option<Publication> {
        let value = value.into();
        if !force && self.cache.get(attribute) == Some(&value) {
            return None;
        }

        let payload = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.cache.insert(attribute.to_string(), value);

        tracing::info!(attribute = %attribute, value = %payload, "Device state update");

        Some(Publication {
            topic: format!("{}/{attribute}", self.prefix),
            payload,
        })
    }
}
