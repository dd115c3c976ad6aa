// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Numeric code to label tables.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Lookup tables as stored on disk, keyed by code strings.
#[derive(Debug, Default, Deserialize)]
struct RawLookups {
    #[serde(rename = "INFO", default)]
    info: HashMap<String, String>,
    #[serde(rename = "OK", default)]
    ok: HashMap<String, HashMap<String, String>>,
}

/// Validated lookup tables.
///
/// `status` labels the spontaneous status codes (`INFO` section); the
/// per-attribute tables label query results and info-string fields (`OK`
/// section), e.g. `power`, `input`, `display_mode`.
///
/// # Examples
///
/// ```
/// use optoma_bridge::config::Lookups;
///
/// let lookups = Lookups::from_json(r#"{
///     "INFO": { "0": "standby", "98": "ready" },
///     "OK": { "input": { "1": "HDMI1" } }
/// }"#).unwrap();
///
/// assert_eq!(lookups.status_label(98), Some("ready"));
/// assert_eq!(lookups.label("input", 1), Some("HDMI1"));
/// assert!(lookups.has_attribute("input"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    status: HashMap<i64, String>,
    attributes: HashMap<String, HashMap<i64, String>>,
}

impl Lookups {
    /// Loads and validates lookups from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, is not valid JSON,
    /// or has a non-numeric code.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawLookups = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_raw(raw)
    }

    /// Parses and validates lookups from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the JSON is malformed or has a non-numeric code.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawLookups = serde_json::from_str(json).map_err(|source| ConfigError::Json {
            path: "<inline>".to_string(),
            source,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawLookups) -> Result<Self, ConfigError> {
        let status = parse_codes("INFO", raw.info)?;
        let attributes = raw
            .ok
            .into_iter()
            .map(|(attr, codes)| {
                let codes = parse_codes(&format!("OK.{attr}"), codes)?;
                Ok((attr, codes))
            })
            .collect::<Result<_, ConfigError>>()?;

        Ok(Self { status, attributes })
    }

    /// Returns the label of a status code.
    #[must_use]
    pub fn status_label(&self, code: i64) -> Option<&str> {
        self.status.get(&code).map(String::as_str)
    }

    /// Returns `true` if a table exists for the attribute.
    #[must_use]
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Returns the label of a code in an attribute's table.
    #[must_use]
    pub fn label(&self, attribute: &str, code: i64) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|codes| codes.get(&code))
            .map(String::as_str)
    }
}

fn parse_codes(
    section: &str,
    codes: HashMap<String, String>,
) -> Result<HashMap<i64, String>, ConfigError> {
    codes
        .into_iter()
        .map(|(code, label)| {
            code.trim()
                .parse::<i64>()
                .map(|code| (code, label))
                .map_err(|_| ConfigError::invalid(section, format!("code {code:?} is not numeric")))
        })
        .collect()
}
