// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Discovery handshake payload.

use std::collections::{BTreeMap, HashMap};

use crate::error::{FatalError, ParseError};

/// Attributes reported by the discovery handshake.
///
/// The payload is a run of `<-Key=Value>` segments; keys are stored
/// lower-cased. Empty until the first handshake succeeds.
///
/// # Examples
///
/// ```
/// use optoma_bridge::response::DiscoveryInfo;
///
/// let mut info = DiscoveryInfo::default();
/// info.merge_payload("B<-SDKClass=VideoProjector><-Make=Optoma><-Model=UHD50>");
///
/// assert_eq!(info.get("make"), Some("Optoma"));
/// assert_eq!(info.get("sdkclass"), Some("VideoProjector"));
/// assert_eq!(info.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryInfo {
    attributes: BTreeMap<String, String>,
}

impl DiscoveryInfo {
    /// Parses a payload and merges its pairs into this record.
    ///
    /// Malformed segments are logged and skipped. Returns the number of pairs
    /// stored.
    pub fn merge_payload(&mut self, payload: &str) -> usize {
        let mut stored = 0;
        for segment in segments(payload) {
            match parse_pair(segment) {
                Ok((key, value)) => {
                    self.attributes.insert(key, value.to_string());
                    stored += 1;
                }
                Err(e) => tracing::warn!(error = %e, "Skipping discovery segment"),
            }
        }
        stored
    }

    /// Returns an attribute value by lower-case key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns `true` if no attribute has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns the number of captured attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Forgets every attribute.
    pub fn clear(&mut self) {
        self.attributes.clear();
    }

    /// Iterates over the attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Checks captured attributes against the expected identity.
    ///
    /// Attributes the device did not report are not checked. Values compare
    /// case-insensitively. Every mismatch is logged; the first one (in key
    /// order) is returned.
    ///
    /// # Errors
    ///
    /// Returns `FatalError::IdentityMismatch` if any reported attribute
    /// differs from its expected value.
    pub fn verify(&self, expected: &HashMap<String, String>) -> Result<(), FatalError> {
        let mut expected: Vec<(&String, &String)> = expected.iter().collect();
        expected.sort();

        let mut first_mismatch = None;
        for (attribute, wanted) in expected {
            let Some(got) = self.get(&attribute.to_lowercase()) else {
                continue;
            };
            if !wanted.eq_ignore_ascii_case(got) {
                tracing::error!(
                    attribute = %attribute,
                    wanted = %wanted,
                    got = %got,
                    "Mismatched discovery value"
                );
                first_mismatch.get_or_insert_with(|| FatalError::IdentityMismatch {
                    attribute: attribute.clone(),
                    expected: wanted.clone(),
                    actual: got.to_string(),
                });
            }
        }

        match first_mismatch {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Yields the text between each `<-` and the following `>`.
fn segments(payload: &str) -> impl Iterator<Item = &str> {
    let mut rest = payload;
    std::iter::from_fn(move || {
        let start = rest.find("<-")? + 2;
        let len = rest[start..].find('>')?;
        let segment = &rest[start..start + len];
        rest = &rest[start + len + 1..];
        Some(segment)
    })
}

fn parse_pair(segment: &str) -> Result<(String, &str), ParseError> {
    match segment.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_lowercase(), value)),
        _ => Err(ParseError::DiscoveryPair(segment.to_string())),
    }
}
