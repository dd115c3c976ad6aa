// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device response classification.
//!
//! The projector answers on its RS-232 port with short ASCII lines:
//!
//! | Line | Meaning |
//! |------|---------|
//! | `INFO<n>` | Spontaneous status code `n` |
//! | `F` | The last command failed |
//! | `P` | The last command was accepted and is in progress |
//! | `OK<value>` | Result of the last query |
//! | `AMX...<-Key=Value>...` | Discovery handshake payload |
//!
//! [`classify`] turns a line into a [`Response`]; how the bridge reacts to it
//! depends on the exchange in flight and lives in [`crate::bridge`].

pub mod discovery;
pub mod info_string;

use std::fmt;

use crate::error::ParseError;

pub use discovery::DiscoveryInfo;
pub use info_string::InfoString;

/// A device status code as reported by `INFO<n>` lines.
///
/// Codes other than the named constants are opaque and only published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(pub i64);

impl StatusCode {
    /// Device is in standby.
    pub const STANDBY: Self = Self(0);
    /// Lamp is warming up.
    pub const WARMING: Self = Self(1);
    /// Lamp is cooling down.
    pub const COOLING: Self = Self(2);
    /// Device finished cooling and is off. Synthesized by the bridge.
    pub const OFF: Self = Self(97);
    /// Device finished warming and is ready. Synthesized by the bridge.
    pub const READY: Self = Self(98);
    /// Device is not answering at all. Synthesized by the bridge.
    pub const NO_POWER: Self = Self(99);

    /// Returns the numeric code.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A classified response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<'a> {
    /// `INFO<n>`
    Status(StatusCode),
    /// `F`
    Failure,
    /// `P`
    Accepted,
    /// `OK<value>`, holding the value.
    QueryResult(&'a str),
    /// `AMX...`, holding everything after the `AMX` prefix.
    Discovery(&'a str),
    /// Anything else.
    Unrecognized(&'a str),
}

const STATUS_PREFIX: &str = "INFO";
const FAILURE: &str = "F";
const ACCEPTED: &str = "P";
const DISCOVERY_PREFIX: &str = "AMX";

/// Classifies one response line.
///
/// # Errors
///
/// Returns `ParseError::InvalidStatus` for an `INFO` line without a number.
///
/// # Examples
///
/// ```
/// use optoma_bridge::response::{classify, Response, StatusCode};
///
/// assert_eq!(classify("INFO2").unwrap(), Response::Status(StatusCode::COOLING));
/// assert_eq!(classify("Ok1").unwrap(), Response::QueryResult("1"));
/// assert_eq!(classify("F").unwrap(), Response::Failure);
/// ```
pub fn classify(line: &str) -> Result<Response<'_>, ParseError> {
    if let Some(code) = line.strip_prefix(STATUS_PREFIX) {
        return parse_status(code).map(Response::Status);
    }
    if line == FAILURE {
        return Ok(Response::Failure);
    }
    if line == ACCEPTED {
        return Ok(Response::Accepted);
    }
    if line.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("ok")) {
        return Ok(Response::QueryResult(&line[2..]));
    }
    if let Some(payload) = line.strip_prefix(DISCOVERY_PREFIX) {
        return Ok(Response::Discovery(payload));
    }
    Ok(Response::Unrecognized(line))
}

/// Parses the leading integer of a status suffix; trailing text is ignored.
fn parse_status(text: &str) -> Result<StatusCode, ParseError> {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map_or(text.len(), |(i, _)| i);

    text[..end]
        .parse::<i64>()
        .map(StatusCode)
        .map_err(|_| ParseError::InvalidStatus(text.to_string()))
}

/// Interprets a power reading: `0` and `2` are off, `1` is on.
///
/// Used for both the `query power` result and the first digit of the info
/// string. Returns `None` for any other value.
#[must_use]
pub fn power_reading(value: &str) -> Option<bool> {
    match value.trim() {
        "0" | "2" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(classify("INFO0").unwrap(), Response::Status(StatusCode::STANDBY));
        assert_eq!(classify("INFO98").unwrap(), Response::Status(StatusCode::READY));
        assert_eq!(classify("INFO 7").unwrap(), Response::Status(StatusCode(7)));
        assert_eq!(classify("INFO1x").unwrap(), Response::Status(StatusCode::WARMING));
    }

    #[test]
    fn malformed_status() {
        assert!(matches!(classify("INFO"), Err(ParseError::InvalidStatus(_))));
        assert!(matches!(classify("INFOx"), Err(ParseError::InvalidStatus(_))));
    }

    #[test]
    fn failure_and_accept_are_exact() {
        assert_eq!(classify("F").unwrap(), Response::Failure);
        assert_eq!(classify("P").unwrap(), Response::Accepted);
        assert_eq!(classify("Fx").unwrap(), Response::Unrecognized("Fx"));
    }

    #[test]
    fn query_result_prefix_is_case_insensitive() {
        assert_eq!(classify("OK12").unwrap(), Response::QueryResult("12"));
        assert_eq!(classify("ok0").unwrap(), Response::QueryResult("0"));
        assert_eq!(classify("Ok").unwrap(), Response::QueryResult(""));
    }

    #[test]
    fn discovery_payload() {
        assert_eq!(
            classify("AMXB<-Make=Optoma>").unwrap(),
            Response::Discovery("B<-Make=Optoma>")
        );
    }

    #[test]
    fn unrecognized() {
        assert_eq!(classify("hello").unwrap(), Response::Unrecognized("hello"));
    }

    #[test]
    fn power_readings() {
        assert_eq!(power_reading("0"), Some(false));
        assert_eq!(power_reading("2"), Some(false));
        assert_eq!(power_reading("1"), Some(true));
        assert_eq!(power_reading("3"), None);
    }
}
