// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device-side handlers: framing and response interpretation.

use std::time::Instant;

use crate::command::{LogicalCommand, Verb};
use crate::config::HookPoint;
use crate::response::{self, InfoString, Response, StatusCode};
use crate::scheduler::Arm;

use super::{Action, Bridge};

impl Bridge {
    /// Feeds raw bytes from the transport.
    pub fn on_bytes(&mut self, bytes: &[u8], now: Instant) {
        for line in self.framer.push(bytes) {
            self.on_line(&line, now);
        }
    }

    /// Handles one complete line from the device.
    ///
    /// Any line proves the device has power and turns polling on. The first
    /// line ever, or the first after a power loss, runs the `on_start` hook.
    pub fn on_line(&mut self, line: &str, now: Instant) {
        tracing::trace!(line = %line, "RX");

        self.last_received = now;
        let reconnected = self.state.on_line_received();
        if reconnected || !self.seen_device {
            self.seen_device = true;
            tracing::info!("Connected to device");
            self.run_hook(HookPoint::OnStart, now);
        }
        self.poll_enabled = true;

        match response::classify(line) {
            Ok(Response::Status(code)) => {
                self.handle_status(code, now);
                return;
            }
            Ok(Response::Failure) => match self.scheduler.pending() {
                Some(pending) => tracing::warn!(
                    command = %pending.command,
                    wire = %pending.wire,
                    elapsed_ms = pending.elapsed(now).as_millis(),
                    "Command failed"
                ),
                None => tracing::warn!("Command failed"),
            },
            Ok(Response::Accepted) => {
                let power_on = LogicalCommand::with_argument(Verb::Set, "power", "on");
                if self.pending_is(&power_on) {
                    tracing::info!("Power on accepted, device warming up");
                    self.state.on_power_on_accepted();
                    self.arm(now, self.timing.power_on_recheck_ms, Arm::Replace);
                    return;
                }
            }
            Ok(Response::QueryResult(value)) => self.handle_query_result(value, now),
            Ok(Response::Discovery(payload)) => {
                if !self.handle_discovery(payload) {
                    return;
                }
            }
            Ok(Response::Unrecognized(other)) => {
                tracing::debug!(line = %other, "Unexpected response");
            }
            Err(e) => tracing::warn!(line = %line, error = %e, "Malformed response"),
        }

        self.arm(now, self.timing.line_received_ms, Arm::Replace);
    }

    fn pending_is(&self, cmd: &LogicalCommand) -> bool {
        self.scheduler
            .pending()
            .is_some_and(|pending| &pending.command == cmd)
    }

    fn handle_status(&mut self, code: StatusCode, now: Instant) {
        let changes = self.state.on_status(code);
        self.publish_changes(changes, false);

        match code {
            StatusCode::STANDBY => self.last_info = None,
            StatusCode::WARMING => {
                self.arm(now, self.timing.warming_recheck_ms, Arm::Replace);
            }
            _ => {}
        }

        if code.value() <= StatusCode::COOLING.value() && self.discovery.is_empty() {
            self.enqueue_first(LogicalCommand::discovery(), now);
        }
    }

    fn handle_query_result(&mut self, value: &str, now: Instant) {
        let Some(pending) = self.scheduler.pending() else {
            tracing::debug!(value = %value, "Query result with nothing pending");
            return;
        };
        tracing::debug!(
            command = %pending.command,
            elapsed_ms = pending.elapsed(now).as_millis(),
            "Response received"
        );
        let cmd = pending.command.clone();

        if cmd == LogicalCommand::query_info_string() {
            match InfoString::parse(value.trim()) {
                Ok(info) => self.apply_info(info),
                Err(e) => tracing::warn!(value = %value, error = %e, "Malformed info string"),
            }
            return;
        }

        if cmd == LogicalCommand::query_power() {
            let Some(on) = response::power_reading(value) else {
                tracing::warn!(value = %value, "Unexpected power reading");
                return;
            };
            let outcome = self.state.on_query_power(on);
            self.publish_changes(outcome.changes, false);
            if outcome.became_ready {
                tracing::info!("Device ready");
                self.run_hook(HookPoint::OnReady, now);
            }
            return;
        }

        if cmd.verb() != &Verb::Query {
            tracing::debug!(command = %cmd, value = %value, "Acknowledged");
            return;
        }

        let attribute = cmd.noun().to_string();
        let value = value.trim();
        match value.parse::<i64>() {
            Ok(code) if self.lookups.has_attribute(&attribute) => {
                match self.lookups.label(&attribute, code) {
                    Some(label) => {
                        let label = label.to_string();
                        self.publish(&attribute, label, true);
                    }
                    None => tracing::warn!(
                        attribute = %attribute,
                        code,
                        "Unexpected query result"
                    ),
                }
            }
            Ok(code) => self.publish(&attribute, code, true),
            Err(_) if self.lookups.has_attribute(&attribute) => {
                tracing::warn!(attribute = %attribute, value = %value, "Unexpected query result");
            }
            Err(_) => self.publish(&attribute, value.to_string(), true),
        }
    }

    fn apply_info(&mut self, info: InfoString) {
        if let Some(on) = response::power_reading(&info.power.to_string()) {
            let changes = self.state.on_info_power(on);
            self.publish_changes(changes, false);
        }

        let previous = self.last_info.take();
        let mut changed = false;

        if previous.as_ref().map(|p| p.input) != Some(info.input) {
            changed = true;
            if info.input != 0 {
                self.publish_lookup("input", info.input);
            }
        }
        if previous.as_ref().map(|p| p.display_mode) != Some(info.display_mode) {
            changed = true;
            if info.display_mode != 0 {
                self.publish_lookup("display_mode", info.display_mode);
            }
        }

        if changed {
            tracing::debug!(
                lamp_hours = info.lamp_hours,
                firmware = %info.firmware,
                "Info string updated"
            );
        }
        self.last_info = Some(info);
    }

    fn publish_lookup(&mut self, attribute: &str, code: u8) {
        match self.lookups.label(attribute, i64::from(code)) {
            Some(label) => {
                let label = label.to_string();
                self.publish(attribute, label, false);
            }
            None => self.publish(attribute, code, false),
        }
    }

    /// Merges discovery attributes and verifies identity.
    ///
    /// Returns `false` when the identity check failed and the bridge exits.
    fn handle_discovery(&mut self, payload: &str) -> bool {
        let mut found = self.discovery.clone();
        let merged = found.merge_payload(payload);
        tracing::info!(attributes = merged, "Device discovered");
        for (key, value) in found.iter() {
            tracing::debug!(attribute = %key, value = %value, "Discovery attribute");
        }

        if let Err(fatal) = found.verify(&self.expected_identity) {
            tracing::error!(error = %fatal, "Device identity check failed");
            self.actions.push(Action::Exit(fatal));
            return false;
        }

        tracing::debug!("Device identity checks passed");
        self.discovery = found;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::command::CommandTable;
    use crate::config::{BridgeConfig, Lookups};
    use crate::error::FatalError;
    use crate::response::StatusCode;
    use crate::state::Publication;

    use super::*;

    fn bridge(now: Instant) -> Bridge {
        let config = BridgeConfig::from_json(
            r#"{
                "serial_device": "/dev/null",
                "mqtt_conf": { "host": "h", "topic_prefix": "p" },
                "amx": { "Make": "Optoma" }
            }"#,
        )
        .unwrap();
        let commands = CommandTable::from_json(
            r#"{ "query": { "power": "124 1", "info_string": "150 1", "brightness": "125 1" },
                 "set": { "power.on": "00 1", "power.off": "00 0" } }"#,
        )
        .unwrap();
        let lookups = Lookups::from_json(
            r#"{ "INFO": { "0": "standby", "1": "warming", "2": "cooling" },
                 "OK": { "power": { "0": "off", "1": "on" },
                         "input": { "1": "HDMI1", "2": "HDMI2" },
                         "brightness": { "0": "bright", "1": "eco" } } }"#,
        )
        .unwrap();
        Bridge::new(&config, commands, lookups, now)
    }

    fn publishes(actions: &[Action]) -> Vec<(String, String)> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Publish(Publication { topic, payload }) => {
                    Some((topic.clone(), payload.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn pair(topic: &str, payload: &str) -> (String, String) {
        (topic.to_string(), payload.to_string())
    }

    #[test]
    fn split_lines_are_reassembled() {
        let now = Instant::now();
        let mut b = bridge(now);
        b.on_bytes(b"INF", now);
        assert!(b.take_actions().is_empty());
        b.on_bytes(b"O1\r", now);
        assert_eq!(
            publishes(&b.take_actions()),
            vec![pair("p/status", "warming")]
        );
    }

    #[test]
    fn any_line_enables_polling() {
        let now = Instant::now();
        let mut b = bridge(now);
        b.scheduler.push_back("set.poll.off".parse().unwrap());
        b.on_dispatch_due(now);
        assert!(!b.poll_enabled());

        let later = now + Duration::from_secs(2);
        b.on_line("garbage", later);
        assert!(b.poll_enabled());
        assert_eq!(
            b.dispatch_deadline(),
            Some(later + Duration::from_millis(250))
        );
    }

    #[test]
    fn warming_status_rearms_recheck() {
        let now = Instant::now();
        let mut b = bridge(now);
        b.on_line("INFO1", now);
        assert!(b.state().is_warming());
        assert_eq!(
            b.dispatch_deadline(),
            Some(now + Duration::from_millis(500))
        );
    }

    #[test]
    fn low_status_without_discovery_queues_discovery_first() {
        let now = Instant::now();
        let mut b = bridge(now);
        b.on_line("INFO0", now);
        assert_eq!(
            b.scheduler().iter().next(),
            Some(&LogicalCommand::discovery())
        );
    }

    #[test]
    fn accepted_power_on_waits_for_lamp() {
        let now = Instant::now();
        let mut b = bridge(now);
        b.scheduler.record_sent(
            "set.power.on".parse().unwrap(),
            "~0000 1".into(),
            now,
        );
        b.on_line("P", now);
        assert!(b.state().is_warming());
        assert_eq!(
            b.dispatch_deadline(),
            Some(now + Duration::from_millis(7000))
        );
    }

    #[test]
    fn query_power_on_runs_ready_hook() {
        let now = Instant::now();
        let config = BridgeConfig::from_json(
            r#"{
                "serial_device": "/dev/null",
                "mqtt_conf": { "host": "h", "topic_prefix": "p" },
                "setup": { "on_ready": ["query.brightness"] }
            }"#,
        )
        .unwrap();
        let mut b = Bridge::new(
            &config,
            CommandTable::from_json(r#"{ "query": { "power": "124 1" } }"#).unwrap(),
            Lookups::from_json("{}").unwrap(),
            now,
        );
        b.scheduler
            .record_sent(LogicalCommand::query_power(), "~00124 1".into(), now);
        b.on_line("Ok1", now);

        assert!(b.state().is_powered_on());
        assert_eq!(
            publishes(&b.take_actions()),
            vec![pair("p/status", "98"), pair("p/power", "on")]
        );
        assert_eq!(
            b.scheduler().iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["query.brightness"]
        );
    }

    #[test]
    fn query_result_uses_lookup_and_forces_publish() {
        let now = Instant::now();
        let mut b = bridge(now);
        let query = LogicalCommand::new(Verb::Query, "brightness");
        b.scheduler.record_sent(query.clone(), "~00125 1".into(), now);
        b.on_line("Ok1", now);
        b.on_line("Ok1", now);
        assert_eq!(
            publishes(&b.take_actions()),
            vec![pair("p/brightness", "eco"), pair("p/brightness", "eco")]
        );
    }

    #[test]
    fn query_result_without_lookup_publishes_number() {
        let now = Instant::now();
        let mut b = bridge(now);
        b.scheduler.record_sent(
            LogicalCommand::new(Verb::Query, "lamp_hours"),
            "~00108 1".into(),
            now,
        );
        b.on_line("Ok1234", now);
        assert_eq!(
            publishes(&b.take_actions()),
            vec![pair("p/lamp_hours", "1234")]
        );
    }

    #[test]
    fn info_string_publishes_changed_input_once() {
        let now = Instant::now();
        let mut b = bridge(now);
        b.scheduler.record_sent(
            LogicalCommand::query_info_string(),
            "~00150 1".into(),
            now,
        );
        b.on_line("Ok101231C10A0", now);
        assert_eq!(
            publishes(&b.take_actions()),
            vec![pair("p/power", "on"), pair("p/input", "HDMI1")]
        );

        b.on_line("Ok101231C10A0", now);
        assert!(publishes(&b.take_actions()).is_empty());
    }

    #[test]
    fn discovery_mismatch_exits() {
        let now = Instant::now();
        let mut b = bridge(now);
        b.on_line("AMX<-Make=Epson>", now);
        assert!(matches!(
            b.take_actions().as_slice(),
            [Action::Exit(FatalError::IdentityMismatch { .. })]
        ));
        assert!(b.discovery().is_empty());
    }

    #[test]
    fn discovery_match_is_stored() {
        let now = Instant::now();
        let mut b = bridge(now);
        b.on_line("AMX<-Make=OPTOMA><-Model=UHD50>", now);
        assert!(b.take_actions().is_empty());
        assert_eq!(b.discovery().get("model"), Some("UHD50"));
    }

    #[test]
    fn cooling_then_standby_publishes_off() {
        let now = Instant::now();
        let mut b = bridge(now);
        b.on_line("INFO2", now);
        b.on_line("INFO0", now);
        assert_eq!(
            publishes(&b.take_actions()),
            vec![
                pair("p/status", "cooling"),
                pair("p/status", "standby"),
                pair("p/status", "97"),
            ]
        );
        assert_eq!(b.state().last_status(), Some(StatusCode::OFF));
    }
}
