// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Projector lifecycle state machine.

use std::fmt;

use crate::response::StatusCode;

use super::StateChange;

/// Externally visible lifecycle of the projector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Nothing received for too long; the outlet is probably off.
    NoPower,
    /// Reachable and in standby.
    Standby,
    /// Lamp warming up.
    Warming,
    /// Powered on and accepting commands.
    Ready,
    /// Lamp cooling down.
    Cooling,
    /// Finished cooling.
    Off,
    /// No status received yet.
    Unknown,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoPower => "no power",
            Self::Standby => "standby",
            Self::Warming => "warming",
            Self::Ready => "ready",
            Self::Cooling => "cooling",
            Self::Off => "off",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Lamp transition in progress. Warming and cooling are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No lamp transition.
    #[default]
    Idle,
    /// Lamp warming up; only exempt commands are sent.
    Warming,
    /// Lamp cooling down.
    Cooling,
}

/// Result of a `query power` answer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryPowerOutcome {
    /// Changes to publish.
    pub changes: Vec<StateChange>,
    /// `true` when the device just became ready; the `on_ready` hook runs.
    pub became_ready: bool,
}

/// Projector state driven by status codes, query results and the watchdog.
///
/// `has_power` tracks whether the device answers at all, `powered_on`
/// whether the lamp is on, and [`Phase`] the warm-up/cool-down transition.
/// The [`Lifecycle`] is updated alongside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    has_power: bool,
    powered_on: bool,
    phase: Phase,
    lifecycle: Lifecycle,
    last_status: Option<StatusCode>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    /// Creates the startup state.
    ///
    /// The device is assumed reachable until the watchdog says otherwise, so
    /// the startup discovery command can be sent.
    #[must_use]
    pub fn new() -> Self {
        Self {
            has_power: true,
            powered_on: false,
            phase: Phase::Idle,
            lifecycle: Lifecycle::Unknown,
            last_status: None,
        }
    }

    /// Returns `true` if the device is answering.
    #[must_use]
    pub fn has_power(&self) -> bool {
        self.has_power
    }

    /// Returns `true` if the lamp is on.
    #[must_use]
    pub fn is_powered_on(&self) -> bool {
        self.powered_on
    }

    /// Returns `true` while warming up.
    #[must_use]
    pub fn is_warming(&self) -> bool {
        self.phase == Phase::Warming
    }

    /// Returns `true` while cooling down.
    #[must_use]
    pub fn is_cooling(&self) -> bool {
        self.phase == Phase::Cooling
    }

    /// Returns the lamp phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Returns the last status code, reported or synthesized.
    #[must_use]
    pub fn last_status(&self) -> Option<StatusCode> {
        self.last_status
    }

    /// Records that a line arrived from the device.
    ///
    /// Returns `true` if the device had been considered without power.
    pub fn on_line_received(&mut self) -> bool {
        let reconnected = !self.has_power;
        self.has_power = true;
        if reconnected {
            self.lifecycle = Lifecycle::Unknown;
        }
        reconnected
    }

    /// Applies a spontaneous status code.
    pub fn on_status(&mut self, code: StatusCode) -> Vec<StateChange> {
        let mut changes = Vec::new();
        self.set_status(code, &mut changes);

        match code {
            StatusCode::STANDBY => {
                self.set_powered_on(false, &mut changes);
                if self.phase == Phase::Cooling {
                    self.set_status(StatusCode::OFF, &mut changes);
                }
                self.phase = Phase::Idle;
                self.lifecycle = Lifecycle::Standby;
            }
            StatusCode::WARMING => {
                self.phase = Phase::Warming;
                self.lifecycle = Lifecycle::Warming;
            }
            StatusCode::COOLING => {
                self.phase = Phase::Cooling;
                self.lifecycle = Lifecycle::Cooling;
            }
            StatusCode::OFF => self.lifecycle = Lifecycle::Off,
            StatusCode::READY => self.lifecycle = Lifecycle::Ready,
            _ => {}
        }

        changes
    }

    /// Records that the device accepted a power-on request.
    pub fn on_power_on_accepted(&mut self) {
        self.phase = Phase::Warming;
        self.lifecycle = Lifecycle::Warming;
    }

    /// Applies the answer to `query power`.
    ///
    /// Only this path reports readiness: the first `on` answer after the
    /// device was off publishes the ready status and runs the `on_ready` hook.
    pub fn on_query_power(&mut self, on: bool) -> QueryPowerOutcome {
        let mut outcome = QueryPowerOutcome::default();
        if on {
            if self.phase == Phase::Warming {
                self.phase = Phase::Idle;
            }
            if !self.powered_on {
                self.set_status(StatusCode::READY, &mut outcome.changes);
                self.set_powered_on(true, &mut outcome.changes);
                outcome.became_ready = true;
            }
        } else {
            self.set_powered_on(false, &mut outcome.changes);
        }
        outcome
    }

    /// Applies the power digit of an info string.
    pub fn on_info_power(&mut self, on: bool) -> Vec<StateChange> {
        let mut changes = Vec::new();
        self.set_powered_on(on, &mut changes);
        changes
    }

    /// Applies a power loss detected by receive silence.
    pub fn on_power_loss(&mut self) -> Vec<StateChange> {
        let mut changes = Vec::new();
        self.set_powered_on(false, &mut changes);
        self.has_power = false;
        self.phase = Phase::Idle;
        self.lifecycle = Lifecycle::NoPower;
        self.set_status(StatusCode::NO_POWER, &mut changes);
        changes
    }

    fn set_status(&mut self, code: StatusCode, changes: &mut Vec<StateChange>) {
        if self.last_status == Some(code) {
            return;
        }
        self.last_status = Some(code);
        changes.push(StateChange::Status(code));
    }

    fn set_powered_on(&mut self, on: bool, changes: &mut Vec<StateChange>) {
        if self.powered_on == on {
            return;
        }
        self.powered_on = on;
        if on {
            if self.phase == Phase::Warming {
                self.phase = Phase::Idle;
            }
            self.lifecycle = Lifecycle::Ready;
        } else if self.lifecycle == Lifecycle::Ready {
            self.lifecycle = Lifecycle::Standby;
        }
        changes.push(StateChange::Power(on));
    }
}
