// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command queue and dispatch timing.
//!
//! The projector handles one command at a time, so the bridge keeps a queue of
//! [`LogicalCommand`]s and evaluates its head only when the single dispatch
//! timer fires. The [`Scheduler`] owns the queue, the exchange in flight and
//! that timer's deadline; [`Scheduler::decide`] applies the gating rules to
//! the queue head.
//!
//! # Examples
//!
//! ```
//! use std::time::{Duration, Instant};
//!
//! use optoma_bridge::command::LogicalCommand;
//! use optoma_bridge::scheduler::{Arm, Dispatch, Scheduler};
//! use optoma_bridge::state::DeviceState;
//!
//! let now = Instant::now();
//! let mut scheduler = Scheduler::new();
//!
//! scheduler.push_back(LogicalCommand::query_power());
//! scheduler.arm(now, Duration::from_millis(100), Arm::IfIdle);
//! scheduler.arm(now, Duration::from_millis(100), Arm::IfIdle);
//! assert_eq!(scheduler.deadline(), Some(now + Duration::from_millis(100)));
//!
//! let decision = scheduler.decide(&DeviceState::new());
//! assert_eq!(decision, Dispatch::Send(LogicalCommand::query_power()));
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::command::{LogicalCommand, Verb};
use crate::state::DeviceState;

/// Longest the dispatch timer can be armed for.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// The command in flight on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExchange {
    /// Logical command that was sent.
    pub command: LogicalCommand,
    /// Resolved wire string, without terminator.
    pub wire: String,
    /// When it was written.
    pub sent_at: Instant,
}

impl PendingExchange {
    /// Time since the command was written.
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.sent_at)
    }
}

/// How a new dispatch deadline interacts with one already armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    /// Cancel any armed deadline and use the new one.
    Replace,
    /// Keep an armed deadline; arm only if none is pending.
    IfIdle,
}

/// Why a queued command was dropped without being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The device is not answering at all.
    NoPower,
    /// The lamp is off and the command is not exempt.
    PoweredOff,
}

/// Outcome of evaluating the queue head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The queue is empty.
    Idle,
    /// Hold the queue for the given time.
    Pause(Duration),
    /// Turn device polling on (`Some(true)`), off, or leave it (`None`).
    SetPoll(Option<bool>),
    /// The command was dropped.
    Discard(LogicalCommand, DiscardReason),
    /// The device is warming up; the command went back to the queue front.
    Deferred(LogicalCommand),
    /// The command should be resolved and written.
    Send(LogicalCommand),
}

/// Queue, in-flight exchange and dispatch deadline.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: VecDeque<LogicalCommand>,
    pending: Option<PendingExchange>,
    deadline: Option<Instant>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    pub fn push_back(&mut self, cmd: LogicalCommand) {
        self.queue.push_back(cmd);
    }

    /// Inserts a command ahead of everything queued.
    pub fn push_front(&mut self, cmd: LogicalCommand) {
        self.queue.push_front(cmd);
    }

    /// Returns the number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Iterates over queued commands, head first.
    pub fn iter(&self) -> impl Iterator<Item = &LogicalCommand> {
        self.queue.iter()
    }

    /// Returns the exchange in flight.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingExchange> {
        self.pending.as_ref()
    }

    /// Records a command written to the device, replacing the previous one.
    pub fn record_sent(&mut self, command: LogicalCommand, wire: String, now: Instant) {
        self.pending = Some(PendingExchange {
            command,
            wire,
            sent_at: now,
        });
    }

    /// Returns the armed dispatch deadline.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Arms the dispatch timer `delay` after `now`.
    ///
    /// Never more than one deadline exists; see [`Arm`] for how a pending
    /// one is treated. Delays are capped at [`MAX_DELAY`].
    pub fn arm(&mut self, now: Instant, delay: Duration, mode: Arm) {
        if mode == Arm::IfIdle && self.deadline.is_some() {
            return;
        }
        let delay = if delay > MAX_DELAY {
            tracing::warn!(
                requested_secs = delay.as_secs(),
                max_secs = MAX_DELAY.as_secs(),
                "Dispatch delay capped"
            );
            MAX_DELAY
        } else {
            delay
        };
        self.deadline = Some(now.checked_add(delay).unwrap_or(now));
    }

    /// Clears the dispatch deadline.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Pops the queue head and decides what to do with it.
    ///
    /// Rules, first match wins:
    /// 1. `pause.<seconds>` holds the queue.
    /// 2. `set.poll.<on|off>` toggles polling.
    /// 3. Without power every command is dropped.
    /// 4. Exempt power-lifecycle commands and `setup` markers are sent.
    /// 5. While warming the command returns to the queue front.
    /// 6. With the lamp off the command is dropped.
    /// 7. Otherwise it is sent.
    pub fn decide(&mut self, state: &DeviceState) -> Dispatch {
        let Some(cmd) = self.queue.pop_front() else {
            return Dispatch::Idle;
        };

        if cmd.verb() == &Verb::Pause {
            let seconds = cmd.noun().trim().parse::<u64>().unwrap_or(0);
            return Dispatch::Pause(Duration::from_secs(seconds));
        }

        if cmd.is_poll_toggle() {
            let enabled = match cmd.argument() {
                Some("on") => Some(true),
                Some("off") => Some(false),
                _ => None,
            };
            return Dispatch::SetPoll(enabled);
        }

        if !state.has_power() {
            return Dispatch::Discard(cmd, DiscardReason::NoPower);
        }

        if cmd.is_exempt() || cmd.verb() == &Verb::Setup {
            return Dispatch::Send(cmd);
        }

        if state.is_warming() {
            self.queue.push_front(cmd.clone());
            return Dispatch::Deferred(cmd);
        }

        if !state.is_powered_on() {
            return Dispatch::Discard(cmd, DiscardReason::PoweredOff);
        }

        Dispatch::Send(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::StatusCode;

    fn cmd(s: &str) -> LogicalCommand {
        s.parse().unwrap()
    }

    fn powered_on() -> DeviceState {
        let mut state = DeviceState::new();
        state.on_query_power(true);
        state
    }

    #[test]
    fn arm_if_idle_keeps_first_deadline() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.arm(now, Duration::from_millis(100), Arm::IfIdle);
        scheduler.arm(
            now + Duration::from_millis(50),
            Duration::from_millis(100),
            Arm::IfIdle,
        );
        assert_eq!(scheduler.deadline(), Some(now + Duration::from_millis(100)));
    }

    #[test]
    fn arm_replace_cancels_previous() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.arm(now, Duration::from_millis(2000), Arm::IfIdle);
        scheduler.arm(now, Duration::from_millis(250), Arm::Replace);
        assert_eq!(scheduler.deadline(), Some(now + Duration::from_millis(250)));

        scheduler.disarm();
        assert_eq!(scheduler.deadline(), None);
    }

    #[test]
    fn pending_exchange_elapsed() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        let sent = now + Duration::from_millis(10);
        scheduler.record_sent(LogicalCommand::query_power(), "~00124 1".into(), sent);
        let pending = scheduler.pending().unwrap();
        assert_eq!(
            pending.elapsed(sent + Duration::from_millis(80)),
            Duration::from_millis(80)
        );
        assert_eq!(pending.elapsed(now), Duration::ZERO);
    }

    #[test]
    fn huge_delay_is_capped() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.arm(now, Duration::from_secs(u64::MAX), Arm::Replace);
        assert_eq!(scheduler.deadline(), Some(now + MAX_DELAY));
    }

    #[test]
    fn empty_queue_is_idle() {
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.decide(&DeviceState::new()), Dispatch::Idle);
    }

    #[test]
    fn queue_is_fifo_with_priority_front() {
        let mut scheduler = Scheduler::new();
        scheduler.push_back(cmd("set.input.hdmi1"));
        scheduler.push_back(cmd("set.input.hdmi1"));
        scheduler.push_front(LogicalCommand::discovery());

        let state = powered_on();
        assert_eq!(
            scheduler.decide(&state),
            Dispatch::Send(LogicalCommand::discovery())
        );
        assert_eq!(scheduler.decide(&state), Dispatch::Send(cmd("set.input.hdmi1")));
        assert_eq!(scheduler.decide(&state), Dispatch::Send(cmd("set.input.hdmi1")));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn pause_consumes_slot() {
        let mut scheduler = Scheduler::new();
        scheduler.push_back(cmd("pause.3"));
        scheduler.push_back(cmd("pause.x"));
        let state = DeviceState::new();
        assert_eq!(
            scheduler.decide(&state),
            Dispatch::Pause(Duration::from_secs(3))
        );
        assert_eq!(scheduler.decide(&state), Dispatch::Pause(Duration::ZERO));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn poll_toggle_ignores_power() {
        let mut scheduler = Scheduler::new();
        let mut state = DeviceState::new();
        state.on_power_loss();

        scheduler.push_back(cmd("set.poll.off"));
        scheduler.push_back(cmd("set.poll.maybe"));
        assert_eq!(scheduler.decide(&state), Dispatch::SetPoll(Some(false)));
        assert_eq!(scheduler.decide(&state), Dispatch::SetPoll(None));
    }

    #[test]
    fn no_power_discards_everything() {
        let mut scheduler = Scheduler::new();
        let mut state = DeviceState::new();
        state.on_power_loss();

        scheduler.push_back(LogicalCommand::query_power());
        scheduler.push_back(cmd("set.input.hdmi1"));
        assert!(matches!(
            scheduler.decide(&state),
            Dispatch::Discard(_, DiscardReason::NoPower)
        ));
        assert!(matches!(
            scheduler.decide(&state),
            Dispatch::Discard(_, DiscardReason::NoPower)
        ));
        assert_eq!(scheduler.decide(&state), Dispatch::Idle);
    }

    #[test]
    fn exempt_sent_while_warming_and_off() {
        let mut scheduler = Scheduler::new();
        let mut state = DeviceState::new();
        state.on_status(StatusCode::WARMING);

        scheduler.push_back(LogicalCommand::query_power());
        assert_eq!(
            scheduler.decide(&state),
            Dispatch::Send(LogicalCommand::query_power())
        );
    }

    #[test]
    fn warming_defers_to_front() {
        let mut scheduler = Scheduler::new();
        let mut state = DeviceState::new();
        state.on_status(StatusCode::WARMING);

        scheduler.push_back(cmd("set.input.hdmi1"));
        scheduler.push_back(cmd("key.menu"));
        assert_eq!(
            scheduler.decide(&state),
            Dispatch::Deferred(cmd("set.input.hdmi1"))
        );
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.iter().next(), Some(&cmd("set.input.hdmi1")));
    }

    #[test]
    fn powered_off_discards_non_exempt() {
        let mut scheduler = Scheduler::new();
        scheduler.push_back(cmd("set.input.hdmi1"));
        assert_eq!(
            scheduler.decide(&DeviceState::new()),
            Dispatch::Discard(cmd("set.input.hdmi1"), DiscardReason::PoweredOff)
        );
    }

    #[test]
    fn setup_marker_passes_through() {
        let mut scheduler = Scheduler::new();
        scheduler.push_back(cmd("setup.on_ready"));
        assert_eq!(
            scheduler.decide(&DeviceState::new()),
            Dispatch::Send(cmd("setup.on_ready"))
        );
    }

    #[test]
    fn record_sent_replaces_pending() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.record_sent(LogicalCommand::discovery(), "AMX".into(), now);
        scheduler.record_sent(LogicalCommand::query_power(), "~00124 1".into(), now);
        let pending = scheduler.pending().unwrap();
        assert_eq!(pending.command, LogicalCommand::query_power());
        assert_eq!(pending.wire, "~00124 1");
    }
}
