// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state tracking and publishing.
//!
//! [`DeviceState`] is the projector lifecycle state machine. Its transitions
//! return the [`StateChange`]s worth publishing, which the
//! [`StatePublisher`] debounces before they reach the bus.
//!
//! # Examples
//!
//! ```
//! use optoma_bridge::response::StatusCode;
//! use optoma_bridge::state::{DeviceState, Lifecycle, StateChange};
//!
//! let mut state = DeviceState::new();
//!
//! let changes = state.on_status(StatusCode::WARMING);
//! assert_eq!(changes, vec![StateChange::Status(StatusCode::WARMING)]);
//! assert_eq!(state.lifecycle(), Lifecycle::Warming);
//! assert!(state.is_warming());
//! ```

mod device_state;
mod publisher;
mod state_change;

pub use device_state::{DeviceState, Lifecycle, Phase, QueryPowerOutcome};
pub use publisher::{Publication, StatePublisher};
pub use state_change::StateChange;
