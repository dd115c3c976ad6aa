// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State change representation.

use crate::response::StatusCode;

/// A change of published device state.
///
/// Transitions of [`DeviceState`](super::DeviceState) return these in the
/// order they happened; each one becomes a publish of the matching attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// The status code changed (`status` attribute).
    Status(StatusCode),
    /// The powered-on flag changed (`power` attribute).
    Power(bool),
}

impl StateChange {
    /// Returns the published attribute name.
    #[must_use]
    pub const fn attribute(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Power(_) => "power",
        }
    }
}
