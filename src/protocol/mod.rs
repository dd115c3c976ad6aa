// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transports on both sides of the bridge.
//!
//! # Device side
//!
//! The projector is reached over any byte stream implementing tokio's
//! `AsyncRead + AsyncWrite`. [`FrameAssembler`] turns the incoming bytes into
//! response lines. With the `serial` feature, [`open_port`] opens an RS-232
//! port with the projector's fixed line settings.
//!
//! # Bus side
//!
//! The [`MessageBus`] trait publishes and subscribes; incoming traffic and
//! connection changes arrive separately as [`BusEvent`]s on a channel. With the
//! `mqtt` feature, [`MqttBus`] implements it on top of rumqttc.

pub mod framer;
#[cfg(feature = "mqtt")]
mod mqtt;
#[cfg(feature = "serial")]
mod serial;

pub use framer::FrameAssembler;
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttBus, MqttBusBuilder};
#[cfg(feature = "serial")]
pub use serial::open_port;

use crate::error::ProtocolError;

/// Something that happened on the bus connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// The connection was (re)established; subscriptions must be issued.
    Connected,
    /// A message arrived on a subscribed topic.
    Message {
        /// Topic the message was published on.
        topic: String,
        /// Payload as text.
        payload: String,
    },
    /// The connection closed and will not come back.
    Closed,
}

/// Publish/subscribe side of a message bus.
#[allow(async_fn_in_trait)]
pub trait MessageBus {
    /// Publishes a payload on a topic.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the message could not be handed to the bus.
    async fn publish(&self, topic: &str, payload: String) -> Result<(), ProtocolError>;

    /// Subscribes to a topic filter.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the subscription could not be requested.
    async fn subscribe(&self, topic: &str) -> Result<(), ProtocolError>;
}
