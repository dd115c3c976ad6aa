// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT implementation of the message bus.
//!
//! # Examples
//!
//! ```no_run
//! use optoma_bridge::protocol::{BusEvent, MessageBus, MqttBus};
//!
//! # async fn example() -> Result<(), optoma_bridge::error::ProtocolError> {
//! let (bus, mut events) = MqttBus::builder()
//!     .host("broker.local")
//!     .credentials("user", "password")
//!     .last_will("projector/bridge/status", "stop")
//!     .build()
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     if event == BusEvent::Connected {
//!         bus.subscribe("projector/+/set").await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS, Transport};
use tokio::sync::{mpsc, oneshot};

use crate::config::MqttSettings;
use crate::error::ProtocolError;

use super::{BusEvent, MessageBus};

/// Counter for unique client ids within one process.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Capacity of the bus event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct MqttBusConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
    last_will: Option<(String, String)>,
    tls: Option<Option<Vec<u8>>>,
}

impl Default for MqttBusConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            credentials: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            last_will: None,
            tls: None,
        }
    }
}

/// A connected MQTT client.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    host: String,
    port: u16,
}

impl MqttBus {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> MqttBusBuilder {
        MqttBusBuilder::default()
    }

    /// Creates a builder from the `mqtt_conf` settings.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Io` if the configured CA file cannot be read.
    pub fn from_settings(settings: &MqttSettings) -> Result<MqttBusBuilder, ProtocolError> {
        let mut builder = Self::builder()
            .host(&settings.host)
            .port(settings.port)
            .keep_alive(Duration::from_secs(settings.keepalive));

        if let Some(username) = &settings.username {
            builder = builder.credentials(username, settings.password.clone().unwrap_or_default());
        }

        if settings.use_tls() {
            let ca = settings.cafile.as_ref().map(std::fs::read).transpose()?;
            builder = builder.tls(ca);
        }

        Ok(builder)
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Disconnects from the broker.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request cannot be queued.
    pub async fn disconnect(&self) -> Result<(), ProtocolError> {
        tracing::info!(host = %self.host, port = %self.port, "Disconnecting from MQTT broker");
        self.client.disconnect().await.map_err(ProtocolError::Mqtt)
    }
}

impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), ProtocolError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(ProtocolError::Mqtt)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(ProtocolError::Mqtt)?;
        tracing::debug!(topic = %topic, "Subscribed");
        Ok(())
    }
}

impl std::fmt::Debug for MqttBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBus")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Builder for an [`MqttBus`].
#[derive(Debug, Default)]
pub struct MqttBusBuilder {
    config: MqttBusConfig,
}

impl MqttBusBuilder {
    /// Sets the broker host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Registers a last-will message the broker publishes if the bridge
    /// disappears.
    #[must_use]
    pub fn last_will(mut self, topic: impl Into<String>, payload: impl Into<String>) -> Self {
        self.config.last_will = Some((topic.into(), payload.into()));
        self
    }

    /// Connects over TLS, trusting the given PEM CA bundle, or the system
    /// roots when `None`.
    #[must_use]
    pub fn tls(mut self, ca: Option<Vec<u8>>) -> Self {
        self.config.tls = Some(ca);
        self
    }

    /// Connects to the broker and waits for the connection acknowledgement.
    ///
    /// Returns the bus and the receiver of its [`BusEvent`]s. The first event
    /// is always [`BusEvent::Connected`].
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Host is not set
    /// - Connection fails
    /// - Connection times out
    pub async fn build(self) -> Result<(MqttBus, mpsc::Receiver<BusEvent>), ProtocolError> {
        if self.config.host.is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }

        let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("optoma_{}_{}", std::process::id(), counter);

        let mut options = MqttOptions::new(&client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive);
        options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.config.credentials {
            options.set_credentials(username, password);
        }
        if let Some((ref topic, ref payload)) = self.config.last_will {
            options.set_last_will(LastWill::new(
                topic,
                payload.as_bytes().to_vec(),
                QoS::AtLeastOnce,
                false,
            ));
        }
        match self.config.tls {
            Some(Some(ca)) => {
                options.set_transport(Transport::tls(ca, None, None));
            }
            Some(None) => {
                options.set_transport(Transport::tls_with_default_config());
            }
            None => {}
        }

        let (client, event_loop) = AsyncClient::new(options, 10);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (connack_tx, connack_rx) = oneshot::channel();

        tokio::spawn(async move {
            handle_bus_events(event_loop, event_tx, Some(connack_tx)).await;
        });

        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(
                    host = %self.config.host,
                    port = %self.config.port,
                    "Connected to MQTT broker"
                );
            }
            Ok(Err(_)) => {
                return Err(ProtocolError::ConnectionFailed(
                    "MQTT event loop terminated unexpectedly".to_string(),
                ));
            }
            Err(_) => {
                return Err(ProtocolError::ConnectionFailed(format!(
                    "MQTT connection timeout after {}s",
                    timeout.as_secs()
                )));
            }
        }

        let bus = MqttBus {
            client,
            host: self.config.host,
            port: self.config.port,
        };
        Ok((bus, event_rx))
    }
}

/// Drives the rumqttc event loop and forwards what matters as [`BusEvent`]s.
///
/// Ends on disconnect or on the first connection error, after sending
/// [`BusEvent::Closed`].
async fn handle_bus_events(
    mut event_loop: EventLoop,
    events: mpsc::Sender<BusEvent>,
    mut connack_tx: Option<oneshot::Sender<()>>,
) {
    loop {
        let event = match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                }
                BusEvent::Connected
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
                continue;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                tracing::trace!(topic = %publish.topic, payload = %payload, "MQTT message received");
                BusEvent::Message {
                    topic: publish.topic,
                    payload,
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                let _ = events.send(BusEvent::Closed).await;
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(error = %e, "MQTT event loop error");
                let _ = events.send(BusEvent::Closed).await;
                break;
            }
        };

        if events.send(event).await.is_err() {
            tracing::debug!("Bus event receiver dropped");
            break;
        }
    }
}
