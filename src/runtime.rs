// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-threaded event loop driving a [`Bridge`].
//!
//! One task owns the bridge and waits on every event source at once: bytes
//! from the device, bus events, the dispatch deadline and the three periodic
//! timers. Handlers never overlap, so the bridge needs no locking. After each
//! event the recorded actions are performed in order.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::bridge::{Action, Bridge};
use crate::error::FatalError;
use crate::protocol::{BusEvent, MessageBus};

const READ_BUFFER_SIZE: usize = 256;

/// Runs the bridge until a fatal condition occurs, and returns it.
///
/// `transport` is the device byte stream. `events` delivers what happens on
/// the bus; subscriptions are (re)issued on every [`BusEvent::Connected`].
pub async fn run<T, B>(
    mut bridge: Bridge,
    transport: T,
    bus: &B,
    mut events: mpsc::Receiver<BusEvent>,
) -> FatalError
where
    T: AsyncRead + AsyncWrite + Unpin,
    B: MessageBus,
{
    let (mut reader, mut writer) = tokio::io::split(transport);
    let mut buf = [0u8; READ_BUFFER_SIZE];

    let timing = *bridge.timing();
    let mut keepalive = periodic(timing.keepalive_poll_ms);
    let mut ping = periodic(timing.bus_ping_ms);
    let mut watchdog = periodic(timing.watchdog_ms);

    bridge.start(now());

    loop {
        for action in bridge.take_actions() {
            match action {
                Action::Write(bytes) => {
                    if let Err(e) = write_frame(&mut writer, &bytes).await {
                        tracing::error!(error = %e, "Serial write failed");
                        return FatalError::TransportLost(e.to_string());
                    }
                }
                Action::Publish(publication) => {
                    if let Err(e) = bus.publish(&publication.topic, publication.payload).await {
                        tracing::warn!(topic = %publication.topic, error = %e, "Publish failed");
                    }
                }
                Action::Exit(fatal) => return fatal,
            }
        }

        let deadline = bridge.dispatch_deadline();

        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::error!("Serial port closed");
                    return FatalError::TransportLost("end of stream".to_string());
                }
                Ok(n) => bridge.on_bytes(&buf[..n], now()),
                Err(e) => {
                    tracing::error!(error = %e, "Serial read failed");
                    return FatalError::TransportLost(e.to_string());
                }
            },
            event = events.recv() => match event {
                Some(BusEvent::Connected) => {
                    for topic in bridge.subscriptions() {
                        if let Err(e) = bus.subscribe(&topic).await {
                            tracing::warn!(topic = %topic, error = %e, "Subscribe failed");
                        }
                    }
                }
                Some(BusEvent::Message { topic, payload }) => {
                    bridge.on_bus_message(&topic, &payload, now());
                }
                Some(BusEvent::Closed) | None => {
                    tracing::error!("Message bus connection closed");
                    return FatalError::BusConnectionLost;
                }
            },
            () = sleep_until(deadline) => bridge.on_dispatch_due(now()),
            _ = keepalive.tick() => bridge.on_keepalive_poll(now()),
            _ = ping.tick() => bridge.on_bus_ping(now()),
            _ = watchdog.tick() => bridge.on_watchdog(now()),
        }
    }
}

async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Current instant on tokio's clock, which tests can pause and advance.
fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Interval whose first tick is one period from now.
fn periodic(period_ms: u64) -> Interval {
    let period = Duration::from_millis(period_ms);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
