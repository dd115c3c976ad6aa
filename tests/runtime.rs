// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event loop tests over an in-memory device link and a recording bus.
//!
//! Time is paused, so the dispatch timer and the watchdog run on tokio's
//! virtual clock.

use std::sync::Mutex;
use std::time::Duration;

use optoma_bridge::bridge::Bridge;
use optoma_bridge::command::CommandTable;
use optoma_bridge::config::{BridgeConfig, Lookups};
use optoma_bridge::error::ProtocolError;
use optoma_bridge::protocol::{BusEvent, MessageBus};
use optoma_bridge::runtime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

#[derive(Default)]
struct RecordingBus {
    published: Mutex<Vec<(String, String)>>,
    subscribed: Mutex<Vec<String>>,
}

impl RecordingBus {
    fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().unwrap().clone()
    }
}

impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), ProtocolError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.subscribed.lock().unwrap().push(topic.to_string());
        Ok(())
    }
}

fn bridge() -> Bridge {
    let config = BridgeConfig::from_json(
        r#"{
            "serial_device": "/dev/null",
            "mqtt_conf": { "host": "localhost", "topic_prefix": "p" },
            "amx": { "Make": "Optoma" }
        }"#,
    )
    .unwrap();
    let commands =
        CommandTable::from_json(r#"{ "query": { "power": "124 1" }, "set": { "power.on": "00 1" } }"#)
            .unwrap();
    let lookups = Lookups::from_json(r#"{ "INFO": { "0": "Standby" } }"#).unwrap();
    Bridge::new(&config, commands, lookups, Instant::now().into_std())
}

async fn read_line<R: AsyncRead + Unpin>(reader: &mut R) -> String {
    let mut line = Vec::new();
    loop {
        let byte = reader.read_u8().await.unwrap();
        if byte == b'\r' {
            return String::from_utf8(line).unwrap();
        }
        line.push(byte);
    }
}

fn link() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(256)
}

#[tokio::test(start_paused = true)]
async fn discovery_then_status_publish() {
    let (device, port) = link();
    let bus = RecordingBus::default();
    let (events_tx, events_rx) = mpsc::channel(16);
    events_tx.send(BusEvent::Connected).await.unwrap();

    let script = async {
        let (mut rx, mut tx) = tokio::io::split(device);
        assert_eq!(read_line(&mut rx).await, "AMX");
        tx.write_all(b"AMX<-Make=Optoma>\rINFO0\r").await.unwrap();
        sleep(Duration::from_millis(10)).await;
    };

    tokio::select! {
        fatal = runtime::run(bridge(), port, &bus, events_rx) => panic!("bridge stopped: {fatal}"),
        () = script => {}
    }

    assert_eq!(
        bus.subscribed(),
        vec!["p/ping", "p/+/set", "p/+/query", "p/key"]
    );
    assert_eq!(
        bus.published(),
        vec![("p/status".to_string(), "Standby".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn bus_command_reaches_device() {
    let (device, port) = link();
    let bus = RecordingBus::default();
    let (events_tx, events_rx) = mpsc::channel(16);

    let script = async {
        let (mut rx, mut tx) = tokio::io::split(device);
        assert_eq!(read_line(&mut rx).await, "AMX");
        tx.write_all(b"AMX<-Make=Optoma>\r").await.unwrap();

        events_tx
            .send(BusEvent::Message {
                topic: "p/power/set".to_string(),
                payload: "ON".to_string(),
            })
            .await
            .unwrap();

        let started = Instant::now();
        assert_eq!(read_line(&mut rx).await, "~0000 1");
        assert!(started.elapsed() >= Duration::from_millis(100));
    };

    tokio::select! {
        fatal = runtime::run(bridge(), port, &bus, events_rx) => panic!("bridge stopped: {fatal}"),
        () = script => {}
    }
}

#[tokio::test(start_paused = true)]
async fn closed_transport_exits_with_code_12() {
    let (device, port) = link();
    drop(device);
    let bus = RecordingBus::default();
    let (_events_tx, events_rx) = mpsc::channel(16);

    let fatal = runtime::run(bridge(), port, &bus, events_rx).await;
    assert_eq!(fatal.exit_code(), 12);
}

#[tokio::test(start_paused = true)]
async fn closed_bus_exits_with_code_11() {
    let (_device, port) = link();
    let bus = RecordingBus::default();
    let (events_tx, events_rx) = mpsc::channel(16);
    events_tx.send(BusEvent::Closed).await.unwrap();

    let fatal = runtime::run(bridge(), port, &bus, events_rx).await;
    assert_eq!(fatal.exit_code(), 11);
}

#[tokio::test(start_paused = true)]
async fn silent_bus_times_out() {
    let (_device, port) = link();
    let bus = RecordingBus::default();
    let (_events_tx, events_rx) = mpsc::channel(16);

    let started = Instant::now();
    let fatal = runtime::run(bridge(), port, &bus, events_rx).await;

    assert_eq!(fatal.exit_code(), 11);
    assert!(started.elapsed() >= Duration::from_secs(90));
    assert!(started.elapsed() < Duration::from_secs(96));

    let pings: Vec<_> = bus
        .published()
        .into_iter()
        .filter(|(topic, _)| topic == "p/ping")
        .collect();
    assert_eq!(pings.len(), 1);
}
