#![allow(dead_code, clippy::unwrap_used)]
// Shared fakes for the session and bridge tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use stbridge_api::{CommandBatch, Error, Snapshot};
use stbridge_core::{DeviceApi, Intervals, Transport, TransportError};

// ── Vendor API fake ─────────────────────────────────────────────────

pub struct FakeApi {
    status: Mutex<Value>,
    failing_reads: AtomicUsize,
    command_delay: Duration,
    pub reads: AtomicUsize,
    pub commands: Mutex<Vec<(String, CommandBatch)>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeApi {
    pub fn new(status: Value) -> Self {
        Self {
            status: Mutex::new(status),
            failing_reads: AtomicUsize::new(0),
            command_delay: Duration::from_millis(100),
            reads: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// The next `n` reads fail with a decode error.
    pub fn fail_next_reads(self, n: usize) -> Self {
        self.failing_reads.store(n, Ordering::SeqCst);
        self
    }

    pub fn set_status(&self, status: Value) {
        *self.status.lock().unwrap() = status;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// `(capability, command)` of the first command in each batch sent.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(_, batch)| {
                let first = &batch.commands()[0];
                (first.capability.clone(), first.command.clone())
            })
            .collect()
    }

    /// First argument of the first command in each batch, in send order.
    pub fn sent_arguments(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, batch)| {
                let first = batch.commands()[0].arguments.first()?;
                first.as_str().map(str::to_owned)
            })
            .collect()
    }
}

impl DeviceApi for FakeApi {
    fn read_status<'a>(&'a self, _device_id: &'a str) -> BoxFuture<'a, Result<Snapshot, Error>> {
        async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failing_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(Error::Deserialization {
                    message: "expected value at line 1 column 1".into(),
                    body: "<html>".into(),
                });
            }
            let status = self.status.lock().unwrap().clone();
            Snapshot::from_value(status)
        }
        .boxed()
    }

    fn send_command<'a>(
        &'a self,
        device_id: &'a str,
        batch: &'a CommandBatch,
    ) -> BoxFuture<'a, Result<(), Error>> {
        async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.command_delay).await;
            self.commands
                .lock()
                .unwrap()
                .push((device_id.to_owned(), batch.clone()));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }
}

// ── Transport fake ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryTransport {
    pub published: Mutex<Vec<(String, String, bool)>>,
    pub subscribed: Mutex<Vec<String>>,
}

impl MemoryTransport {
    /// Last payload published on `topic`.
    pub fn last(&self, topic: &str) -> Option<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, _, _)| t == topic)
            .map(|(_, payload, _)| payload.clone())
    }

    pub fn topics(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _, _)| t.clone())
            .collect()
    }
}

impl Transport for MemoryTransport {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a str,
        retained: bool,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_owned(), payload.to_owned(), retained));
        async { Ok(()) }.boxed()
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        self.subscribed.lock().unwrap().push(topic.to_owned());
        async { Ok(()) }.boxed()
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub const APP: &str = "stac2mqtt";
pub const DEVICE: &str = "dev-1";

pub fn intervals() -> Intervals {
    Intervals {
        settle_delay: Duration::from_secs(1),
        update_interval: Duration::from_secs(600),
        sensing_delay: Duration::from_secs(5),
        reread_short: Duration::from_millis(500),
        reread_long: Duration::from_secs(2),
        error_retry_delay: Duration::from_secs(5),
    }
}

pub fn room_ac(switch: &str, mode: &str) -> Value {
    json!({
        "ocf": { "n": { "value": "Samsung-Room-Air-Conditioner" } },
        "execute": { "data": { "value": { "payload": {
            "x.com.samsung.da.description": "ARA-WW-TP1-22-COMMON",
            "x.com.samsung.da.serialNum": "SN-0042"
        } } } },
        "switch": { "switch": { "value": switch } },
        "airConditionerMode": { "airConditionerMode": { "value": mode } },
        "airConditionerFanMode": { "fanMode": { "value": "auto" } },
        "temperatureMeasurement": { "temperature": { "value": 24, "unit": "C" } },
        "thermostatCoolingSetpoint": { "coolingSetpoint": { "value": 22 } },
        "custom.thermostatSetpointControl": {
            "minimumSetpoint": { "value": 16 },
            "maximumSetpoint": { "value": 30 }
        }
    })
}

pub fn state_topic(field: &str) -> String {
    format!("{APP}/hvac/{DEVICE}/{field}")
}
