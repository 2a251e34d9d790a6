#![allow(clippy::unwrap_used)]
// Registration, discovery and routing through the bridge facade.

mod common;

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pretty_assertions::assert_eq;
use serde_json::json;
use stbridge_core::{
    Bridge, BridgeConfig, DeviceConfig, DriverRegistry, INBOUND_CHANNEL_SIZE, InboundMessage,
    SyncState, Transport, TransportError,
};
use tokio::sync::mpsc;

use common::{APP, DEVICE, FakeApi, MemoryTransport, intervals, room_ac, state_topic};

fn config() -> BridgeConfig {
    let mut config = BridgeConfig::new(APP).unwrap();
    config.app_version = "9.9.9".into();
    config.intervals = intervals();
    config.trigger_sensing = false;
    config.devices = vec![DeviceConfig {
        device_id: DEVICE.into(),
        name: Some("Bedroom AC".into()),
        area: Some("Bedroom".into()),
    }];
    config
}

fn bridge(api: FakeApi) -> (Bridge, Arc<FakeApi>, Arc<MemoryTransport>) {
    let api = Arc::new(api);
    let transport = Arc::new(MemoryTransport::default());
    let bridge = Bridge::new(
        config(),
        api.clone(),
        transport.clone(),
        DriverRegistry::builtin(),
    );
    (bridge, api, transport)
}

#[tokio::test(start_paused = true)]
async fn registration_clears_announces_and_subscribes() {
    let (bridge, _api, transport) = bridge(FakeApi::new(room_ac("on", "cool")));

    let session = bridge.register(&config().devices[0]).await.unwrap();
    assert_eq!(session.profile().serial_number.as_deref(), Some("SN-0042"));
    assert_eq!(bridge.session_count(), 1);

    let published = transport.published.lock().unwrap().clone();
    let (clears, announcements) = published.split_at(4);
    assert!(clears.iter().all(|(_, payload, retained)| payload == "{}" && *retained));
    assert_eq!(clears[0].0, "homeassistant/climate/dev-1/config");
    assert_eq!(announcements.len(), 4);

    let climate: serde_json::Value = serde_json::from_str(&announcements[0].1).unwrap();
    assert_eq!(climate["name"], "Bedroom AC");
    assert_eq!(climate["sw_version"], "9.9.9");
    assert_eq!(climate["max_temp"], json!(30.0));

    let mut subscribed = transport.subscribed.lock().unwrap().clone();
    subscribed.sort();
    assert_eq!(
        subscribed,
        vec![
            "stac2mqtt/hvac/dev-1/autocleaning/set",
            "stac2mqtt/hvac/dev-1/fan/set",
            "stac2mqtt/hvac/dev-1/mode/set",
            "stac2mqtt/hvac/dev-1/preset/set",
            "stac2mqtt/hvac/dev-1/swing_mode/set",
            "stac2mqtt/hvac/dev-1/target_temperature/set",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn discovery_can_be_disabled() {
    let api = Arc::new(FakeApi::new(room_ac("on", "cool")));
    let transport = Arc::new(MemoryTransport::default());
    let mut config = config();
    config.discovery.enabled = false;
    let bridge = Bridge::new(config.clone(), api, transport.clone(), DriverRegistry::builtin());

    bridge.register(&config.devices[0]).await.unwrap();
    assert!(transport.published.lock().unwrap().is_empty());
    assert_eq!(transport.subscribed.lock().unwrap().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn unsupported_devices_are_skipped_without_retry() {
    let washer = json!({
        "ocf": { "n": { "value": "Samsung-Washer" } },
        "switch": { "switch": { "value": "off" } }
    });
    let (bridge, api, transport) = bridge(FakeApi::new(washer));
    let (_tx, rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);

    bridge.start(rx).await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(api.reads(), 1);
    assert_eq!(bridge.session_count(), 0);
    assert!(transport.subscribed.lock().unwrap().is_empty());
    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_registration_is_retried() {
    let (bridge, api, _transport) = bridge(FakeApi::new(room_ac("on", "cool")).fail_next_reads(2));
    let (_tx, rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);

    bridge.start(rx).await;
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(api.reads(), 1);
    assert_eq!(bridge.session_count(), 0);

    // Retries at 5s and 10s; the second one succeeds.
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(bridge.session_count(), 1);
    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn inbound_messages_are_routed_to_the_owning_session() {
    let (bridge, api, transport) = bridge(FakeApi::new(room_ac("on", "cool")));
    let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);

    bridge.start(rx).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(transport.last(&state_topic("mode")).as_deref(), Some("cool"));

    api.set_status(room_ac("off", "cool"));
    tx.send(InboundMessage::new(format!("{APP}/hvac/{DEVICE}/mode/set"), "off"))
        .await
        .unwrap();
    tx.send(InboundMessage::new(format!("{APP}/hvac/{DEVICE}/mode"), "off"))
        .await
        .unwrap();
    tx.send(InboundMessage::new(format!("{APP}/hvac/unknown/mode/set"), "off"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(api.sent(), vec![("switch".to_owned(), "off".to_owned())]);
    assert_eq!(transport.last(&state_topic("mode")).as_deref(), Some("off"));
    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn route_reports_unowned_topics() {
    let (bridge, _api, _transport) = bridge(FakeApi::new(room_ac("on", "cool")));
    assert!(!bridge.route(InboundMessage::new("elsewhere/topic", "1")));
    assert!(!bridge.route(InboundMessage::new(
        format!("{APP}/hvac/{DEVICE}/fan/set"),
        "auto"
    )));

    bridge.register(&config().devices[0]).await.unwrap();
    assert!(bridge.route(InboundMessage::new(
        format!("{APP}/hvac/{DEVICE}/fan/set"),
        "auto"
    )));
    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_every_session() {
    let (bridge, _api, _transport) = bridge(FakeApi::new(room_ac("on", "cool")));
    let (_tx, rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);

    bridge.start(rx).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    let mut state = bridge.session(DEVICE).unwrap().state();

    bridge.shutdown().await;
    state.wait_for(|s| *s == SyncState::Stopped).await.unwrap();
}

#[tokio::test]
async fn probe_translates_without_registering() {
    let api = FakeApi::new(room_ac("on", "cool"));
    let probe = stbridge_core::probe(&api, &DriverRegistry::builtin(), DEVICE)
        .await
        .unwrap();

    assert_eq!(probe.driver, Some("samsung-room-ac"));
    let fields = probe.fields.unwrap().unwrap();
    assert_eq!(fields.mode, "cool");
    assert_eq!(fields.target_temperature, Some(22.0));
    assert_eq!(api.reads(), 1);
    assert!(api.sent().is_empty());
}

#[tokio::test]
async fn probe_reports_unsupported_devices() {
    let api = FakeApi::new(json!({ "ocf": { "n": { "value": "Samsung-Washer" } } }));
    let probe = stbridge_core::probe(&api, &DriverRegistry::builtin(), DEVICE)
        .await
        .unwrap();

    assert_eq!(probe.driver, None);
    assert!(probe.fields.is_none());
}

/// Routes a `/set` on every topic as soon as it is subscribed, the way a
/// retained command arrives from the broker.
#[derive(Default)]
struct EagerTransport {
    bridge: OnceLock<Bridge>,
    fail_subscribe: bool,
    routed: Mutex<Vec<bool>>,
}

impl Transport for EagerTransport {
    fn publish<'a>(
        &'a self,
        _topic: &'a str,
        _payload: &'a str,
        _retained: bool,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        async { Ok(()) }.boxed()
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        async move {
            if self.fail_subscribe {
                return Err(TransportError::new("not connected"));
            }
            let bridge = self.bridge.get().unwrap();
            let routed = bridge.route(InboundMessage::new(topic, "auto"));
            self.routed.lock().unwrap().push(routed);
            Ok(())
        }
        .boxed()
    }
}

fn eager_bridge(fail_subscribe: bool) -> (Bridge, Arc<EagerTransport>) {
    let transport = Arc::new(EagerTransport {
        fail_subscribe,
        ..EagerTransport::default()
    });
    let bridge = Bridge::new(
        config(),
        Arc::new(FakeApi::new(room_ac("on", "cool"))),
        transport.clone(),
        DriverRegistry::builtin(),
    );
    transport.bridge.set(bridge.clone()).ok().unwrap();
    (bridge, transport)
}

#[tokio::test(start_paused = true)]
async fn session_is_routable_while_subscribing() {
    let (bridge, transport) = eager_bridge(false);

    bridge.register(&config().devices[0]).await.unwrap();

    let routed = transport.routed.lock().unwrap().clone();
    assert_eq!(routed, vec![true; 6]);
    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_subscription_unregisters_the_session() {
    let (bridge, transport) = eager_bridge(true);

    assert!(bridge.register(&config().devices[0]).await.is_err());
    assert_eq!(bridge.session_count(), 0);
    assert!(bridge.session(DEVICE).is_none());
    assert!(transport.routed.lock().unwrap().is_empty());
    bridge.shutdown().await;
}
