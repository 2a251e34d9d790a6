// ── MQTT adapter ──
//
// Implements the core `Transport` over a rumqttc client. The event loop
// runs in its own task: inbound publishes are forwarded to the bridge
// router, and every recorded subscription is replayed after each ConnAck
// because the broker session is clean. Sending DISCONNECT ends the loop.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use stbridge_config::Config;
use stbridge_core::{InboundMessage, Transport, TransportError};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 64;

/// Broker options from the `[mqtt]` section.
pub fn mqtt_options(config: &Config) -> MqttOptions {
    let mqtt = &config.mqtt;
    let client_id = mqtt
        .client_id
        .clone()
        .unwrap_or_else(|| config.app_name.clone());

    let mut options = MqttOptions::new(client_id, mqtt.host.clone(), mqtt.port);
    options.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs));
    if let Some(username) = &mqtt.username {
        let password = config
            .mqtt_password()
            .map(|p| p.expose_secret().to_owned())
            .unwrap_or_default();
        options.set_credentials(username.clone(), password);
    }
    options
}

pub struct MqttTransport {
    client: AsyncClient,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
}

impl MqttTransport {
    /// Create the client and spawn its event loop.
    pub fn start(
        options: MqttOptions,
        inbound: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (host, port) = options.broker_address();
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let subscriptions = Arc::new(Mutex::new(BTreeSet::new()));

        info!(%host, port, "connecting to MQTT broker");
        let handle = tokio::spawn(event_loop_task(
            event_loop,
            client.clone(),
            Arc::clone(&subscriptions),
            inbound,
            cancel,
        ));
        (
            Arc::new(Self {
                client,
                subscriptions,
            }),
            handle,
        )
    }

    /// Queue a DISCONNECT; the event loop exits after sending it.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "disconnect request not delivered");
        }
    }

    fn remember(&self, topic: &str) -> Result<(), TransportError> {
        self.subscriptions
            .lock()
            .map_err(|_| TransportError::new("subscription set poisoned"))?
            .insert(topic.to_owned());
        Ok(())
    }
}

impl Transport for MqttTransport {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a str,
        retained: bool,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        async move {
            trace!(topic, retained, "publish");
            self.client
                .publish(topic, QoS::AtLeastOnce, retained, payload.as_bytes().to_vec())
                .await
                .map_err(|e| TransportError::new(format!("publish to {topic} failed: {e}")))
        }
        .boxed()
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        async move {
            self.remember(topic)?;
            debug!(topic, "subscribe");
            self.client
                .subscribe(topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| TransportError::new(format!("subscribe to {topic} failed: {e}")))
        }
        .boxed()
    }
}

async fn event_loop_task(
    mut event_loop: EventLoop,
    client: AsyncClient,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
    inbound: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = event_loop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "connected to MQTT broker");
                let topics: Vec<String> = subscriptions
                    .lock()
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default();
                for topic in topics {
                    // Non-blocking: the request queue is drained by this loop.
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        warn!(topic = %topic, error = %e, "resubscribe failed");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                let message = InboundMessage::new(publish.topic, payload);
                if inbound.send(message).await.is_err() {
                    debug!("router gone, stopping MQTT event loop");
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("disconnected from MQTT broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, retry_in = ?RECONNECT_DELAY, "MQTT connection error");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
    debug!("MQTT event loop stopped");
}
