// ── Bridge facade ──
//
// Registers each configured device (first status read, driver lookup,
// discovery announcement, command subscriptions), starts its session, and
// routes inbound command messages to the owning session.

use std::sync::Arc;

use dashmap::DashMap;
use stbridge_api::CredentialStore;
use strum::IntoEnumIterator;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::api::{DeviceApi, build_client};
use crate::config::{BridgeConfig, DeviceConfig};
use crate::discovery::{Announcer, CLEAR_PAYLOAD};
use crate::driver::DriverRegistry;
use crate::error::CoreError;
use crate::model::CanonicalFields;
use crate::session::{DeviceSession, SessionContext, sleep_or_cancel};
use crate::topics::{Setting, TopicScheme};
use crate::transport::{InboundMessage, Transport};
use crate::translate;

/// Result of a one-off read used by `check-config`.
#[derive(Debug, Clone)]
pub struct Probe {
    pub device_id: String,
    /// Matching driver, `None` if the device is unsupported.
    pub driver: Option<&'static str>,
    /// Canonical fields, when a driver matched and translation succeeded.
    pub fields: Option<Result<CanonicalFields, String>>,
}

/// The main entry point for the binary.
///
/// Cheaply cloneable via `Arc<BridgeInner>`.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    ctx: SessionContext,
    registry: DriverRegistry,
    sessions: DashMap<String, DeviceSession>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Build a bridge around an existing API implementation.
    pub fn new(
        config: BridgeConfig,
        api: Arc<dyn DeviceApi>,
        transport: Arc<dyn Transport>,
        registry: DriverRegistry,
    ) -> Self {
        let ctx = SessionContext {
            api,
            transport,
            topics: config.topics(),
            intervals: config.intervals,
            trigger_sensing: config.trigger_sensing,
        };
        Self {
            inner: Arc::new(BridgeInner {
                config,
                ctx,
                registry,
                sessions: DashMap::new(),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build the vendor client from `config.api` and credentials in `store`.
    pub fn connect(
        config: BridgeConfig,
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let client = build_client(&config.api, store)?;
        Ok(Self::new(
            config,
            Arc::new(client),
            transport,
            DriverRegistry::builtin(),
        ))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn topics(&self) -> &TopicScheme {
        &self.inner.ctx.topics
    }

    pub fn session(&self, device_id: &str) -> Option<DeviceSession> {
        self.inner.sessions.get(device_id).map(|s| s.value().clone())
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the router and one registration task per configured device.
    ///
    /// Returns immediately; devices come online as their first read
    /// succeeds.
    pub async fn start(&self, inbound: mpsc::Receiver<InboundMessage>) {
        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(router_task(
            self.clone(),
            inbound,
            self.inner.cancel.clone(),
        )));
        for device in self.inner.config.devices.clone() {
            let bridge = self.clone();
            handles.push(tokio::spawn(async move {
                bridge.register_with_retry(device).await;
            }));
        }
        info!(devices = self.inner.config.devices.len(), "bridge started");
    }

    /// Cancel every session and wait for background tasks to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        debug!("bridge stopped");
    }

    // ── Registration ─────────────────────────────────────────────────

    async fn register_with_retry(&self, device: DeviceConfig) {
        let delay = self.inner.config.intervals.error_retry_delay;
        loop {
            match self.register(&device).await {
                Ok(_) => return,
                Err(e @ CoreError::UnsupportedDevice { .. }) => {
                    warn!(device_id = %device.device_id, error = %e, "skipping device");
                    return;
                }
                Err(e) => {
                    warn!(
                        device_id = %device.device_id,
                        error = %e,
                        retry_in = ?delay,
                        "device registration failed"
                    );
                    if !sleep_or_cancel(&self.inner.cancel, delay).await {
                        return;
                    }
                }
            }
        }
    }

    /// Register one device: read, match a driver, announce, subscribe,
    /// and start its session.
    pub async fn register(&self, device: &DeviceConfig) -> Result<DeviceSession, CoreError> {
        let ctx = &self.inner.ctx;
        let device_id = device.device_id.as_str();

        let snapshot = ctx.api.read_status(device_id).await?;
        let driver = self
            .inner
            .registry
            .resolve(&snapshot)
            .ok_or_else(|| CoreError::UnsupportedDevice {
                device_id: device_id.to_owned(),
            })?;
        let profile = (driver.build)(device, &snapshot);
        info!(device_id, driver = driver.name, serial = ?profile.serial_number, "device recognized");

        if self.inner.config.discovery.enabled {
            let announcer = Announcer {
                topics: &ctx.topics,
                app_version: &self.inner.config.app_version,
            };
            for topic in announcer.config_topics(device_id) {
                ctx.transport.publish(&topic, CLEAR_PAYLOAD, true).await?;
            }
            for (topic, payload) in announcer.messages(&profile) {
                ctx.transport.publish(&topic, &payload, true).await?;
            }
        }

        // Routable before the first subscription so no early `/set` is lost.
        let session = DeviceSession::new(profile, ctx.clone(), self.inner.cancel.child_token());
        if let Some(previous) = self
            .inner
            .sessions
            .insert(device_id.to_owned(), session.clone())
        {
            previous.cancel();
        }
        let handle = session.spawn();
        self.inner.task_handles.lock().await.push(handle);

        if let Err(e) = self.subscribe_commands(device_id).await {
            self.inner.sessions.remove(device_id);
            session.cancel();
            return Err(e);
        }
        Ok(session)
    }

    async fn subscribe_commands(&self, device_id: &str) -> Result<(), CoreError> {
        let ctx = &self.inner.ctx;
        for setting in Setting::iter() {
            ctx.transport
                .subscribe(&ctx.topics.command(device_id, setting))
                .await?;
        }
        Ok(())
    }

    // ── Routing ──────────────────────────────────────────────────────

    /// Hand an inbound message to its session. `false` if nothing owns
    /// the topic.
    pub fn route(&self, message: InboundMessage) -> bool {
        let Some((device_id, setting)) = self.inner.ctx.topics.parse_command(&message.topic) else {
            trace!(topic = %message.topic, "ignoring non-command topic");
            return false;
        };
        let Some(session) = self.session(&device_id) else {
            debug!(device_id = %device_id, topic = %message.topic, "command for unregistered device");
            return false;
        };
        session.submit(setting, message.payload);
        true
    }
}

/// Read one device once without registering it.
pub async fn probe(
    api: &dyn DeviceApi,
    registry: &DriverRegistry,
    device_id: &str,
) -> Result<Probe, CoreError> {
    let snapshot = api.read_status(device_id).await?;
    let driver = registry.resolve(&snapshot).map(|d| d.name);
    let fields =
        driver.map(|_| translate::canonical_fields(&snapshot).map_err(|e| e.to_string()));
    Ok(Probe {
        device_id: device_id.to_owned(),
        driver,
        fields,
    })
}

/// Drain the inbound channel, spawning one dispatch per command.
async fn router_task(
    bridge: Bridge,
    mut rx: mpsc::Receiver<InboundMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => {
                let Some(message) = message else { break };
                bridge.route(message);
            }
        }
    }
    debug!("router stopped");
}
