// ── Device session ──
//
// One per managed device. Owns the per-device command lock, the periodic
// poll loop, and the delayed re-reads after a command. Reads never take
// the lock; command batches and sensing triggers always do.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::DeviceApi;
use crate::config::Intervals;
use crate::error::CoreError;
use crate::model::{CanonicalFields, DeviceProfile, SyncState};
use crate::topics::{Setting, TopicScheme};
use crate::transport::Transport;
use crate::translate;

/// Shared collaborators handed to every session.
#[derive(Clone)]
pub struct SessionContext {
    pub api: Arc<dyn DeviceApi>,
    pub transport: Arc<dyn Transport>,
    pub topics: TopicScheme,
    pub intervals: Intervals,
    pub trigger_sensing: bool,
}

/// Handle to one device's synchronizer.
///
/// Cheaply cloneable via `Arc<SessionInner>`.
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    profile: DeviceProfile,
    ctx: SessionContext,
    /// Serializes command batches and sensing triggers.
    command_lock: Mutex<()>,
    cancel: CancellationToken,
    state: watch::Sender<SyncState>,
    refreshing: AtomicUsize,
    dispatching: AtomicUsize,
}

#[derive(Debug, Clone, Copy)]
enum Activity {
    Refreshing,
    Dispatching,
}

/// Marks an operation in flight; recomputes the sync state on drop.
struct ActivityGuard<'a> {
    inner: &'a SessionInner,
    activity: Activity,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.inner.counter(self.activity).fetch_sub(1, Ordering::SeqCst);
        self.inner.publish_state();
    }
}

impl SessionInner {
    fn counter(&self, activity: Activity) -> &AtomicUsize {
        match activity {
            Activity::Refreshing => &self.refreshing,
            Activity::Dispatching => &self.dispatching,
        }
    }

    fn begin(&self, activity: Activity) -> ActivityGuard<'_> {
        self.counter(activity).fetch_add(1, Ordering::SeqCst);
        self.publish_state();
        ActivityGuard {
            inner: self,
            activity,
        }
    }

    /// Dispatching outranks Refreshing; Settling and Stopped are sticky.
    fn publish_state(&self) {
        let next = if self.dispatching.load(Ordering::SeqCst) > 0 {
            SyncState::Dispatching
        } else if self.refreshing.load(Ordering::SeqCst) > 0 {
            SyncState::Refreshing
        } else {
            SyncState::Idle
        };
        self.state.send_if_modified(|current| {
            if matches!(current, SyncState::Settling | SyncState::Stopped) || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl DeviceSession {
    pub fn new(profile: DeviceProfile, ctx: SessionContext, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(SyncState::Settling);
        Self {
            inner: Arc::new(SessionInner {
                profile,
                ctx,
                command_lock: Mutex::new(()),
                cancel,
                state,
                refreshing: AtomicUsize::new(0),
                dispatching: AtomicUsize::new(0),
            }),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.inner.profile.device_id
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.inner.profile
    }

    /// Subscribe to sync state changes.
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Stop the background loop and any pending re-reads.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    // ── Background loop ──────────────────────────────────────────────

    /// Spawn the settle-then-poll loop.
    pub fn spawn(&self) -> JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }

    async fn run(self) {
        let device_id = self.device_id().to_owned();
        let intervals = self.inner.ctx.intervals;
        let cancel = self.inner.cancel.clone();

        debug!(device_id = %device_id, delay = ?intervals.settle_delay, "settling");
        if sleep_or_cancel(&cancel, intervals.settle_delay).await {
            self.inner.state.send_replace(SyncState::Idle);
            info!(device_id = %device_id, "device session started");

            if let Err(e) = self.refresh().await {
                self.report("initial refresh", &e);
            }

            let mut interval = tokio::time::interval(intervals.update_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => self.poll_cycle().await,
                }
            }
        }

        self.inner.state.send_replace(SyncState::Stopped);
        debug!(device_id = %device_id, "device session stopped");
    }

    /// One periodic cycle: optional sensing trigger, then a status read.
    async fn poll_cycle(&self) {
        if self.inner.ctx.trigger_sensing {
            match self.trigger_sensing().await {
                Ok(()) => {
                    if !sleep_or_cancel(&self.inner.cancel, self.inner.ctx.intervals.sensing_delay)
                        .await
                    {
                        return;
                    }
                }
                Err(e) => self.report("sensing trigger", &e),
            }
        }
        if let Err(e) = self.refresh().await {
            self.report("periodic refresh", &e);
        }
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Read status, translate, publish. Returns the published fields.
    pub async fn refresh(&self) -> Result<CanonicalFields, CoreError> {
        let _activity = self.inner.begin(Activity::Refreshing);
        let ctx = &self.inner.ctx;
        let device_id = self.device_id();

        let snapshot = ctx.api.read_status(device_id).await?;
        let fields = translate::canonical_fields(&snapshot)?;

        for (topic, payload) in fields.entries() {
            ctx.transport
                .publish(&ctx.topics.state(device_id, topic), &payload, true)
                .await?;
        }
        debug!(device_id, mode = %fields.mode, action = %fields.action, "state published");
        Ok(fields)
    }

    /// Ask the unit to re-sample its sensors.
    pub async fn trigger_sensing(&self) -> Result<(), CoreError> {
        let _lock = self.inner.command_lock.lock().await;
        let _activity = self.inner.begin(Activity::Dispatching);
        debug!(device_id = self.device_id(), "triggering manual sensing");
        self.inner
            .ctx
            .api
            .send_command(self.device_id(), &translate::sensing_batch())
            .await?;
        Ok(())
    }

    /// Translate and send one inbound command, then schedule re-reads.
    ///
    /// Waits out the settle delay first. Holds the device lock only while
    /// the batch is in flight.
    pub async fn dispatch(&self, setting: Setting, payload: &str) -> Result<(), CoreError> {
        let batch = translate::command_for(setting, payload)?;
        if !self.wait_settled().await {
            return Err(CoreError::ShuttingDown);
        }

        {
            let _lock = self.inner.command_lock.lock().await;
            let _activity = self.inner.begin(Activity::Dispatching);
            info!(device_id = self.device_id(), %setting, payload, "dispatching command");
            self.inner
                .ctx
                .api
                .send_command(self.device_id(), &batch)
                .await?;
        }

        self.schedule_rereads();
        Ok(())
    }

    /// Run [`dispatch`](Self::dispatch) on its own task, logging failures.
    pub fn submit(&self, setting: Setting, payload: String) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            if let Err(e) = session.dispatch(setting, &payload).await {
                session.report("command", &e);
            }
        })
    }

    fn schedule_rereads(&self) {
        let intervals = self.inner.ctx.intervals;
        for delay in [intervals.reread_short, intervals.reread_long] {
            let session = self.clone();
            tokio::spawn(async move {
                if sleep_or_cancel(&session.inner.cancel, delay).await {
                    if let Err(e) = session.refresh().await {
                        session.report("re-read", &e);
                    }
                }
            });
        }
    }

    /// `false` if the session was cancelled while settling.
    async fn wait_settled(&self) -> bool {
        let mut state = self.state();
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => false,
            settled = state.wait_for(|s| *s != SyncState::Settling) => {
                matches!(settled.as_deref(), Ok(s) if *s != SyncState::Stopped)
            }
        }
    }

    fn report(&self, operation: &str, err: &CoreError) {
        let device_id = self.device_id();
        match err {
            CoreError::AuthenticationFailed { .. } => {
                error!(device_id, operation, error = %err, "credentials rejected");
            }
            CoreError::ShuttingDown => {
                debug!(device_id, operation, "dropped during shutdown");
            }
            e if e.is_retryable() => {
                warn!(device_id, operation, error = %e, "transient device failure");
            }
            _ => warn!(device_id, operation, error = %err, "device operation failed"),
        }
    }
}

/// Sleep for `delay` unless cancelled first. `true` if the sleep completed.
pub(crate) async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
