//! Session monitor – owns the stage-event subscription, edge-triggered
//! change dispatch, session timing state, and the periodic status sampler.
//!
//! One monitor instance observes one tunnel session. The raw feed delivers
//! stage tokens asynchronously; the monitor normalizes them, drops
//! duplicates, and drives the sampling timer from the transitions into and
//! out of the connected stage. Neither engine pushes duration or counter
//! updates on its own, which is why the sampler exists at all.

use crate::session::stage::parse_stage;
use crate::session::status::sample_status;
use crate::session::transport::ControlTransport;
use crate::session::types::{
    ConnectRequest, InitOptions, Platform, SessionError, SessionErrorKind, SessionInfo, VpnStage,
    VpnStatus,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Callbacks and options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Invoked on every stage edge with the normalized stage and the original
/// raw token (callers may want the raw value for diagnostics).
pub type StageCallback = Box<dyn Fn(VpnStage, &str) + Send + Sync>;

/// Invoked with every status sample taken while connected.
pub type StatusCallback = Box<dyn Fn(VpnStatus) + Send + Sync>;

/// User-supplied notification hooks. Unset callbacks are no-ops.
///
/// Callbacks run inline on the monitor's delivery task – keep them fast or
/// hand the payload off to another task, otherwise the sampling timer will
/// drift.
#[derive(Default)]
pub struct SessionCallbacks {
    pub on_stage_changed: Option<StageCallback>,
    pub on_status_changed: Option<StatusCallback>,
}

/// Monitor tuning knobs.
pub struct MonitorOptions {
    /// Period of the status-sampling timer while connected.
    pub sample_interval: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Shared monitor state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct MonitorInner {
    transport: Arc<dyn ControlTransport>,
    platform: Platform,
    callbacks: SessionCallbacks,
    sample_interval: Duration,
    /// Edge-detection cell; `None` until the first event arrives.
    last_stage: RwLock<Option<VpnStage>>,
    /// Set on the transition into `Connected`, cleared on disconnect.
    /// Fallback duration anchor when the engine timestamp is unusable.
    connected_at: RwLock<Option<DateTime<Utc>>>,
    sampler: RwLock<Option<JoinHandle<()>>>,
}

impl MonitorInner {
    async fn handle_stage_event(inner: &Arc<MonitorInner>, raw: &str) {
        let stage = parse_stage(Some(raw));
        {
            let mut last = inner.last_stage.write().await;
            if *last == Some(stage) {
                return; // edge-triggered: same stage, no notification
            }
            *last = Some(stage);
        }
        log::debug!("stage changed to {} (raw: {:?})", stage, raw);
        if let Some(cb) = &inner.callbacks.on_stage_changed {
            cb(stage, raw);
        }
        match stage {
            VpnStage::Connected => {
                *inner.connected_at.write().await = Some(Utc::now());
                Self::start_sampler(inner).await;
            }
            VpnStage::Disconnected => {
                inner.stop_sampler().await;
                *inner.connected_at.write().await = None;
            }
            _ => {}
        }
    }

    /// (Re)start the sampling timer. At most one timer is ever live:
    /// starting while one is running cancels it and starts fresh.
    async fn start_sampler(inner: &Arc<MonitorInner>) {
        let task = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(task.sample_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // interval yields the first tick immediately
            loop {
                ticker.tick().await;
                // awaited inline, so a slow sample skips ticks instead of
                // racing a second one
                task.sample_once().await;
            }
        });
        if let Some(old) = inner.sampler.write().await.replace(handle) {
            old.abort();
        }
    }

    async fn stop_sampler(&self) {
        if let Some(handle) = self.sampler.write().await.take() {
            handle.abort();
        }
    }

    async fn sample_once(&self) {
        if *self.last_stage.read().await != Some(VpnStage::Connected) {
            return;
        }
        let payload = match self.transport.query_status(self.platform).await {
            Ok(p) => p,
            Err(e) => {
                log::warn!("status query failed: {}", e);
                None
            }
        };
        let fallback = *self.connected_at.read().await;
        let status = sample_status(
            VpnStage::Connected,
            payload.as_deref(),
            self.platform.decoder(),
            fallback,
        );
        if let Some(cb) = &self.callbacks.on_status_changed {
            cb(status);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session monitor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Observes one tunnel session and reports normalized stage and status.
pub struct SessionMonitor {
    inner: Arc<MonitorInner>,
    initialized: RwLock<bool>,
    event_loop: RwLock<Option<JoinHandle<Result<(), SessionError>>>>,
}

impl SessionMonitor {
    pub fn new(
        transport: Arc<dyn ControlTransport>,
        platform: Platform,
        callbacks: SessionCallbacks,
        options: MonitorOptions,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                transport,
                platform,
                callbacks,
                sample_interval: options.sample_interval,
                last_stage: RwLock::new(None),
                connected_at: RwLock::new(None),
                sampler: RwLock::new(None),
            }),
            initialized: RwLock::new(false),
            event_loop: RwLock::new(None),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Set up the engine and start observing the stage-event feed.
    ///
    /// Subscribes before issuing the engine setup command so no event
    /// emitted during setup is missed. Transport failure propagates and
    /// leaves the monitor uninitialized.
    pub async fn initialize(&self, options: &InitOptions) -> Result<(), SessionError> {
        let rx = self.inner.transport.subscribe_stage_events();
        self.inner.transport.initialize(options).await?;
        self.inner.stop_sampler().await;
        *self.inner.last_stage.write().await = None;
        *self.inner.connected_at.write().await = None;
        self.spawn_event_loop(rx).await;
        *self.initialized.write().await = true;
        Ok(())
    }

    /// Bring the tunnel up. Transport failure propagates; no retry.
    pub async fn connect(&self, request: &ConnectRequest) -> Result<(), SessionError> {
        self.ensure_initialized().await?;
        self.inner.transport.connect(request).await
    }

    /// Tear the tunnel down.
    ///
    /// Local timing state and the sampling timer are cleared before the
    /// transport command is issued: the stage feed may lag behind an
    /// explicit disconnect, and no status notification may fire while the
    /// platform response is still pending.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.ensure_initialized().await?;
        self.inner.stop_sampler().await;
        *self.inner.connected_at.write().await = None;
        self.inner.transport.disconnect().await
    }

    /// Stop observing and reset all session state.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.event_loop.write().await.take() {
            handle.abort();
        }
        self.inner.stop_sampler().await;
        *self.inner.last_stage.write().await = None;
        *self.inner.connected_at.write().await = None;
        *self.initialized.write().await = false;
    }

    /// Block until the event loop exits.
    ///
    /// Returns the [`SessionErrorKind::EventFeedClosed`] error when the
    /// underlying subscription terminated; a monitor shut down normally
    /// resolves with `Ok`.
    pub async fn wait(&self) -> Result<(), SessionError> {
        let handle = self.event_loop.write().await.take();
        match handle {
            Some(h) => h.await.unwrap_or(Ok(())),
            None => Ok(()),
        }
    }

    // ── Queries ───────────────────────────────────────────────────

    /// Current stage straight from the engine.
    ///
    /// Query failures and absent tokens degrade to `Disconnected`.
    pub async fn current_stage(&self) -> Result<VpnStage, SessionError> {
        self.ensure_initialized().await?;
        match self.inner.transport.query_stage().await {
            Ok(raw) => Ok(parse_stage(raw.as_deref())),
            Err(e) => {
                log::warn!("stage query failed: {}", e);
                Ok(VpnStage::Disconnected)
            }
        }
    }

    /// One-off status sample outside the timer.
    pub async fn current_status(&self) -> Result<VpnStatus, SessionError> {
        self.ensure_initialized().await?;
        let stage = self.inner.last_stage.read().await.unwrap_or_default();
        if stage != VpnStage::Connected {
            return Ok(VpnStatus::empty());
        }
        let payload = match self.inner.transport.query_status(self.inner.platform).await {
            Ok(p) => p,
            Err(e) => {
                log::warn!("status query failed: {}", e);
                None
            }
        };
        let fallback = *self.inner.connected_at.read().await;
        Ok(sample_status(
            stage,
            payload.as_deref(),
            self.inner.platform.decoder(),
            fallback,
        ))
    }

    /// Ask the OS for tunnel permission.
    pub async fn request_permission(&self) -> Result<bool, SessionError> {
        self.ensure_initialized().await?;
        self.inner.transport.request_permission().await
    }

    /// Point-in-time session snapshot.
    pub async fn info(&self) -> SessionInfo {
        let connected_since = *self.inner.connected_at.read().await;
        SessionInfo {
            stage: self.inner.last_stage.read().await.unwrap_or_default(),
            connected_since,
            uptime_seconds: connected_since
                .map(|t| Utc::now().signed_duration_since(t).num_seconds().max(0) as u64)
                .unwrap_or(0),
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.inner.last_stage.read().await == Some(VpnStage::Connected)
    }

    pub fn platform(&self) -> Platform {
        self.inner.platform
    }

    // ── Internals ─────────────────────────────────────────────────

    async fn spawn_event_loop(&self, mut rx: broadcast::Receiver<String>) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(raw) => MonitorInner::handle_stage_event(&inner, &raw).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("stage event feed lagged, {} events dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        log::error!("stage event feed closed");
                        return Err(SessionError::new(
                            SessionErrorKind::EventFeedClosed,
                            "stage event feed closed",
                        ));
                    }
                }
            }
        });
        if let Some(old) = self.event_loop.write().await.replace(handle) {
            old.abort();
        }
    }

    async fn ensure_initialized(&self) -> Result<(), SessionError> {
        if *self.initialized.read().await {
            Ok(())
        } else {
            Err(SessionError::new(
                SessionErrorKind::NotInitialized,
                "session monitor is not initialized",
            ))
        }
    }
}
