//! Boundary contracts toward the native platform layer.
//!
//! The bridge never talks to an engine directly. It sees two things: an
//! asynchronous feed of raw stage tokens, and an opaque request/response
//! transport for commands. Both are defined here; the platform glue
//! implements them.

use crate::session::types::{ConnectRequest, InitOptions, Platform, SessionError};
use async_trait::async_trait;
use tokio::sync::broadcast;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Stage-event feed
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Broadcast feed of raw stage tokens pushed by the native layer.
///
/// Subscribing returns a receiver; dropping the receiver unsubscribes.
/// Tokens emitted while no subscriber exists are discarded.
pub struct StageEventFeed {
    tx: broadcast::Sender<String>,
}

impl StageEventFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Push a raw stage token to all subscribers.
    pub fn emit(&self, raw: impl Into<String>) {
        let _ = self.tx.send(raw.into());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StageEventFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Control transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Opaque command channel to the native engine.
///
/// `query_stage` and `query_status` failures are absorbed by the monitor
/// (treated as disconnected/empty); failures from the remaining commands
/// propagate to the caller unchanged. The monitor never retries.
#[async_trait]
pub trait ControlTransport: Send + Sync {
    /// One-time engine setup. Must complete before any other command.
    async fn initialize(&self, options: &InitOptions) -> Result<(), SessionError>;

    /// Bring the tunnel up with the given config script and credentials.
    async fn connect(&self, request: &ConnectRequest) -> Result<(), SessionError>;

    /// Tear the tunnel down.
    async fn disconnect(&self) -> Result<(), SessionError>;

    /// Current raw stage token, if the engine reports one.
    async fn query_stage(&self) -> Result<Option<String>, SessionError>;

    /// Raw status payload in the given platform's shape, if available.
    async fn query_status(&self, platform: Platform) -> Result<Option<String>, SessionError>;

    /// Ask the OS for tunnel permission. `true` when granted.
    async fn request_permission(&self) -> Result<bool, SessionError>;

    /// Subscribe to the raw stage-event feed.
    fn subscribe_stage_events(&self) -> broadcast::Receiver<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── StageEventFeed ───────────────────────────────────────────

    #[tokio::test]
    async fn feed_delivers_to_subscriber() {
        let feed = StageEventFeed::default();
        let mut rx = feed.subscribe();
        feed.emit("connecting");
        feed.emit("connected");
        assert_eq!(rx.recv().await.unwrap(), "connecting");
        assert_eq!(rx.recv().await.unwrap(), "connected");
    }

    #[tokio::test]
    async fn feed_emit_without_subscribers_is_discarded() {
        let feed = StageEventFeed::default();
        feed.emit("connected");
        let mut rx = feed.subscribe();
        feed.emit("disconnected");
        // only the post-subscription event arrives
        assert_eq!(rx.recv().await.unwrap(), "disconnected");
    }

    #[tokio::test]
    async fn feed_fans_out_to_all_subscribers() {
        let feed = StageEventFeed::new(8);
        let mut a = feed.subscribe();
        let mut b = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);
        feed.emit("prepare");
        assert_eq!(a.recv().await.unwrap(), "prepare");
        assert_eq!(b.recv().await.unwrap(), "prepare");
    }

    #[tokio::test]
    async fn feed_closes_when_dropped() {
        let feed = StageEventFeed::default();
        let mut rx = feed.subscribe();
        drop(feed);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
