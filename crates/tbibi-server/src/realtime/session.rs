//! Per-connection session state shared by the reader and writer pumps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::info;

use super::registry::ConnectionRegistry;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_DISCONNECTIONS_TOTAL,
};

/// A serialized frame queued for delivery. Shared, so one inbound frame can
/// be forwarded without copying.
pub type Payload = Arc<str>;

/// Why a payload could not be queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// The outbound queue is at capacity. The payload was dropped.
    #[error("outbound queue full")]
    Full,
    /// The session is closing or closed.
    #[error("session closed")]
    Closed,
}

/// One connected user's duplex channel.
///
/// Holds the sending half of the bounded outbound queue (the writer pump
/// owns the receiving half) and the cancellation token both pumps select
/// on. Closing the session cancels that token.
pub struct Session {
    id: String,
    user_id: String,
    outbound: mpsc::Sender<Payload>,
    cancel: CancellationToken,
    torn_down: AtomicBool,
    connected_at: Instant,
    last_seen: Mutex<tokio::time::Instant>,
    dropped: AtomicU64,
}

impl Session {
    /// Create a session and the receiving half of its outbound queue.
    pub fn new(
        user_id: impl Into<String>,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let session = Arc::new(Self {
            id: format!("sess_{}", uuid::Uuid::now_v7()),
            user_id: user_id.into(),
            outbound: tx,
            cancel,
            torn_down: AtomicBool::new(false),
            connected_at: Instant::now(),
            last_seen: Mutex::new(tokio::time::Instant::now()),
            dropped: AtomicU64::new(0),
        });
        (session, rx)
    }

    /// Unique id of this connection.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// User the connection belongs to.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Queue a payload for the writer without waiting.
    pub fn enqueue(&self, payload: Payload) -> Result<(), EnqueueError> {
        if self.is_closed() {
            return Err(EnqueueError::Closed);
        }
        match self.outbound.try_send(payload) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(EnqueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Ask both pumps to stop. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the session has been asked to stop.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = tokio::time::Instant::now();
    }

    /// Time since the last inbound frame (or since connect). Follows the
    /// tokio clock, so paused-time tests can drive it.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Payloads dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Whether teardown has already run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Release the session: close it and remove it from the registry.
    ///
    /// Both pumps call this when they exit. Only the first caller does the
    /// work and gets `true`; later or concurrent callers get `false`.
    pub fn teardown(self: &Arc<Self>, registry: &ConnectionRegistry) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.close();
        let removed = registry.deregister(&self.user_id, self);

        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(self.age().as_secs_f64());
        info!(
            user_id = %self.user_id,
            session_id = %self.id,
            deregistered = removed,
            dropped = self.dropped_count(),
            "session closed"
        );
        true
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
