//! Routes parsed chat messages to the recipient's session.
//!
//! Delivery is best-effort: an offline recipient or a full outbound queue
//! drops the message, and the sender is never told. A full queue drops
//! rather than waits so one slow reader cannot stall the senders writing
//! to it.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tbibi_store::{ChatStore, StoreError};
use thiserror::Error;
use tracing::{debug, warn};

use super::message::ChatMessage;
use super::registry::ConnectionRegistry;
use super::session::{EnqueueError, Payload};
use crate::metrics::{
    CHAT_ARCHIVE_ERRORS_TOTAL, CHAT_MESSAGES_ARCHIVED_TOTAL, CHAT_MESSAGES_ROUTED_TOTAL,
};

/// What happened to a routed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued on the recipient's session.
    Delivered,
    /// Recipient has no live session. Dropped.
    RecipientOffline,
    /// Recipient's outbound queue was full. Dropped.
    QueueFull,
    /// Message had no recipient. Dropped.
    Rejected,
}

impl RouteOutcome {
    /// Metric label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::RecipientOffline => "offline",
            Self::QueueFull => "queue_full",
            Self::Rejected => "rejected",
        }
    }
}

/// Failure to persist a routed message.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The chat store refused or failed the write.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The blocking write task did not complete.
    #[error("archive task failed: {0}")]
    Task(String),
}

/// Durable sink for messages received over WebSocket.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageArchive: Send + Sync {
    /// Persist one message.
    async fn archive(&self, message: &ChatMessage) -> Result<(), ArchiveError>;
}

/// [`MessageArchive`] backed by the `SQLite` chat store.
pub struct StoreArchive {
    store: ChatStore,
}

impl StoreArchive {
    /// Wrap a chat store.
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageArchive for StoreArchive {
    async fn archive(&self, message: &ChatMessage) -> Result<(), ArchiveError> {
        let store = self.store.clone();
        let ChatMessage {
            chat_id,
            sender_id,
            content,
            ..
        } = message.clone();
        let _row = tokio::task::spawn_blocking(move || {
            store.append_message(&chat_id, &sender_id, &content)
        })
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))??;
        Ok(())
    }
}

/// Forwards messages between sessions through the registry.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    archive: Option<Arc<dyn MessageArchive>>,
}

impl MessageRouter {
    /// Router that forwards only.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            archive: None,
        }
    }

    /// Persist each routed message before forwarding it.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn MessageArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Registry this router delivers through.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Validate, persist (when archiving is enabled), then forward.
    ///
    /// `payload` is what the recipient receives, normally the sender's frame
    /// unmodified. Archive failures are logged and do not stop delivery.
    pub async fn route(&self, message: &ChatMessage, payload: Payload) -> RouteOutcome {
        if message.recipient_id.is_empty() {
            warn!(
                sender_id = %message.sender_id,
                chat_id = %message.chat_id,
                "chat message without recipient, dropping"
            );
            return Self::record(RouteOutcome::Rejected);
        }

        if let Some(archive) = &self.archive {
            self.archive_message(archive.as_ref(), message).await;
        }

        self.forward(message, payload)
    }

    /// Deliver `payload` to the recipient's session without persisting.
    pub fn forward(&self, message: &ChatMessage, payload: Payload) -> RouteOutcome {
        let recipient = &message.recipient_id;
        let outcome = match self.registry.lookup(recipient) {
            None => {
                debug!(recipient_id = %recipient, "recipient offline, dropping message");
                RouteOutcome::RecipientOffline
            }
            Some(session) => match session.enqueue(payload) {
                Ok(()) => RouteOutcome::Delivered,
                Err(EnqueueError::Full) => {
                    warn!(
                        recipient_id = %recipient,
                        session_id = %session.id(),
                        dropped = session.dropped_count(),
                        "recipient queue full, dropping message"
                    );
                    RouteOutcome::QueueFull
                }
                Err(EnqueueError::Closed) => {
                    debug!(recipient_id = %recipient, "recipient session closing, dropping message");
                    RouteOutcome::RecipientOffline
                }
            },
        };
        Self::record(outcome)
    }

    async fn archive_message(&self, archive: &dyn MessageArchive, message: &ChatMessage) {
        if message.chat_id.is_empty() {
            debug!(sender_id = %message.sender_id, "message has no chat id, not archived");
            return;
        }
        match archive.archive(message).await {
            Ok(()) => counter!(CHAT_MESSAGES_ARCHIVED_TOTAL).increment(1),
            Err(e) => {
                counter!(CHAT_ARCHIVE_ERRORS_TOTAL).increment(1);
                warn!(
                    chat_id = %message.chat_id,
                    sender_id = %message.sender_id,
                    error = %e,
                    "failed to archive chat message"
                );
            }
        }
    }

    fn record(outcome: RouteOutcome) -> RouteOutcome {
        counter!(CHAT_MESSAGES_ROUTED_TOTAL, "outcome" => outcome.as_str()).increment(1);
        outcome
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::realtime::session::Session;

    fn msg(chat: &str, from: &str, to: &str, content: &str) -> ChatMessage {
        ChatMessage {
            chat_id: chat.into(),
            sender_id: from.into(),
            recipient_id: to.into(),
            content: content.into(),
        }
    }

    fn online(
        registry: &ConnectionRegistry,
        user: &str,
        capacity: usize,
    ) -> (Arc<Session>, mpsc::Receiver<Payload>) {
        let (session, rx) = Session::new(user, capacity, CancellationToken::new());
        registry.register(Arc::clone(&session));
        (session, rx)
    }

    #[tokio::test]
    async fn delivers_payload_unmodified() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_s, mut rx) = online(&registry, "u2", 4);
        let router = MessageRouter::new(Arc::clone(&registry));

        let raw = r#"{"chat_id":"c1","sender_id":"u1","recipient_id":"u2","content":"hi"}"#;
        let outcome = router.route(&msg("c1", "u1", "u2", "hi"), Arc::from(raw)).await;

        assert_eq!(outcome, RouteOutcome::Delivered);
        assert_eq!(&*rx.recv().await.unwrap(), raw);
    }

    #[tokio::test]
    async fn offline_recipient_is_dropped() {
        let router = MessageRouter::new(Arc::new(ConnectionRegistry::new()));
        let outcome = router.route(&msg("c1", "u1", "u3", "hi"), Arc::from("x")).await;
        assert_eq!(outcome, RouteOutcome::RecipientOffline);
    }

    #[tokio::test]
    async fn empty_recipient_is_rejected_without_archiving() {
        let mut archive = MockMessageArchive::new();
        archive.expect_archive().never();
        let router = MessageRouter::new(Arc::new(ConnectionRegistry::new()))
            .with_archive(Arc::new(archive));

        let outcome = router.route(&msg("c1", "u1", "", "hi"), Arc::from("x")).await;
        assert_eq!(outcome, RouteOutcome::Rejected);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (session, mut rx) = online(&registry, "u2", 2);
        let router = MessageRouter::new(Arc::clone(&registry));
        let m = msg("c1", "u1", "u2", "hi");

        assert_eq!(router.forward(&m, Arc::from("1")), RouteOutcome::Delivered);
        assert_eq!(router.forward(&m, Arc::from("2")), RouteOutcome::Delivered);
        assert_eq!(router.forward(&m, Arc::from("3")), RouteOutcome::QueueFull);
        assert_eq!(session.dropped_count(), 1);

        assert_eq!(&*rx.recv().await.unwrap(), "1");
        assert_eq!(&*rx.recv().await.unwrap(), "2");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closing_recipient_counts_as_offline() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (session, _rx) = online(&registry, "u2", 2);
        session.close();
        let router = MessageRouter::new(registry);
        assert_eq!(
            router.forward(&msg("c1", "u1", "u2", "hi"), Arc::from("x")),
            RouteOutcome::RecipientOffline
        );
    }

    #[tokio::test]
    async fn archives_before_forwarding() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_s, mut rx) = online(&registry, "u2", 4);

        let mut archive = MockMessageArchive::new();
        archive
            .expect_archive()
            .withf(|m| m.chat_id == "c1" && m.content == "hi")
            .times(1)
            .returning(|_| Ok(()));
        let router = MessageRouter::new(Arc::clone(&registry)).with_archive(Arc::new(archive));

        let outcome = router.route(&msg("c1", "u1", "u2", "hi"), Arc::from("raw")).await;
        assert_eq!(outcome, RouteOutcome::Delivered);
        assert_eq!(&*rx.recv().await.unwrap(), "raw");
    }

    #[tokio::test]
    async fn archive_failure_still_delivers() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_s, mut rx) = online(&registry, "u2", 4);

        let mut archive = MockMessageArchive::new();
        archive
            .expect_archive()
            .times(1)
            .returning(|m| Err(StoreError::ChatNotFound(m.chat_id.clone()).into()));
        let router = MessageRouter::new(Arc::clone(&registry)).with_archive(Arc::new(archive));

        let outcome = router.route(&msg("c1", "u1", "u2", "hi"), Arc::from("raw")).await;
        assert_eq!(outcome, RouteOutcome::Delivered);
        assert_eq!(&*rx.recv().await.unwrap(), "raw");
    }

    #[tokio::test]
    async fn message_without_chat_is_not_archived() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_s, _rx) = online(&registry, "u2", 4);

        let mut archive = MockMessageArchive::new();
        archive.expect_archive().never();
        let router = MessageRouter::new(Arc::clone(&registry)).with_archive(Arc::new(archive));

        let outcome = router.route(&msg("", "u1", "u2", "hi"), Arc::from("raw")).await;
        assert_eq!(outcome, RouteOutcome::Delivered);
    }

    #[tokio::test]
    async fn store_archive_persists_for_participants() {
        let store = ChatStore::open_in_memory().unwrap();
        let chat = store.create_or_find_chat("u1", "u2").unwrap();
        let archive = StoreArchive::new(store.clone());

        archive.archive(&msg(&chat, "u1", "u2", "hello")).await.unwrap();
        let stored = store.list_messages(&chat).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "hello");

        let err = archive
            .archive(&msg("missing", "u1", "u2", "lost"))
            .await
            .unwrap_err();
        assert_matches!(err, ArchiveError::Store(StoreError::ChatNotFound(_)));
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(RouteOutcome::Delivered.as_str(), "delivered");
        assert_eq!(RouteOutcome::QueueFull.as_str(), "queue_full");
    }
}
