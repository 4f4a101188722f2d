//! Session lifecycle: admit a connection, run its pumps, release it.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, Stream, StreamExt};
use metrics::{counter, gauge};
use tracing::{debug, info};

use super::pumps::{reader_pump, writer_pump};
use super::registry::ConnectionRegistry;
use super::router::MessageRouter;
use super::session::Session;
use crate::config::Heartbeat;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};
use crate::shutdown::ShutdownCoordinator;

/// Admits connections and owns the tasks that serve them.
///
/// Each admitted connection gets a [`Session`] registered under its user,
/// plus a reader and a writer task spawned on the shutdown coordinator.
/// Whichever pump finishes first tears the session down, which closes it
/// and stops the other pump. A pump that panics or is aborted tears down
/// too, when its task drops the `TeardownOnDrop` it owns.
pub struct SessionLifecycle {
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
    shutdown: Arc<ShutdownCoordinator>,
    queue_capacity: usize,
    heartbeat: Heartbeat,
}

impl SessionLifecycle {
    /// Build a lifecycle manager delivering through `router`'s registry.
    pub fn new(
        router: Arc<MessageRouter>,
        shutdown: Arc<ShutdownCoordinator>,
        queue_capacity: usize,
        heartbeat: Heartbeat,
    ) -> Self {
        Self {
            registry: Arc::clone(router.registry()),
            router,
            shutdown,
            queue_capacity,
            heartbeat,
        }
    }

    /// Serve an upgraded axum socket for `user_id`.
    pub fn accept(&self, user_id: impl Into<String>, socket: WebSocket) -> Arc<Session> {
        let (sink, stream) = socket.split();
        self.on_connect(user_id, stream, sink)
    }

    /// Register a session for `user_id` and start its pumps.
    ///
    /// A session already registered for the same user is superseded and
    /// closed. Returns the new session.
    pub fn on_connect<S, K, E>(&self, user_id: impl Into<String>, stream: S, sink: K) -> Arc<Session>
    where
        S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
        K: Sink<Message> + Unpin + Send + 'static,
        K::Error: Display + Send,
    {
        let (session, outbound) =
            Session::new(user_id, self.queue_capacity, self.shutdown.child_token());
        let _previous = self.registry.register(Arc::clone(&session));

        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(user_id = %session.user_id(), session_id = %session.id(), "session opened");

        let writer = TeardownOnDrop::new(&session, &self.registry);
        let heartbeat = self.heartbeat;
        let _writer = self.shutdown.spawn(async move {
            let exit = writer_pump(&writer.session, sink, outbound, heartbeat).await;
            debug!(session_id = %writer.session.id(), ?exit, "writer stopped");
        });

        let reader = TeardownOnDrop::new(&session, &self.registry);
        let router = Arc::clone(&self.router);
        let _reader = self.shutdown.spawn(async move {
            let exit = reader_pump(&reader.session, stream, &router).await;
            debug!(session_id = %reader.session.id(), ?exit, "reader stopped");
        });

        session
    }

    /// Registry of live sessions.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Router inbound frames are handed to.
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }
}

/// Owned by each pump task; tears the session down when the task's future
/// is dropped, whether it returned, panicked or was aborted.
struct TeardownOnDrop {
    session: Arc<Session>,
    registry: Arc<ConnectionRegistry>,
}

impl TeardownOnDrop {
    fn new(session: &Arc<Session>, registry: &Arc<ConnectionRegistry>) -> Self {
        Self {
            session: Arc::clone(session),
            registry: Arc::clone(registry),
        }
    }
}

impl Drop for TeardownOnDrop {
    fn drop(&mut self) {
        let _ = self.session.teardown(&self.registry);
    }
}
