//! Reader and writer loops for one session.
//!
//! Each connection gets exactly one reader (socket to router) and one
//! writer (outbound queue plus heartbeat to socket). Both loops select on
//! the session's cancellation first, so closing the session stops them at
//! the next frame boundary. Neither loop tears the session down itself;
//! the caller does that once a loop returns.
//!
//! The loops are generic over `Stream`/`Sink` so they run against any
//! transport carrying axum [`Message`]s.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::message::ChatMessage;
use super::router::MessageRouter;
use super::session::{Payload, Session};
use crate::config::Heartbeat;
use crate::metrics::CHAT_FRAMES_MALFORMED_TOTAL;

/// Why a pump stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpExit {
    /// The peer sent a close frame.
    PeerClosed,
    /// The inbound stream ended without a close frame.
    StreamEnded,
    /// Reading from or writing to the socket failed.
    TransportError,
    /// The session was closed (superseded, torn down, or shutdown).
    Cancelled,
    /// Every sender of the outbound queue is gone.
    QueueClosed,
    /// Nothing was received within the heartbeat timeout.
    HeartbeatTimeout,
}

/// Read frames until the peer goes away or the session closes.
///
/// Text frames, and binary frames holding UTF-8, are parsed as
/// [`ChatMessage`]s and routed with the raw frame as payload. Malformed
/// frames are logged and skipped. Any inbound frame counts as liveness.
#[instrument(skip_all, fields(user_id = %session.user_id(), session_id = %session.id()))]
pub async fn reader_pump<S, E>(session: &Session, mut stream: S, router: &MessageRouter) -> PumpExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = session.closed() => return PumpExit::Cancelled,
            frame = stream.next() => frame,
        };

        match frame {
            None => return PumpExit::StreamEnded,
            Some(Err(e)) => {
                debug!(session_id = %session.id(), error = %e, "websocket read failed");
                return PumpExit::TransportError;
            }
            Some(Ok(Message::Text(text))) => {
                session.mark_alive();
                handle_frame(session, router, text.as_str()).await;
            }
            Some(Ok(Message::Binary(data))) => {
                session.mark_alive();
                if let Ok(text) = std::str::from_utf8(&data) {
                    handle_frame(session, router, text).await;
                } else {
                    counter!(CHAT_FRAMES_MALFORMED_TOTAL).increment(1);
                    warn!(
                        session_id = %session.id(),
                        len = data.len(),
                        "non-UTF8 binary frame, skipping"
                    );
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => session.mark_alive(),
            Some(Ok(Message::Close(_))) => {
                info!(session_id = %session.id(), user_id = %session.user_id(), "client sent close frame");
                return PumpExit::PeerClosed;
            }
        }
    }
}

async fn handle_frame(session: &Session, router: &MessageRouter, text: &str) {
    match ChatMessage::parse(text) {
        Ok(message) => {
            let _outcome = router.route(&message, Arc::from(text)).await;
        }
        Err(e) => {
            counter!(CHAT_FRAMES_MALFORMED_TOTAL).increment(1);
            warn!(
                session_id = %session.id(),
                user_id = %session.user_id(),
                error = %e,
                "malformed chat frame, skipping"
            );
        }
    }
}

/// Drain the outbound queue to the socket and keep the connection alive.
///
/// Pings every [`Heartbeat::ping_period`]. When nothing has been received for
/// longer than `heartbeat.timeout` the pump stops. On exit it makes a
/// best-effort attempt to send a close frame.
#[instrument(skip_all, fields(user_id = %session.user_id(), session_id = %session.id()))]
pub async fn writer_pump<K>(
    session: &Session,
    mut sink: K,
    mut outbound: mpsc::Receiver<Payload>,
    heartbeat: Heartbeat,
) -> PumpExit
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let mut ping = time::interval(heartbeat.ping_period());
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    let exit = loop {
        tokio::select! {
            biased;
            () = session.closed() => break PumpExit::Cancelled,
            next = outbound.recv() => {
                let Some(payload) = next else { break PumpExit::QueueClosed };
                if let Err(e) = sink.send(Message::Text(payload.to_string().into())).await {
                    debug!(session_id = %session.id(), error = %e, "websocket write failed");
                    break PumpExit::TransportError;
                }
            }
            _ = ping.tick() => {
                let idle = session.last_seen_elapsed();
                if idle > heartbeat.timeout {
                    warn!(
                        session_id = %session.id(),
                        user_id = %session.user_id(),
                        idle_secs = idle.as_secs(),
                        "client unresponsive, disconnecting"
                    );
                    break PumpExit::HeartbeatTimeout;
                }
                if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
                    debug!(session_id = %session.id(), error = %e, "ping failed");
                    break PumpExit::TransportError;
                }
            }
        }
    };

    if exit != PumpExit::TransportError {
        let _ = sink.send(Message::Close(None)).await;
    }
    let _ = sink.close().await;
    exit
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use std::time::Duration;

    use futures::channel::mpsc as fmpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::realtime::registry::ConnectionRegistry;

    type Inbound = fmpsc::UnboundedSender<Result<Message, std::io::Error>>;

    const FRAME: &str = r#"{"chat_id":"c1","sender_id":"u1","recipient_id":"u2","content":"hi"}"#;

    struct Harness {
        registry: Arc<ConnectionRegistry>,
        router: Arc<MessageRouter>,
        recipient_rx: mpsc::Receiver<Payload>,
    }

    fn harness() -> Harness {
        let registry = Arc::new(ConnectionRegistry::new());
        let (recipient, recipient_rx) = Session::new("u2", 16, CancellationToken::new());
        registry.register(recipient);
        let router = Arc::new(MessageRouter::new(Arc::clone(&registry)));
        Harness {
            registry,
            router,
            recipient_rx,
        }
    }

    fn spawn_reader(
        router: &Arc<MessageRouter>,
    ) -> (Arc<Session>, Inbound, tokio::task::JoinHandle<PumpExit>) {
        let (session, _rx) = Session::new("u1", 16, CancellationToken::new());
        let (tx, rx) = fmpsc::unbounded();
        let reader_session = Arc::clone(&session);
        let router = Arc::clone(router);
        let handle =
            tokio::spawn(async move { reader_pump(&reader_session, rx, &router).await });
        (session, tx, handle)
    }

    fn text(s: &str) -> Result<Message, std::io::Error> {
        Ok(Message::Text(s.to_string().into()))
    }

    async fn recv(rx: &mut mpsc::Receiver<Payload>) -> Payload {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn reader_routes_text_frames() {
        let mut h = harness();
        let (_session, tx, handle) = spawn_reader(&h.router);

        tx.unbounded_send(text(FRAME)).unwrap();
        assert_eq!(&*recv(&mut h.recipient_rx).await, FRAME);

        drop(tx);
        assert_eq!(handle.await.unwrap(), PumpExit::StreamEnded);
    }

    #[tokio::test]
    async fn reader_skips_malformed_frames() {
        let mut h = harness();
        let (_session, tx, handle) = spawn_reader(&h.router);

        tx.unbounded_send(text("not json")).unwrap();
        tx.unbounded_send(text(r#"{"chat_id":"c1"}"#)).unwrap();
        tx.unbounded_send(text(FRAME)).unwrap();

        assert_eq!(&*recv(&mut h.recipient_rx).await, FRAME);
        assert!(h.recipient_rx.try_recv().is_err());

        drop(tx);
        assert_eq!(handle.await.unwrap(), PumpExit::StreamEnded);
    }

    #[tokio::test]
    async fn reader_accepts_utf8_binary() {
        let mut h = harness();
        let (_session, tx, _handle) = spawn_reader(&h.router);

        tx.unbounded_send(Ok(Message::Binary(FRAME.as_bytes().to_vec().into())))
            .unwrap();
        tx.unbounded_send(Ok(Message::Binary(vec![0xff, 0xfe].into())))
            .unwrap();
        assert_eq!(&*recv(&mut h.recipient_rx).await, FRAME);
    }

    #[tokio::test]
    async fn reader_preserves_order() {
        let mut h = harness();
        let (_session, tx, _handle) = spawn_reader(&h.router);

        let frames: Vec<String> = (0..10)
            .map(|i| {
                format!(r#"{{"chat_id":"c1","sender_id":"u1","recipient_id":"u2","content":"{i}"}}"#)
            })
            .collect();
        for f in &frames {
            tx.unbounded_send(text(f)).unwrap();
        }
        for f in &frames {
            assert_eq!(&*recv(&mut h.recipient_rx).await, f.as_str());
        }
    }

    #[tokio::test]
    async fn reader_stops_on_close_frame() {
        let h = harness();
        let (_session, tx, handle) = spawn_reader(&h.router);
        tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        assert_eq!(handle.await.unwrap(), PumpExit::PeerClosed);
    }

    #[tokio::test]
    async fn reader_stops_on_transport_error() {
        let h = harness();
        let (_session, tx, handle) = spawn_reader(&h.router);
        tx.unbounded_send(Err(std::io::Error::other("reset"))).unwrap();
        assert_eq!(handle.await.unwrap(), PumpExit::TransportError);
    }

    #[tokio::test]
    async fn reader_stops_when_session_closes() {
        let h = harness();
        let (session, _tx, handle) = spawn_reader(&h.router);
        session.close();
        let exit = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, PumpExit::Cancelled);
        assert_eq!(h.registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reader_marks_liveness_on_pong() {
        let h = harness();
        let (session, tx, _handle) = spawn_reader(&h.router);

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(session.last_seen_elapsed() >= Duration::from_secs(40));

        tx.unbounded_send(Ok(Message::Pong(Vec::new().into()))).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(session.last_seen_elapsed() < Duration::from_secs(1));
    }

    fn spawn_writer(
        heartbeat: Heartbeat,
    ) -> (
        Arc<Session>,
        fmpsc::UnboundedReceiver<Message>,
        tokio::task::JoinHandle<PumpExit>,
    ) {
        let (session, outbound) = Session::new("u1", 16, CancellationToken::new());
        let (sink, frames) = fmpsc::unbounded();
        let writer_session = Arc::clone(&session);
        let handle = tokio::spawn(async move {
            writer_pump(&writer_session, sink, outbound, heartbeat).await
        });
        (session, frames, handle)
    }

    #[tokio::test]
    async fn writer_sends_queued_payloads_then_close() {
        let (session, mut frames, handle) = spawn_writer(Heartbeat::default());

        for p in ["a", "b", "c"] {
            session.enqueue(Arc::from(p)).unwrap();
        }
        for expected in ["a", "b", "c"] {
            let frame = tokio::time::timeout(Duration::from_secs(1), frames.next())
                .await
                .unwrap()
                .unwrap();
            match frame {
                Message::Text(t) => assert_eq!(t.as_str(), expected),
                other => panic!("unexpected frame {other:?}"),
            }
        }

        session.close();
        assert_eq!(handle.await.unwrap(), PumpExit::Cancelled);
        let rest: Vec<Message> = frames.collect().await;
        assert!(matches!(rest.as_slice(), [Message::Close(None)]));
    }

    #[tokio::test(start_paused = true)]
    async fn writer_times_out_silent_peer() {
        let heartbeat = Heartbeat {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        };
        let (_session, frames, handle) = spawn_writer(heartbeat);

        let exit = tokio::time::timeout(Duration::from_secs(600), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, PumpExit::HeartbeatTimeout);

        let sent: Vec<Message> = frames.collect().await;
        let pings = sent
            .iter()
            .filter(|m| matches!(m, Message::Ping(_)))
            .count();
        assert!(pings >= 2, "expected pings before timeout, got {pings}");
        assert!(matches!(sent.last(), Some(Message::Close(None))));
    }

    #[tokio::test(start_paused = true)]
    async fn writer_keeps_live_peer() {
        let heartbeat = Heartbeat {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        };
        let (session, _frames, handle) = spawn_writer(heartbeat);

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            session.mark_alive();
        }
        assert!(!handle.is_finished());
        session.close();
        assert_eq!(handle.await.unwrap(), PumpExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn writer_survives_zero_interval() {
        let heartbeat = Heartbeat {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(90),
        };
        let (session, frames, handle) = spawn_writer(heartbeat);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(!handle.is_finished());
        session.close();
        assert_eq!(handle.await.unwrap(), PumpExit::Cancelled);

        let sent: Vec<Message> = frames.collect().await;
        let pings = sent
            .iter()
            .filter(|m| matches!(m, Message::Ping(_)))
            .count();
        assert!((1..=4).contains(&pings), "pings not throttled: {pings}");
    }

    #[tokio::test]
    async fn writer_stops_when_socket_is_gone() {
        let (session, frames, handle) = spawn_writer(Heartbeat::default());
        drop(frames);
        session.enqueue(Arc::from("a")).unwrap();
        assert_eq!(handle.await.unwrap(), PumpExit::TransportError);
    }
}
