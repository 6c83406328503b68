//! One WebSocket session: a fixed inbound/outbound task pair bridging the
//! socket to the user's personal inbox subject.
//!
//! The route handler upgrades an authenticated connection and hands the
//! socket to [`run`]. `run` subscribes the personal inbox first, then splits
//! the socket. The outbound task owns the subscription and the socket sink;
//! the inbound task owns the socket stream and stamps the authenticated user
//! id on every frame it republishes. Either side ending tears down the
//! other, and dropping the subscription releases the inbox on every exit
//! path, including aborts.

use crate::metrics::{
    WS_DECODE_FAILURES_TOTAL, WS_FRAMES_RECEIVED_TOTAL, WS_FRAMES_SENT_TOTAL, WS_SESSIONS_ACTIVE,
    WS_SESSIONS_TOTAL, WS_SESSION_DURATION_SECONDS, WS_WRITE_FAILURES_TOTAL,
};
use crate::server::AppState;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use courier_bus::{Subject, Subscription, subjects};
use courier_core::envelope::{BroadcastEnvelope, IncomingMessage};
use courier_core::failure::ErrorEnvelope;
use courier_core::frame::{ClientFrame, ServerFrame};
use courier_core::ids::UserId;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Drive one authenticated session until either side ends it.
pub async fn run(socket: WebSocket, user_id: UserId, state: AppState) {
    let inbox = state.space.personal_inbox(&user_id);
    let subscription = match state.bus.subscribe(&inbox).await {
        Ok(subscription) => subscription,
        Err(error) => {
            error!(user = %user_id, %error, "inbox subscription failed, dropping session");
            return;
        }
    };

    let _tracked = state.sessions.track();
    counter!(WS_SESSIONS_TOTAL).increment(1);
    gauge!(WS_SESSIONS_ACTIVE).increment(1.0);
    info!(user = %user_id, inbox = %inbox, "session streaming");
    let started = Instant::now();

    let (sink, stream) = socket.split();
    let (frames_tx, frames_rx) = mpsc::channel::<String>(state.config.frame_buffer);
    let last_pong = Arc::new(Mutex::new(Instant::now()));

    let mut outbound = tokio::spawn(outbound_flow(
        sink,
        subscription,
        frames_rx,
        state.clone(),
        user_id.clone(),
        Arc::clone(&last_pong),
    ));
    let mut inbound = tokio::spawn(inbound_flow(
        stream,
        frames_tx,
        state,
        user_id.clone(),
        last_pong,
    ));

    // Whichever task finishes first decides the session is over. Aborting
    // the survivor drops its half of the socket and, for the outbound task,
    // the inbox subscription.
    tokio::select! {
        _ = &mut outbound => {
            inbound.abort();
            let _ = inbound.await;
        }
        _ = &mut inbound => {
            outbound.abort();
            let _ = outbound.await;
        }
    }

    gauge!(WS_SESSIONS_ACTIVE).decrement(1.0);
    histogram!(WS_SESSION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!(user = %user_id, "session closed");
}

/// Push inbox traffic, error frames and pings to the client.
///
/// Owns the inbox subscription; returning or being aborted releases it.
async fn outbound_flow(
    mut sink: SplitSink<WebSocket, Message>,
    mut subscription: Subscription,
    mut frames_rx: mpsc::Receiver<String>,
    state: AppState,
    user_id: UserId,
    last_pong: Arc<Mutex<Instant>>,
) {
    let mut ping = tokio::time::interval(state.config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            delivery = subscription.recv() => {
                let Some(message) = delivery else {
                    info!(user = %user_id, "inbox subscription ended");
                    break;
                };
                let Some(text) = render_frame(&state, &message.payload).await else {
                    continue;
                };
                if send_text(&mut sink, text).await.is_err() {
                    break;
                }
            }
            frame = frames_rx.recv() => {
                let Some(text) = frame else { break };
                if send_text(&mut sink, text).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if last_pong.lock().elapsed() > state.config.pong_timeout {
                    warn!(user = %user_id, "pong deadline missed, closing session");
                    break;
                }
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            () = state.shutdown.cancelled() => {
                info!(user = %user_id, "gateway draining, closing session");
                break;
            }
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

/// Receive client frames until the socket closes or the bus refuses a
/// publish.
async fn inbound_flow(
    mut stream: SplitStream<WebSocket>,
    frames_tx: mpsc::Sender<String>,
    state: AppState,
    user_id: UserId,
    last_pong: Arc<Mutex<Instant>>,
) {
    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(message) => message,
            Err(error) => {
                debug!(user = %user_id, %error, "socket read failed");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                counter!(WS_FRAMES_RECEIVED_TOTAL).increment(1);
                if !ingest(&state, &user_id, text.as_str(), &frames_tx).await {
                    break;
                }
            }
            Message::Pong(_) => {
                *last_pong.lock() = Instant::now();
            }
            Message::Close(_) => {
                debug!(user = %user_id, "client closed");
                break;
            }
            Message::Ping(_) | Message::Binary(_) => {}
        }
    }
}

/// Stamp the authenticated sender id on one client frame and publish it for
/// ingestion. Malformed frames get an error frame back and the session
/// stays open.
///
/// Returns false when the session must end: the outbound side is gone or
/// the bus refused the publish.
async fn ingest(
    state: &AppState,
    user_id: &UserId,
    text: &str,
    frames_tx: &mpsc::Sender<String>,
) -> bool {
    let frame: ClientFrame = match state.codec.decode_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            counter!(WS_DECODE_FAILURES_TOTAL).increment(1);
            debug!(user = %user_id, %error, "malformed client frame");
            let envelope = ErrorEnvelope::new(format!("Invalid message format: {error}"));
            let Ok(reply) = state.codec.encode_string(&envelope) else {
                return true;
            };
            return frames_tx.send(reply).await.is_ok();
        }
    };

    // Whatever the wire carried, the sender is the session's user.
    let incoming = IncomingMessage {
        sender_id: user_id.clone(),
        chat_id: frame.chat_id,
        kind: frame.kind,
        content: frame.content,
    };
    let payload = match state.codec.encode(&incoming) {
        Ok(payload) => payload,
        Err(error) => {
            error!(%error, "incoming message encode failed");
            return true;
        }
    };
    let subject = Subject::from(subjects::CHAT_MESSAGE_INCOMING);
    match state.bus.publish(&subject, payload).await {
        Ok(()) => true,
        Err(error) => {
            warn!(user = %user_id, %error, "ingestion publish failed, closing session");
            false
        }
    }
}

/// Decode one inbox envelope and render the client frame, resolving the
/// sender's profile. Undecodable payloads are logged and skipped.
async fn render_frame(state: &AppState, payload: &[u8]) -> Option<String> {
    let envelope: BroadcastEnvelope = match state.codec.decode(payload) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(%error, "undecodable inbox payload, skipping");
            return None;
        }
    };
    let sender = state.resolver.resolve_one(&envelope.sender_id).await;
    let frame = ServerFrame::from_envelope(envelope, sender);
    match state.codec.encode_string(&frame) {
        Ok(text) => Some(text),
        Err(error) => {
            error!(%error, "outbound frame encode failed, skipping");
            None
        }
    }
}

async fn send_text(
    sink: &mut SplitSink<WebSocket, Message>,
    text: String,
) -> Result<(), axum::Error> {
    match sink.send(Message::Text(Utf8Bytes::from(text))).await {
        Ok(()) => {
            counter!(WS_FRAMES_SENT_TOTAL).increment(1);
            Ok(())
        }
        Err(error) => {
            counter!(WS_WRITE_FAILURES_TOTAL).increment(1);
            warn!(%error, "socket write failed, closing session");
            Err(error)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtVerifier;
    use crate::config::GatewayConfig;
    use chrono::Utc;
    use courier_bus::MessageBus;
    use courier_bus::memory::InMemoryBus;
    use courier_bus::responder;
    use courier_core::codec::JsonCodec;
    use courier_core::ids::{ChatId, MessageId};
    use courier_core::profile::UserProfile;
    use courier_core::user::{ProfileBatchReply, ProfileBatchRequest};
    use tokio_util::sync::CancellationToken;

    fn test_state(bus: &Arc<InMemoryBus>) -> AppState {
        let dyn_bus: Arc<dyn MessageBus> = bus.clone();
        let verifier = Arc::new(JwtVerifier::new("s", "i", "a"));
        AppState::new(GatewayConfig::default(), dyn_bus, verifier)
    }

    #[tokio::test]
    async fn authenticated_sender_overrides_the_wire() {
        let bus = Arc::new(InMemoryBus::new());
        let state = test_state(&bus);
        let mut ingestion = bus
            .subscribe(&Subject::from(subjects::CHAT_MESSAGE_INCOMING))
            .await
            .unwrap();
        let (tx, _rx) = mpsc::channel(4);

        let spoofed = r#"{"chatId":"c1","type":"TEXT","content":"hi","senderId":"u-mallory"}"#;
        assert!(ingest(&state, &UserId::from("u-ada"), spoofed, &tx).await);

        let delivered = ingestion.recv().await.unwrap();
        let incoming: IncomingMessage = JsonCodec::new().decode(&delivered.payload).unwrap();
        assert_eq!(incoming.sender_id.as_str(), "u-ada");
        assert_eq!(incoming.content, "hi");
    }

    #[tokio::test]
    async fn malformed_frame_reports_and_keeps_the_session() {
        let bus = Arc::new(InMemoryBus::new());
        let state = test_state(&bus);
        let (tx, mut rx) = mpsc::channel(4);

        assert!(ingest(&state, &UserId::from("u-ada"), "not json", &tx).await);

        let reply = rx.recv().await.unwrap();
        let envelope: ErrorEnvelope = JsonCodec::new().decode_str(&reply).unwrap();
        assert!(
            envelope.error.starts_with("Invalid message format"),
            "got: {}",
            envelope.error
        );
    }

    #[tokio::test]
    async fn closed_bus_ends_the_session() {
        let bus = Arc::new(InMemoryBus::new());
        let state = test_state(&bus);
        let (tx, _rx) = mpsc::channel(4);
        bus.close();

        let frame = r#"{"chatId":"c1","type":"TEXT","content":"hi"}"#;
        assert!(!ingest(&state, &UserId::from("u-ada"), frame, &tx).await);
    }

    #[tokio::test]
    async fn rendered_frame_carries_the_resolved_sender() {
        let bus = Arc::new(InMemoryBus::new());
        let state = test_state(&bus);
        let cancel = CancellationToken::new();
        drop(tokio::spawn(responder::serve_requests(
            Arc::clone(&state.bus),
            JsonCodec::new(),
            Subject::from(subjects::USER_PROFILES_GET_BATCH),
            cancel.clone(),
            |request: ProfileBatchRequest| async move {
                let profiles = request
                    .user_ids
                    .iter()
                    .map(|id| UserProfile::new(id.clone(), format!("name-{id}")))
                    .collect();
                Ok::<_, String>(ProfileBatchReply { profiles })
            },
        )));
        tokio::task::yield_now().await;

        let envelope = BroadcastEnvelope {
            message_id: MessageId::from("m1"),
            chat_id: ChatId::from("c1"),
            sender_id: UserId::from("u-ada"),
            kind: "TEXT".to_owned(),
            content: "hello".to_owned(),
            sent_at: Utc::now(),
        };
        let payload = JsonCodec::new().encode(&envelope).unwrap();

        let text = render_frame(&state, &payload).await.unwrap();
        let frame: ServerFrame = JsonCodec::new().decode_str(&text).unwrap();
        assert_eq!(frame.sender.username, "name-u-ada");
        assert_eq!(frame.message_id.as_str(), "m1");
        cancel.cancel();
    }

    #[tokio::test]
    async fn garbage_inbox_payload_is_skipped() {
        let bus = Arc::new(InMemoryBus::new());
        let state = test_state(&bus);
        assert!(render_frame(&state, b"\xffgarbage").await.is_none());
    }
}
