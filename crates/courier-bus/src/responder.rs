//! Fixed-shape subject responder loops.
//!
//! One worker task per served subject, processing messages sequentially —
//! never a task per frame. Request handlers reply with either the success
//! body or the uniform `{error}` envelope; event handlers have no reply
//! path. Both loops end on cancellation or transport close, dropping their
//! subscription on the way out.

use crate::bus::{BusError, MessageBus};
use crate::subject::Subject;
use courier_core::codec::JsonCodec;
use courier_core::failure::ErrorEnvelope;
use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Handlers slower than this are logged.
const SLOW_HANDLER_WARN: Duration = Duration::from_secs(1);

/// Serve request/reply traffic on `subject` until cancelled.
///
/// Each request is decoded as `Req` and passed to `handler`; `Ok` replies
/// are the encoded success body, `Err` replies the `{error}` envelope with
/// the rejection's display text. Undecodable requests are answered with an
/// envelope as well — the caller sent *something* and is owed a reply.
pub async fn serve_requests<Req, Resp, E, H, Fut>(
    bus: Arc<dyn MessageBus>,
    codec: JsonCodec,
    subject: Subject,
    cancel: CancellationToken,
    handler: H,
) -> Result<(), BusError>
where
    Req: DeserializeOwned + Send,
    Resp: Serialize + Send,
    E: fmt::Display,
    H: Fn(Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, E>> + Send,
{
    let mut subscription = bus.subscribe(&subject).await?;
    debug!(subject = %subject, "serving requests");

    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            received = subscription.recv() => match received {
                Some(message) => message,
                None => break,
            },
        };

        let Some(reply) = message.reply else {
            warn!(subject = %subject, "request without reply inbox dropped");
            continue;
        };

        let body = match codec.decode::<Req>(&message.payload) {
            Ok(request) => {
                let started = Instant::now();
                let outcome = handler(request).await;
                let elapsed = started.elapsed();
                histogram!("bus_request_handle_seconds", "subject" => subject.as_str().to_owned())
                    .record(elapsed.as_secs_f64());
                if elapsed >= SLOW_HANDLER_WARN {
                    warn!(subject = %subject, ?elapsed, "slow request handler");
                }
                match outcome {
                    Ok(response) => codec.encode(&response),
                    Err(rejection) => codec.encode(&ErrorEnvelope::new(rejection.to_string())),
                }
            }
            Err(e) => {
                warn!(subject = %subject, error = %e, "undecodable request");
                codec.encode(&ErrorEnvelope::new(format!("invalid request: {e}")))
            }
        };
        counter!("bus_requests_served_total", "subject" => subject.as_str().to_owned())
            .increment(1);

        match body {
            Ok(payload) => {
                if let Err(e) = bus.publish(&reply, payload).await {
                    warn!(subject = %subject, error = %e, "failed to publish reply");
                }
            }
            Err(e) => {
                error!(subject = %subject, error = %e, "reply body failed to serialize");
            }
        }
    }

    debug!(subject = %subject, "responder stopped");
    Ok(())
}

/// Consume fire-and-forget events on `subject` until cancelled.
///
/// Undecodable events are logged and dropped; there is nobody to answer.
pub async fn serve_events<Ev, H, Fut>(
    bus: Arc<dyn MessageBus>,
    codec: JsonCodec,
    subject: Subject,
    cancel: CancellationToken,
    handler: H,
) -> Result<(), BusError>
where
    Ev: DeserializeOwned + Send,
    H: Fn(Ev) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    let mut subscription = bus.subscribe(&subject).await?;
    debug!(subject = %subject, "consuming events");

    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            received = subscription.recv() => match received {
                Some(message) => message,
                None => break,
            },
        };

        match codec.decode::<Ev>(&message.payload) {
            Ok(event) => handler(event).await,
            Err(e) => warn!(subject = %subject, error = %e, "undecodable event dropped"),
        }
    }

    debug!(subject = %subject, "event consumer stopped");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBus;
    use crate::rpc::RpcClient;
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use courier_core::failure::ServiceFailure;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize)]
    struct Question {
        ask: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Answer {
        say: String,
    }

    fn serve_echo(bus: &InMemoryBus, cancel: &CancellationToken) {
        let bus_arc: Arc<dyn MessageBus> = Arc::new(bus.clone());
        let cancel = cancel.clone();
        let _ = tokio::spawn(serve_requests(
            bus_arc,
            JsonCodec::new(),
            Subject::from("q"),
            cancel,
            |request: Question| async move {
                if request.ask == "fail" {
                    Err(ServiceFailure::domain("cannot answer that"))
                } else {
                    Ok(Answer { say: request.ask })
                }
            },
        ));
    }

    #[tokio::test]
    async fn replies_with_the_success_body() {
        let bus = InMemoryBus::new();
        let cancel = CancellationToken::new();
        serve_echo(&bus, &cancel);
        tokio::task::yield_now().await;

        let rpc = RpcClient::new(Arc::new(bus.clone()), JsonCodec::new());
        let answer: Answer = rpc.call("q", &Question { ask: "hi".into() }).await.unwrap();
        assert_eq!(answer.say, "hi");
    }

    #[tokio::test]
    async fn handler_rejection_becomes_the_error_envelope() {
        let bus = InMemoryBus::new();
        let cancel = CancellationToken::new();
        serve_echo(&bus, &cancel);
        tokio::task::yield_now().await;

        let rpc = RpcClient::new(Arc::new(bus.clone()), JsonCodec::new());
        let result: Result<Answer, _> = rpc.call("q", &Question { ask: "fail".into() }).await;
        assert_matches!(
            result,
            Err(ServiceFailure::Domain { message }) if message == "cannot answer that"
        );
    }

    #[tokio::test]
    async fn undecodable_request_is_answered_with_an_envelope() {
        let bus = InMemoryBus::new();
        let cancel = CancellationToken::new();
        serve_echo(&bus, &cancel);
        tokio::task::yield_now().await;

        let mut inbox = bus.subscribe(&Subject::from("_INBOX.test")).await.unwrap();
        bus.publish_request(
            &Subject::from("q"),
            &Subject::from("_INBOX.test"),
            Bytes::from_static(b"not json"),
        )
        .await
        .unwrap();

        let reply = inbox.recv().await.unwrap();
        let envelope: ErrorEnvelope = serde_json::from_slice(&reply.payload).unwrap();
        assert!(envelope.error.starts_with("invalid request"));
    }

    #[tokio::test]
    async fn request_without_reply_inbox_is_dropped() {
        let bus = InMemoryBus::new();
        let cancel = CancellationToken::new();
        serve_echo(&bus, &cancel);
        tokio::task::yield_now().await;

        // Fire-and-forget onto an RPC subject: no reply inbox to answer.
        bus.publish(&Subject::from("q"), Bytes::from_static(b"{\"ask\":\"x\"}"))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        // Nothing to assert beyond "the loop did not die": it still answers.
        let rpc = RpcClient::new(Arc::new(bus.clone()), JsonCodec::new());
        let answer: Answer = rpc.call("q", &Question { ask: "ok".into() }).await.unwrap();
        assert_eq!(answer.say, "ok");
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_and_releases_the_subscription() {
        let bus = InMemoryBus::new();
        let cancel = CancellationToken::new();

        let bus_arc: Arc<dyn MessageBus> = Arc::new(bus.clone());
        let worker = tokio::spawn(serve_requests(
            bus_arc,
            JsonCodec::new(),
            Subject::from("q"),
            cancel.clone(),
            |request: Question| async move { Ok::<_, ServiceFailure>(Answer { say: request.ask }) },
        ));

        tokio::task::yield_now().await;
        assert_eq!(bus.subscriber_count(&Subject::from("q")), 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(bus.subscriber_count(&Subject::from("q")), 0);
    }

    #[tokio::test]
    async fn event_loop_invokes_handler_and_skips_garbage() {
        let bus = InMemoryBus::new();
        let cancel = CancellationToken::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let bus_arc: Arc<dyn MessageBus> = Arc::new(bus.clone());
        let counter = Arc::clone(&seen);
        let _ = tokio::spawn(serve_events(
            bus_arc,
            JsonCodec::new(),
            Subject::from("ev"),
            cancel.clone(),
            move |_event: Question| {
                let counter = Arc::clone(&counter);
                async move {
                    let _ = counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));
        tokio::task::yield_now().await;

        bus.publish(&Subject::from("ev"), Bytes::from_static(b"garbage"))
            .await
            .unwrap();
        bus.publish(&Subject::from("ev"), Bytes::from_static(b"{\"ask\":\"x\"}"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
