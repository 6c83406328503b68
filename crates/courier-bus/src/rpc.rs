//! The RPC-over-pub/sub correlation bridge.
//!
//! One outbound synchronous call becomes: subscribe to a unique reply inbox,
//! publish the request with that inbox attached, await exactly one of
//! {reply, deadline, transport failure}. The reply-inbox subscription is a
//! stack local of the call future, so it is released on every path out —
//! success, timeout, transport failure, or the caller dropping the future.
//!
//! There are no retries here. Most downstream operations (account creation,
//! message persistence) are not safely retryable; retry policy, if any,
//! belongs to the caller.

use crate::bus::MessageBus;
use crate::subject::{Subject, SubjectSpace};
use courier_core::codec::JsonCodec;
use courier_core::failure::{ErrorEnvelope, ServiceFailure, sample_of};
use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Default deadline for bridged calls.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Stateless client side of the bridge. Safe under unbounded concurrent
/// invocation: every call owns a uniquely named reply inbox, so concurrent
/// calls never race on correlation.
#[derive(Clone)]
pub struct RpcClient {
    bus: Arc<dyn MessageBus>,
    codec: JsonCodec,
    timeout: Duration,
}

impl RpcClient {
    /// A client with the default 5 s deadline.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, codec: JsonCodec) -> Self {
        Self::with_timeout(bus, codec, DEFAULT_RPC_TIMEOUT)
    }

    /// A client with an explicit default deadline.
    #[must_use]
    pub fn with_timeout(bus: Arc<dyn MessageBus>, codec: JsonCodec, timeout: Duration) -> Self {
        Self {
            bus,
            codec,
            timeout,
        }
    }

    /// The deadline applied by [`RpcClient::call`].
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Call `subject` with the client's default deadline.
    ///
    /// `Resp` must have at least one required field; the decode ladder
    /// relies on the success schema and the `{error}` envelope being
    /// disjoint.
    pub async fn call<Req, Resp>(
        &self,
        subject: &str,
        request: &Req,
    ) -> Result<Resp, ServiceFailure>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        self.call_with_timeout(subject, request, self.timeout).await
    }

    /// Call `subject` with an explicit deadline.
    pub async fn call_with_timeout<Req, Resp>(
        &self,
        subject: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp, ServiceFailure>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        counter!("rpc_bridge_requests_total", "subject" => subject.to_owned()).increment(1);
        let start = Instant::now();

        let result = self.exchange(subject, request, timeout).await;

        histogram!("rpc_bridge_request_duration_seconds", "subject" => subject.to_owned())
            .record(start.elapsed().as_secs_f64());
        if let Err(failure) = &result {
            counter!(
                "rpc_bridge_failures_total",
                "subject" => subject.to_owned(),
                "outcome" => outcome_label(failure)
            )
            .increment(1);
        }
        result
    }

    async fn exchange<Req, Resp>(
        &self,
        subject: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp, ServiceFailure>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = self.codec.encode(request).map_err(|e| {
            // Local serialization bugs take the fatal-fault channel.
            error!(subject, error = %e, "request body failed to serialize");
            ServiceFailure::Protocol {
                subject: subject.to_owned(),
                sample: format!("request encode: {e}"),
            }
        })?;

        let reply_inbox = SubjectSpace::reply_inbox();
        // Subscribe before publishing so an instant responder cannot beat us
        // to the inbox.
        let mut subscription =
            self.bus
                .subscribe(&reply_inbox)
                .await
                .map_err(|e| ServiceFailure::Unreachable {
                    subject: subject.to_owned(),
                    reason: e.to_string(),
                })?;

        self.bus
            .publish_request(&Subject::new(subject), &reply_inbox, payload)
            .await
            .map_err(|e| ServiceFailure::Unreachable {
                subject: subject.to_owned(),
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(timeout, subscription.recv()).await {
            Err(_elapsed) => {
                debug!(subject, ?timeout, "bridged call timed out");
                Err(ServiceFailure::Timeout {
                    subject: subject.to_owned(),
                    timeout,
                })
            }
            Ok(None) => Err(ServiceFailure::Unreachable {
                subject: subject.to_owned(),
                reason: "reply stream closed".to_owned(),
            }),
            Ok(Some(message)) => self.decode_reply(subject, &message.payload),
        }
        // `subscription` drops here: the reply inbox is released on every
        // path, including the caller cancelling this future mid-await.
    }

    fn decode_reply<Resp: DeserializeOwned>(
        &self,
        subject: &str,
        payload: &[u8],
    ) -> Result<Resp, ServiceFailure> {
        if let Ok(response) = self.codec.decode::<Resp>(payload) {
            return Ok(response);
        }
        match self.codec.decode::<ErrorEnvelope>(payload) {
            Ok(envelope) => Err(ServiceFailure::Domain {
                message: envelope.error,
            }),
            Err(_) => {
                // Fatal-fault channel: log the sample here, never echo it.
                error!(
                    subject,
                    sample = %sample_of(payload),
                    "reply matched neither the success schema nor the error envelope"
                );
                Err(ServiceFailure::protocol(subject, payload))
            }
        }
    }
}

fn outcome_label(failure: &ServiceFailure) -> &'static str {
    match failure {
        ServiceFailure::Unreachable { .. } => "unreachable",
        ServiceFailure::Timeout { .. } => "timeout",
        ServiceFailure::Domain { .. } => "domain",
        ServiceFailure::Protocol { .. } => "protocol",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
