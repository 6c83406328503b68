//! The bus port: publish, request-publish, subscribe.
//!
//! Transports behind this trait must keep three semantics, because the rest
//! of the routing layer leans on them:
//!
//! - publishing to a subject with zero subscribers **succeeds** and the
//!   message is dropped (at-most-once live push);
//! - errors are reported only for transport-level faults (closed bus,
//!   unroutable subject), never for absent responders;
//! - dropping a [`Subscription`] releases it deterministically, with no
//!   async step in between.

use crate::subject::Subject;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport-level bus failures.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus has been closed; nothing can be published or subscribed.
    #[error("bus is closed")]
    Closed,
    /// The transport could not route to the subject.
    #[error("subject '{subject}' is not routable: {reason}")]
    Unroutable {
        /// Subject that could not be reached.
        subject: String,
        /// Transport-level cause.
        reason: String,
    },
}

/// One message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Subject the message was published on.
    pub subject: Subject,
    /// Raw payload bytes.
    pub payload: Bytes,
    /// Reply subject, present for the request half of an RPC exchange.
    pub reply: Option<Subject>,
}

/// Subject-addressed pub/sub transport.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fire-and-forget publish. Zero subscribers is success.
    async fn publish(&self, subject: &Subject, payload: Bytes) -> Result<(), BusError>;

    /// Publish with a reply subject attached (the request half of an RPC).
    async fn publish_request(
        &self,
        subject: &Subject,
        reply: &Subject,
        payload: Bytes,
    ) -> Result<(), BusError>;

    /// Open a push subscription on a subject.
    async fn subscribe(&self, subject: &Subject) -> Result<Subscription, BusError>;
}

/// A live subscription. Messages arrive via [`Subscription::recv`]; dropping
/// the handle unsubscribes immediately.
pub struct Subscription {
    subject: Subject,
    rx: mpsc::Receiver<BusMessage>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Assemble a subscription from its channel and release action.
    ///
    /// `release` runs exactly once, on drop; transports use it to remove the
    /// subscriber from their routing tables synchronously.
    #[must_use]
    pub fn new(
        subject: Subject,
        rx: mpsc::Receiver<BusMessage>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            subject,
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Await the next pushed message. `None` means the transport is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }

    /// The subject this subscription listens on.
    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
