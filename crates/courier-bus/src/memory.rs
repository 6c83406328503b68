//! In-process bus transport.
//!
//! Routes by exact subject match through per-subscriber bounded channels.
//! Used by every test in the workspace and by single-process deployments;
//! the semantics deliberately mirror a core NATS connection: no persistence,
//! no replay, at-most-once delivery, and a slow subscriber loses messages
//! rather than stalling publishers.

use crate::bus::{BusError, BusMessage, MessageBus, Subscription};
use crate::subject::Subject;
use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default per-subscriber channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;

type SubscriberTable = HashMap<String, HashMap<u64, mpsc::Sender<BusMessage>>>;

struct BusInner {
    subscribers: RwLock<SubscriberTable>,
    next_subscriber_id: AtomicU64,
    closed: AtomicBool,
    capacity: usize,
    dropped: AtomicU64,
}

/// In-memory [`MessageBus`] implementation.
///
/// Cheap to clone; clones share the same routing table.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<BusInner>,
}

impl InMemoryBus {
    /// A bus with the default per-subscriber capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// A bus with an explicit per-subscriber channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_subscriber_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                capacity: capacity.max(1),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Number of live subscriptions on one subject.
    #[must_use]
    pub fn subscriber_count(&self, subject: &Subject) -> usize {
        self.inner
            .subscribers
            .read()
            .get(subject.as_str())
            .map_or(0, HashMap::len)
    }

    /// Number of live subscriptions across all subjects.
    #[must_use]
    pub fn subscription_total(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .values()
            .map(HashMap::len)
            .sum()
    }

    /// Messages dropped because a subscriber's channel was full or gone.
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Close the bus: all pending subscriptions end, further publishes and
    /// subscribes fail with [`BusError::Closed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        // Dropping the senders terminates every subscriber stream.
        self.inner.subscribers.write().clear();
        debug!("in-memory bus closed");
    }

    fn deliver(
        &self,
        subject: &Subject,
        payload: Bytes,
        reply: Option<Subject>,
    ) -> Result<(), BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let message = BusMessage {
            subject: subject.clone(),
            payload,
            reply,
        };

        let senders: Vec<mpsc::Sender<BusMessage>> = self
            .inner
            .subscribers
            .read()
            .get(subject.as_str())
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default();

        counter!("bus_messages_published_total").increment(1);

        // Zero subscribers is a successful publish with nothing to do.
        for sender in senders {
            if sender.try_send(message.clone()).is_err() {
                let _ = self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                counter!("bus_messages_dropped_total").increment(1);
                warn!(subject = %subject, "subscriber channel full or gone, message dropped");
            }
        }
        Ok(())
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, subject: &Subject, payload: Bytes) -> Result<(), BusError> {
        self.deliver(subject, payload, None)
    }

    async fn publish_request(
        &self,
        subject: &Subject,
        reply: &Subject,
        payload: Bytes,
    ) -> Result<(), BusError> {
        self.deliver(subject, payload, Some(reply.clone()))
    }

    async fn subscribe(&self, subject: &Subject) -> Result<Subscription, BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        {
            let mut table = self.inner.subscribers.write();
            let _ = table.entry(subject.as_str().to_owned()).or_default().insert(id, tx);
        }

        let inner = Arc::clone(&self.inner);
        let key = subject.as_str().to_owned();
        let release = move || {
            let mut table = inner.subscribers.write();
            if let Some(subs) = table.get_mut(&key) {
                let _ = subs.remove(&id);
                if subs.is_empty() {
                    let _ = table.remove(&key);
                }
            }
        };

        Ok(Subscription::new(subject.clone(), rx, release))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
