//! Persist-first fanout of ingested messages to per-member inboxes.

use crate::store::{ChatStore, StoreError};
use chrono::Utc;
use courier_bus::{MessageBus, SubjectSpace};
use courier_core::chat::MessageRecord;
use courier_core::codec::JsonCodec;
use courier_core::envelope::{BroadcastEnvelope, IncomingMessage};
use courier_core::ids::MessageId;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Routes one ingested client message to every member's personal inbox.
///
/// Ordering is fixed: membership gate, persist, then fanout. A message that
/// failed to persist is never delivered; a message that persisted is
/// delivered best effort, one independent envelope per member, and a
/// failing recipient never affects the others. There are no per-recipient
/// retries, so delivery is at most once.
pub struct FanoutRouter {
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn ChatStore>,
    codec: JsonCodec,
    subjects: SubjectSpace,
}

impl FanoutRouter {
    /// Router over the given transport and store.
    #[must_use]
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn ChatStore>,
        codec: JsonCodec,
        subjects: SubjectSpace,
    ) -> Self {
        Self {
            bus,
            store,
            codec,
            subjects,
        }
    }

    /// Persist and fan out one ingested message.
    ///
    /// Undeliverable input (unknown chat, sender not a member, storage
    /// refusal) is logged and dropped; ingestion is fire-and-forget and has
    /// nobody to answer.
    pub async fn route(&self, incoming: IncomingMessage) {
        let chat = match self.store.chat(&incoming.chat_id).await {
            Ok(chat) => chat,
            Err(StoreError::ChatNotFound) => {
                warn!(
                    chat = %incoming.chat_id,
                    sender = %incoming.sender_id,
                    "message for unknown chat dropped"
                );
                counter!("chat_messages_dropped_total", "reason" => "unknown_chat").increment(1);
                return;
            }
            Err(e) => {
                error!(chat = %incoming.chat_id, error = %e, "chat lookup failed, message dropped");
                counter!("chat_messages_dropped_total", "reason" => "store").increment(1);
                return;
            }
        };
        if !chat.member_ids.contains(&incoming.sender_id) {
            warn!(
                chat = %incoming.chat_id,
                sender = %incoming.sender_id,
                "sender is not a member, message dropped"
            );
            counter!("chat_messages_dropped_total", "reason" => "not_a_member").increment(1);
            return;
        }

        let record = MessageRecord {
            message_id: MessageId::new(),
            chat_id: incoming.chat_id,
            sender_id: incoming.sender_id,
            kind: incoming.kind,
            content: incoming.content,
            sent_at: Utc::now(),
        };
        // Persist before any delivery; an unpersisted message must never
        // reach an inbox.
        if let Err(e) = self.store.append_message(&record).await {
            error!(
                chat = %record.chat_id,
                message = %record.message_id,
                error = %e,
                "persist failed, nothing fanned out"
            );
            counter!("chat_messages_dropped_total", "reason" => "persist").increment(1);
            return;
        }
        counter!("chat_messages_ingested_total").increment(1);

        let envelope = BroadcastEnvelope::from_record(&record);
        let payload = match self.codec.encode(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(message = %record.message_id, error = %e, "broadcast envelope failed to serialize");
                return;
            }
        };

        let mut delivered = 0usize;
        for member in &chat.member_ids {
            let inbox = self.subjects.personal_inbox(member);
            match self.bus.publish(&inbox, payload.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        recipient = %member,
                        message = %record.message_id,
                        error = %e,
                        "inbox delivery failed"
                    );
                    counter!("chat_fanout_failures_total").increment(1);
                }
            }
        }
        debug!(
            chat = %record.chat_id,
            message = %record.message_id,
            members = chat.member_ids.len(),
            delivered,
            "message fanned out"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
