//! Bus-side event schemas: ingestion events and broadcast envelopes.

use crate::chat::MessageRecord;
use crate::ids::{ChatId, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A client message as republished onto the fixed ingestion subject.
///
/// The sender id is always the session's authenticated user id, stamped by
/// the session multiplexer; clients have no way to supply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Authenticated author of the message.
    pub sender_id: UserId,
    /// Destination chat.
    pub chat_id: ChatId,
    /// Client-defined message kind; opaque here.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body; opaque here.
    pub content: String,
}

/// The immutable per-recipient broadcast artifact.
///
/// Published once per chat member to that member's personal inbox subject;
/// every copy is independent and none shares mutable state with another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEnvelope {
    /// Persisted message id.
    pub message_id: MessageId,
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Author by id; resolved to a profile at the session edge.
    pub sender_id: UserId,
    /// Client-defined message kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body.
    pub content: String,
    /// Server-side receive time.
    pub sent_at: DateTime<Utc>,
}

impl BroadcastEnvelope {
    /// Build the envelope for a freshly persisted message.
    #[must_use]
    pub fn from_record(record: &MessageRecord) -> Self {
        Self {
            message_id: record.message_id.clone(),
            chat_id: record.chat_id.clone(),
            sender_id: record.sender_id.clone(),
            kind: record.kind.clone(),
            content: record.content.clone(),
            sent_at: record.sent_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
