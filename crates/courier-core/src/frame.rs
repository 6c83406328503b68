//! WebSocket wire frames for the session protocol.

use crate::envelope::BroadcastEnvelope;
use crate::ids::{ChatId, MessageId};
use crate::profile::UserProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inbound client frame: "send this message to that chat".
///
/// Deliberately has no sender field; the session stamps its authenticated
/// user id, so a client-supplied id (an unknown field here) is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    /// Destination chat.
    pub chat_id: ChatId,
    /// Client-defined message kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body.
    pub content: String,
}

/// An outbound frame: one chat message pushed to a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFrame {
    /// Persisted message id.
    pub message_id: MessageId,
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Resolved author profile (placeholder if unresolved).
    pub sender: UserProfile,
    /// Client-defined message kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body.
    pub content: String,
    /// Server-side receive time.
    pub sent_at: DateTime<Utc>,
}

impl ServerFrame {
    /// Map a broadcast envelope to the public wire schema, attaching the
    /// resolved sender profile.
    #[must_use]
    pub fn from_envelope(envelope: BroadcastEnvelope, sender: UserProfile) -> Self {
        Self {
            message_id: envelope.message_id,
            chat_id: envelope.chat_id,
            sender,
            kind: envelope.kind,
            content: envelope.content,
            sent_at: envelope.sent_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
