//! Chat records, enriched views, and the RPC bodies for the `chat.*` subjects.
//!
//! Two parallel shapes exist on purpose: *records* carry opaque user ids and
//! are what storage hands back; *views* carry denormalized [`UserProfile`]s
//! and are what crosses the client boundary. The profile enrichment
//! aggregator is the only code that turns one into the other.

use crate::ids::{ChatId, MessageId, UserId};
use crate::profile::UserProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted chat message, referencing its sender by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Message id (UUID v7, time-ordered).
    pub message_id: MessageId,
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Authenticated sender.
    pub sender_id: UserId,
    /// Client-defined message kind (`"TEXT"`, `"IMAGE"`, ...); opaque here.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body; opaque to the routing layer.
    pub content: String,
    /// Server-side receive time.
    pub sent_at: DateTime<Utc>,
}

/// A chat message with its sender resolved to a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Message id.
    pub message_id: MessageId,
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Resolved sender profile (placeholder if unresolved).
    pub sender: UserProfile,
    /// Client-defined message kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body.
    pub content: String,
    /// Server-side receive time.
    pub sent_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Attach a resolved sender profile, producing the client-facing view.
    #[must_use]
    pub fn into_view(self, sender: UserProfile) -> MessageView {
        MessageView {
            message_id: self.message_id,
            chat_id: self.chat_id,
            sender,
            kind: self.kind,
            content: self.content,
            sent_at: self.sent_at,
        }
    }
}

/// A chat as storage sees it: membership and last message by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    /// Chat id.
    pub id: ChatId,
    /// Display name; `None` for direct chats.
    pub name: Option<String>,
    /// True for group chats, false for direct ones.
    pub is_group: bool,
    /// Current member snapshot.
    pub member_ids: Vec<UserId>,
    /// Most recent message, if any.
    pub last_message: Option<MessageRecord>,
}

/// A chat with members and last-message sender resolved to profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    /// Chat id.
    pub id: ChatId,
    /// Display name; `None` for direct chats.
    pub name: Option<String>,
    /// True for group chats, false for direct ones.
    pub is_group: bool,
    /// Resolved member profiles, in membership order.
    pub members: Vec<UserProfile>,
    /// Most recent message with its sender resolved, if any.
    pub last_message: Option<MessageView>,
}

/// Request body for `chat.create.group`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    /// Authenticated creator; always a member of the result.
    pub creator_id: UserId,
    /// Group display name.
    pub name: String,
    /// Initial members besides the creator; duplicates tolerated.
    pub member_ids: Vec<UserId>,
}

/// Request body for `chat.create.dm`.
///
/// Argument order is irrelevant: both orders resolve to the same chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDmRequest {
    /// Authenticated requester.
    pub user_id_1: UserId,
    /// The other participant.
    pub user_id_2: UserId,
}

/// Request body for `chat.get.mychats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyChatsRequest {
    /// Authenticated requester.
    pub user_id: UserId,
}

/// Reply body for `chat.get.mychats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyChatsReply {
    /// Every chat the requester belongs to, enriched.
    pub chats: Vec<ChatView>,
}

/// Request body for `chat.get.details`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDetailsRequest {
    /// Chat to describe.
    pub chat_id: ChatId,
    /// Authenticated requester; must be a member.
    pub user_id: UserId,
}

/// Request body for `chat.update.details` (rename; group chats only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChatRequest {
    /// Chat to rename.
    pub chat_id: ChatId,
    /// Authenticated requester; must be a member.
    pub user_id: UserId,
    /// New display name.
    pub name: String,
}

/// Request body for `chat.add.user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    /// Authenticated requester; must be a member.
    pub added_by_user_id: UserId,
    /// Chat to extend.
    pub chat_id: ChatId,
    /// User to add.
    pub user_id_to_add: UserId,
}

/// Request body for `chat.remove.user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMemberRequest {
    /// Authenticated requester; must be a member.
    pub removed_by_user_id: UserId,
    /// Chat to shrink.
    pub chat_id: ChatId,
    /// User to remove.
    pub user_id_to_remove: UserId,
}

/// Request body for `chat.messages.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRequest {
    /// Chat whose history to read.
    pub chat_id: ChatId,
    /// Authenticated requester; must be a member.
    pub user_id: UserId,
    /// Page size cap; server default applies when absent.
    pub limit: Option<u32>,
}

/// Reply body for `chat.messages.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesReply {
    /// Most recent messages, oldest first, senders resolved.
    pub messages: Vec<MessageView>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
