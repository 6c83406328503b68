//! Chat persistence: the [`ChatStore`] port and its in-process implementation.

use async_trait::async_trait;
use courier_core::chat::{ChatRecord, MessageRecord};
use courier_core::ids::{ChatId, UserId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failures surfaced by chat storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The chat does not exist.
    #[error("chat not found")]
    ChatNotFound,
    /// The backing store rejected the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistence port for chats, memberships, and message history.
///
/// Membership and group-only rules are enforced by the service layer; the
/// store is mechanical and only fails on missing chats or infrastructure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a group chat. The creator is always a member; duplicate ids
    /// in `member_ids` collapse to one membership.
    async fn create_group(
        &self,
        creator: &UserId,
        name: &str,
        member_ids: &[UserId],
    ) -> Result<ChatRecord, StoreError>;

    /// Open the direct chat between two users, creating it on first use.
    /// Both argument orders name the same chat.
    async fn open_dm(&self, user_a: &UserId, user_b: &UserId) -> Result<ChatRecord, StoreError>;

    /// Fetch one chat.
    async fn chat(&self, chat_id: &ChatId) -> Result<ChatRecord, StoreError>;

    /// Every chat the user is currently a member of.
    async fn chats_for(&self, user_id: &UserId) -> Result<Vec<ChatRecord>, StoreError>;

    /// Set a chat's display name.
    async fn rename_chat(&self, chat_id: &ChatId, name: &str) -> Result<ChatRecord, StoreError>;

    /// Add a member; a no-op if already present.
    async fn add_member(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
    ) -> Result<ChatRecord, StoreError>;

    /// Remove a member; a no-op if absent.
    async fn remove_member(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
    ) -> Result<ChatRecord, StoreError>;

    /// Append a message to its chat's history.
    async fn append_message(&self, message: &MessageRecord) -> Result<(), StoreError>;

    /// The most recent `limit` messages, oldest first.
    async fn recent_messages(
        &self,
        chat_id: &ChatId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, StoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory implementation
// ─────────────────────────────────────────────────────────────────────────────

/// In-process [`ChatStore`] for tests and single-node deployments.
#[derive(Debug, Default, Clone)]
pub struct InMemoryChatStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Debug, Default)]
struct StoreInner {
    chats: HashMap<ChatId, ChatState>,
    /// Direct chats keyed by their sorted participant pair.
    dm_index: HashMap<(UserId, UserId), ChatId>,
}

#[derive(Debug)]
struct ChatState {
    name: Option<String>,
    is_group: bool,
    member_ids: Vec<UserId>,
    messages: Vec<MessageRecord>,
}

impl ChatState {
    fn record(&self, id: &ChatId) -> ChatRecord {
        ChatRecord {
            id: id.clone(),
            name: self.name.clone(),
            is_group: self.is_group,
            member_ids: self.member_ids.clone(),
            last_message: self.messages.last().cloned(),
        }
    }
}

fn dm_key(user_a: &UserId, user_b: &UserId) -> (UserId, UserId) {
    if user_a <= user_b {
        (user_a.clone(), user_b.clone())
    } else {
        (user_b.clone(), user_a.clone())
    }
}

impl InMemoryChatStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn create_group(
        &self,
        creator: &UserId,
        name: &str,
        member_ids: &[UserId],
    ) -> Result<ChatRecord, StoreError> {
        let mut members: Vec<UserId> = Vec::with_capacity(member_ids.len() + 1);
        for id in member_ids.iter().chain(std::iter::once(creator)) {
            if !members.contains(id) {
                members.push(id.clone());
            }
        }
        let id = ChatId::new();
        let state = ChatState {
            name: Some(name.to_owned()),
            is_group: true,
            member_ids: members,
            messages: Vec::new(),
        };
        let record = state.record(&id);
        let _ = self.inner.write().chats.insert(id, state);
        Ok(record)
    }

    async fn open_dm(&self, user_a: &UserId, user_b: &UserId) -> Result<ChatRecord, StoreError> {
        let key = dm_key(user_a, user_b);
        let mut inner = self.inner.write();
        if let Some(existing) = inner.dm_index.get(&key) {
            let id = existing.clone();
            return match inner.chats.get(&id) {
                Some(state) => Ok(state.record(&id)),
                None => Err(StoreError::ChatNotFound),
            };
        }
        let mut member_ids = vec![user_a.clone()];
        if user_b != user_a {
            member_ids.push(user_b.clone());
        }
        let id = ChatId::new();
        let state = ChatState {
            name: None,
            is_group: false,
            member_ids,
            messages: Vec::new(),
        };
        let record = state.record(&id);
        let _ = inner.dm_index.insert(key, id.clone());
        let _ = inner.chats.insert(id, state);
        Ok(record)
    }

    async fn chat(&self, chat_id: &ChatId) -> Result<ChatRecord, StoreError> {
        self.inner
            .read()
            .chats
            .get(chat_id)
            .map(|state| state.record(chat_id))
            .ok_or(StoreError::ChatNotFound)
    }

    async fn chats_for(&self, user_id: &UserId) -> Result<Vec<ChatRecord>, StoreError> {
        let inner = self.inner.read();
        let mut records: Vec<ChatRecord> = inner
            .chats
            .iter()
            .filter(|(_, state)| state.member_ids.contains(user_id))
            .map(|(id, state)| state.record(id))
            .collect();
        // stable listing order; v7 ids roughly follow creation time
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn rename_chat(&self, chat_id: &ChatId, name: &str) -> Result<ChatRecord, StoreError> {
        let mut inner = self.inner.write();
        let state = inner.chats.get_mut(chat_id).ok_or(StoreError::ChatNotFound)?;
        state.name = Some(name.to_owned());
        Ok(state.record(chat_id))
    }

    async fn add_member(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
    ) -> Result<ChatRecord, StoreError> {
        let mut inner = self.inner.write();
        let state = inner.chats.get_mut(chat_id).ok_or(StoreError::ChatNotFound)?;
        if !state.member_ids.contains(user_id) {
            state.member_ids.push(user_id.clone());
        }
        Ok(state.record(chat_id))
    }

    async fn remove_member(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
    ) -> Result<ChatRecord, StoreError> {
        let mut inner = self.inner.write();
        let state = inner.chats.get_mut(chat_id).ok_or(StoreError::ChatNotFound)?;
        state.member_ids.retain(|member| member != user_id);
        Ok(state.record(chat_id))
    }

    async fn append_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let state = inner
            .chats
            .get_mut(&message.chat_id)
            .ok_or(StoreError::ChatNotFound)?;
        state.messages.push(message.clone());
        Ok(())
    }

    async fn recent_messages(
        &self,
        chat_id: &ChatId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let inner = self.inner.read();
        let state = inner.chats.get(chat_id).ok_or(StoreError::ChatNotFound)?;
        let keep = usize::try_from(limit)
            .unwrap_or(usize::MAX)
            .min(state.messages.len());
        Ok(state.messages[state.messages.len() - keep..].to_vec())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
