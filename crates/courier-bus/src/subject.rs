//! Subject addressing: fixed service subjects, per-user inboxes, and
//! per-call reply inboxes.

use courier_core::ids::UserId;
use std::fmt;
use uuid::Uuid;

/// A hierarchical subject string, e.g. `chat.create.group` or
/// `user.inbox.018f3c…`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject(String);

impl Subject {
    /// Wrap a subject string.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    /// The subject as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Subject {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Subject {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fixed subjects served across the deployment.
pub mod subjects {
    /// Account registration (RPC, auth service).
    pub const AUTH_REGISTER: &str = "auth.register";
    /// Credential login (RPC, auth service).
    pub const AUTH_LOGIN: &str = "auth.login";
    /// Single profile fetch (RPC, user service).
    pub const USER_PROFILE_GET: &str = "user.profile.get";
    /// Batched profile fetch (RPC, user service).
    pub const USER_PROFILES_GET_BATCH: &str = "user.profiles.get.batch";
    /// Profile update (RPC, user service).
    pub const USER_PROFILE_UPDATE: &str = "user.profile.update";
    /// Profile search (RPC, user service).
    pub const USER_SEARCH: &str = "user.search";
    /// Group chat creation (RPC, chat service).
    pub const CHAT_CREATE_GROUP: &str = "chat.create.group";
    /// Direct chat resolution, idempotent (RPC, chat service).
    pub const CHAT_CREATE_DM: &str = "chat.create.dm";
    /// Chat listing for one user (RPC, chat service).
    pub const CHAT_GET_MYCHATS: &str = "chat.get.mychats";
    /// Single chat details (RPC, chat service).
    pub const CHAT_GET_DETAILS: &str = "chat.get.details";
    /// Chat rename (RPC, chat service).
    pub const CHAT_UPDATE_DETAILS: &str = "chat.update.details";
    /// Member addition (RPC, chat service).
    pub const CHAT_ADD_USER: &str = "chat.add.user";
    /// Member removal (RPC, chat service).
    pub const CHAT_REMOVE_USER: &str = "chat.remove.user";
    /// Message history page (RPC, chat service).
    pub const CHAT_MESSAGES_GET: &str = "chat.messages.get";
    /// Fire-and-forget message ingestion (chat service).
    pub const CHAT_MESSAGE_INCOMING: &str = "chat.message.incoming";

    /// True for subjects whose domain rejections mean "not authenticated".
    #[must_use]
    pub fn is_auth(subject: &str) -> bool {
        subject.starts_with("auth.")
    }
}

/// Builders for the dynamic subjects: personal inboxes and reply inboxes.
#[derive(Debug, Clone)]
pub struct SubjectSpace {
    inbox_prefix: String,
}

impl SubjectSpace {
    /// Default prefix for personal inbox subjects.
    pub const DEFAULT_INBOX_PREFIX: &'static str = "user.inbox";

    /// A subject space with the given personal-inbox prefix.
    #[must_use]
    pub fn new(inbox_prefix: impl Into<String>) -> Self {
        Self {
            inbox_prefix: inbox_prefix.into(),
        }
    }

    /// The personal inbox subject for one user: `<prefix>.<userId>`.
    #[must_use]
    pub fn personal_inbox(&self, user_id: &UserId) -> Subject {
        Subject(format!("{}.{user_id}", self.inbox_prefix))
    }

    /// A unique reply inbox for one RPC exchange.
    ///
    /// UUID v7 keeps concurrent calls collision-free and the subjects
    /// time-sortable in transport logs.
    #[must_use]
    pub fn reply_inbox() -> Subject {
        Subject(format!("_INBOX.{}", Uuid::now_v7().as_simple()))
    }
}

impl Default for SubjectSpace {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INBOX_PREFIX)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
