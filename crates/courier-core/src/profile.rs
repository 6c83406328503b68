//! The canonical user profile model and its fallback placeholder.

use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// Username carried by the fallback placeholder profile.
pub const FALLBACK_USERNAME: &str = "Unknown User";

/// Canonical denormalized user profile, as served by the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Stable user id.
    pub id: UserId,
    /// Display name, unique per account.
    pub username: String,
    /// Optional avatar location.
    pub avatar_url: Option<String>,
    /// Optional contact email.
    pub email: Option<String>,
    /// Optional full display name.
    pub full_name: Option<String>,
}

impl UserProfile {
    /// A minimal profile with only an id and username.
    #[must_use]
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            avatar_url: None,
            email: None,
            full_name: None,
        }
    }

    /// The fixed fallback placeholder for an id the directory could not
    /// resolve. Keeps the requested id so clients can still key by it.
    #[must_use]
    pub fn placeholder(id: &UserId) -> Self {
        Self::new(id.clone(), FALLBACK_USERNAME)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
