//! RPC request/reply bodies for the auth and user-directory subjects.
//!
//! These schemas are the contract with the externally deployed auth and user
//! services; Courier only ever sits on the requesting side of them.

use crate::ids::UserId;
use crate::profile::UserProfile;
use serde::{Deserialize, Serialize};

/// Request body for `auth.register` and `auth.login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Account name.
    pub username: String,
    /// Plaintext credential; verified by the auth service only.
    pub password: String,
}

/// Reply body for `auth.register` and `auth.login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthReply {
    /// Signed bearer token for the HTTP/WebSocket boundary.
    pub token: String,
    /// Id of the authenticated account.
    pub user_id: UserId,
    /// Account name as registered.
    pub username: String,
}

/// Request body for `user.profile.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileGetRequest {
    /// Profile to fetch.
    pub user_id: UserId,
}

/// Request body for `user.profiles.get.batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBatchRequest {
    /// Deduplicated ids to resolve, in stable order.
    pub user_ids: Vec<UserId>,
}

/// Reply body for `user.profiles.get.batch`.
///
/// May legitimately contain fewer profiles than requested ids; callers
/// substitute the fallback placeholder for the remainder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBatchReply {
    /// Resolved profiles, in no particular order.
    pub profiles: Vec<UserProfile>,
}

/// Request body for `user.profile.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    /// Profile to update (always the authenticated caller).
    pub user_id: UserId,
    /// New username, if changing.
    pub new_username: Option<String>,
    /// New avatar URL, if changing.
    pub new_avatar_url: Option<String>,
    /// New email, if changing.
    pub new_email: Option<String>,
    /// New full name, if changing.
    pub new_full_name: Option<String>,
}

/// Request body for `user.search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Search term (username prefix or substring; directory-defined).
    pub query: String,
}

/// Reply body for `user.search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReply {
    /// Matching profiles.
    pub users: Vec<UserProfile>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
