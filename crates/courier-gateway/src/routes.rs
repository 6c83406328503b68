//! REST routes: thin translations from HTTP to bus RPCs.
//!
//! Each handler builds the subject's request body, stamps the authenticated
//! caller where the contract wants one, and maps failures through
//! [`status::failure_response`]. No business rules live here.

use crate::auth::{AuthError, BEARER_PREFIX};
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::server::AppState;
use crate::status::{self, ApiError};
use crate::ws;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use courier_bus::subjects;
use courier_core::chat::{
    AddMemberRequest, ChatDetailsRequest, ChatView, CreateDmRequest, CreateGroupRequest,
    MessagesReply, MessagesRequest, MyChatsReply, MyChatsRequest, RemoveMemberRequest,
    UpdateChatRequest,
};
use courier_core::failure::ServiceFailure;
use courier_core::ids::{ChatId, UserId};
use courier_core::profile::UserProfile;
use courier_core::user::{
    AuthReply, AuthRequest, ProfileGetRequest, ProfileUpdateRequest, SearchReply, SearchRequest,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Build the gateway router: REST, WebSocket and operational routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/users/me", get(my_profile).put(update_profile))
        .route("/users/search", get(search_users))
        .route("/chats", get(my_chats))
        .route("/chats/group", post(create_group))
        .route("/chats/dm/{other_user_id}", post(open_dm))
        .route("/chats/{chat_id}", get(chat_details).patch(rename_chat))
        .route(
            "/chats/{chat_id}/members/{user_id}",
            post(add_member).delete(remove_member),
        )
        .route("/chats/{chat_id}/messages", get(chat_history))
        .route("/ws", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication extractor
// ─────────────────────────────────────────────────────────────────────────────

/// Authenticated caller, extracted from the `Authorization` header.
pub struct AuthedUser(pub UserId);

impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).map_err(|_| status::unauthorized())?;
        let user_id = state
            .verifier
            .verify(token)
            .map_err(|_| status::unauthorized())?;
        Ok(Self(user_id))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .ok_or(AuthError::MissingToken)
}

// ─────────────────────────────────────────────────────────────────────────────
// Request and response bodies local to the HTTP surface
// ─────────────────────────────────────────────────────────────────────────────

/// Response for the auth endpoints: token plus the caller's profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// The authenticated account's profile.
    pub user: UserProfile,
}

/// Body for `POST /chats/group`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupBody {
    /// Group display name.
    pub name: String,
    /// Initial member ids; the creator is added regardless.
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

/// Body for `PATCH /chats/{chat_id}`.
#[derive(Debug, Deserialize)]
pub struct RenameBody {
    /// New display name.
    pub name: String,
}

/// Body for `PUT /users/me`. All fields optional; absent means unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileBody {
    /// New username, if changing.
    pub new_username: Option<String>,
    /// New avatar URL, if changing.
    pub new_avatar_url: Option<String>,
    /// New email, if changing.
    pub new_email: Option<String>,
    /// New full name, if changing.
    pub new_full_name: Option<String>,
}

/// Query for `GET /users/search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Search term.
    pub q: Option<String>,
}

/// Query for `GET /chats/{chat_id}/messages`.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Page size cap; the chat service default applies when absent.
    pub limit: Option<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::snapshot(state.started_at, state.sessions.active()))
}

async fn render_metrics(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}

/// `POST /auth/register`: create the account, then fetch the fresh profile.
///
/// A failed profile fetch does not void the registration; the response
/// falls back to a stub profile so the client still gets its token.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<AuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply: AuthReply = call(&state, subjects::AUTH_REGISTER, &body).await?;
    let user = match fetch_profile(&state, &reply.user_id).await {
        Ok(profile) => profile,
        Err(failure) => {
            warn!(user_id = %reply.user_id, %failure, "profile fetch after registration failed");
            UserProfile::new(reply.user_id.clone(), reply.username.clone())
        }
    };
    info!(user_id = %user.id, "account registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: reply.token,
            user,
        }),
    ))
}

/// `POST /auth/login`: authenticate, then fetch the caller's profile.
///
/// Unlike registration there is nothing to salvage here, so a failed
/// profile fetch fails the login.
async fn login(
    State(state): State<AppState>,
    Json(body): Json<AuthRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let reply: AuthReply = call(&state, subjects::AUTH_LOGIN, &body).await?;
    let user = fetch_profile(&state, &reply.user_id)
        .await
        .map_err(|failure| status::failure_response(subjects::USER_PROFILE_GET, &failure))?;
    Ok(Json(AuthResponse {
        token: reply.token,
        user,
    }))
}

async fn my_profile(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = fetch_profile(&state, &user_id)
        .await
        .map_err(|failure| status::failure_response(subjects::USER_PROFILE_GET, &failure))?;
    Ok(Json(profile))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Json(body): Json<UpdateProfileBody>,
) -> Result<Json<UserProfile>, ApiError> {
    let request = ProfileUpdateRequest {
        user_id,
        new_username: body.new_username,
        new_avatar_url: body.new_avatar_url,
        new_email: body.new_email,
        new_full_name: body.new_full_name,
    };
    Ok(Json(
        call(&state, subjects::USER_PROFILE_UPDATE, &request).await?,
    ))
}

async fn search_users(
    State(state): State<AppState>,
    AuthedUser(_): AuthedUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchReply>, ApiError> {
    let Some(query) = params.q else {
        return Err(status::bad_request("Query parameter 'q' is required."));
    };
    Ok(Json(
        call(&state, subjects::USER_SEARCH, &SearchRequest { query }).await?,
    ))
}

async fn my_chats(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
) -> Result<Json<MyChatsReply>, ApiError> {
    Ok(Json(
        call(&state, subjects::CHAT_GET_MYCHATS, &MyChatsRequest { user_id }).await?,
    ))
}

async fn create_group(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Json(body): Json<CreateGroupBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = CreateGroupRequest {
        creator_id: user_id,
        name: body.name,
        member_ids: body.member_ids,
    };
    let view: ChatView = call(&state, subjects::CHAT_CREATE_GROUP, &request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn open_dm(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(other_user_id): Path<String>,
) -> Result<Json<ChatView>, ApiError> {
    let request = CreateDmRequest {
        user_id_1: user_id,
        user_id_2: UserId::from(other_user_id),
    };
    Ok(Json(
        call(&state, subjects::CHAT_CREATE_DM, &request).await?,
    ))
}

async fn chat_details(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatView>, ApiError> {
    let request = ChatDetailsRequest {
        chat_id: ChatId::from(chat_id),
        user_id,
    };
    Ok(Json(
        call(&state, subjects::CHAT_GET_DETAILS, &request).await?,
    ))
}

async fn rename_chat(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(chat_id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Result<Json<ChatView>, ApiError> {
    let request = UpdateChatRequest {
        chat_id: ChatId::from(chat_id),
        user_id,
        name: body.name,
    };
    Ok(Json(
        call(&state, subjects::CHAT_UPDATE_DETAILS, &request).await?,
    ))
}

async fn add_member(
    State(state): State<AppState>,
    AuthedUser(actor): AuthedUser,
    Path((chat_id, user_id)): Path<(String, String)>,
) -> Result<Json<ChatView>, ApiError> {
    let request = AddMemberRequest {
        added_by_user_id: actor,
        chat_id: ChatId::from(chat_id),
        user_id_to_add: UserId::from(user_id),
    };
    Ok(Json(call(&state, subjects::CHAT_ADD_USER, &request).await?))
}

async fn remove_member(
    State(state): State<AppState>,
    AuthedUser(actor): AuthedUser,
    Path((chat_id, user_id)): Path<(String, String)>,
) -> Result<Json<ChatView>, ApiError> {
    let request = RemoveMemberRequest {
        removed_by_user_id: actor,
        chat_id: ChatId::from(chat_id),
        user_id_to_remove: UserId::from(user_id),
    };
    Ok(Json(
        call(&state, subjects::CHAT_REMOVE_USER, &request).await?,
    ))
}

async fn chat_history(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(chat_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<MessagesReply>, ApiError> {
    let request = MessagesRequest {
        chat_id: ChatId::from(chat_id),
        user_id,
        limit: params.limit,
    };
    Ok(Json(
        call(&state, subjects::CHAT_MESSAGES_GET, &request).await?,
    ))
}

/// `GET /ws`: upgrade the authenticated connection to a streaming session.
async fn ws_upgrade(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| ws::session::run(socket, user_id, state))
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared plumbing
// ─────────────────────────────────────────────────────────────────────────────

/// Issue one RPC and map any failure onto its HTTP rendering.
async fn call<Req, Resp>(state: &AppState, subject: &str, request: &Req) -> Result<Resp, ApiError>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    state
        .rpc
        .call(subject, request)
        .await
        .map_err(|failure| status::failure_response(subject, &failure))
}

async fn fetch_profile(state: &AppState, user_id: &UserId) -> Result<UserProfile, ServiceFailure> {
    let request = ProfileGetRequest {
        user_id: user_id.clone(),
    };
    state.rpc.call(subjects::USER_PROFILE_GET, &request).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
