//! In-process deployment harness: the backend services a gateway talks to,
//! stubbed or real, wired over an [`InMemoryBus`].
//!
//! Auth and the user directory are bus responders with canned behavior; the
//! chat service is the real one over the in-memory store. REST tests drive
//! the router directly, WebSocket tests go through a bound listener.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use courier_bus::memory::InMemoryBus;
use courier_bus::responder;
use courier_bus::{MessageBus, RpcClient, Subject, SubjectSpace, subjects};
use courier_chat::{ChatService, InMemoryChatStore};
use courier_core::codec::JsonCodec;
use courier_core::ids::UserId;
use courier_core::profile::UserProfile;
use courier_core::user::{
    AuthReply, AuthRequest, ProfileBatchReply, ProfileBatchRequest, ProfileGetRequest,
    ProfileUpdateRequest, SearchReply, SearchRequest,
};
use courier_gateway::auth::{Claims, JwtVerifier};
use courier_gateway::config::{GatewayConfig, JWT_AUDIENCE};
use courier_gateway::routes;
use courier_gateway::server::{AppState, GatewayServer, RunningGateway};
use courier_profiles::ProfileResolver;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub use tokio_tungstenite::tungstenite::Error as WsError;
pub use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

pub const TEST_SECRET: &str = "harness-secret";
pub const TEST_ISSUER: &str = "courier-test";

/// Everything running behind the gateway.
pub struct TestBackend {
    pub bus: Arc<InMemoryBus>,
    pub store: InMemoryChatStore,
    pub cancel: CancellationToken,
}

impl TestBackend {
    /// Start auth, the chat service, and (optionally) the user directory.
    pub async fn start(with_directory: bool) -> Self {
        courier_core::logging::init_subscriber("warn");
        let bus = Arc::new(InMemoryBus::new());
        let dyn_bus: Arc<dyn MessageBus> = bus.clone();
        let codec = JsonCodec::new();
        let cancel = CancellationToken::new();

        spawn_auth(&dyn_bus, codec, &cancel);
        if with_directory {
            spawn_directory(&dyn_bus, codec, &cancel);
        }

        let store = InMemoryChatStore::default();
        let rpc = RpcClient::new(Arc::clone(&dyn_bus), codec);
        let service = ChatService::new(
            Arc::clone(&dyn_bus),
            Arc::new(store.clone()),
            ProfileResolver::new(rpc),
            codec,
            SubjectSpace::default(),
        );
        let _workers = service.spawn(&dyn_bus, codec, &cancel);

        // Let every responder reach its subscription before tests publish.
        tokio::time::sleep(Duration::from_millis(25)).await;
        Self { bus, store, cancel }
    }

    pub fn dyn_bus(&self) -> Arc<dyn MessageBus> {
        self.bus.clone()
    }

    /// A router over this backend, for driving requests without a listener.
    pub fn router(&self) -> Router {
        let verifier = Arc::new(JwtVerifier::new(TEST_SECRET, TEST_ISSUER, JWT_AUDIENCE));
        routes::router(AppState::new(harness_config(), self.dyn_bus(), verifier))
    }
}

fn harness_config() -> GatewayConfig {
    GatewayConfig {
        port: 0,
        jwt_secret: TEST_SECRET.to_owned(),
        jwt_issuer: TEST_ISSUER.to_owned(),
        // Keep unanswered-subject tests fast.
        rpc_timeout: Duration::from_millis(500),
        ..GatewayConfig::default()
    }
}

/// Full deployment: backend plus a gateway on a free port.
pub async fn deploy() -> (TestBackend, RunningGateway) {
    let backend = TestBackend::start(true).await;
    let gateway = GatewayServer::new(harness_config(), backend.dyn_bus())
        .bind()
        .await
        .expect("gateway bind");
    (backend, gateway)
}

/// Backend plus a router, for REST tests.
pub async fn rest_router() -> (TestBackend, Router) {
    let backend = TestBackend::start(true).await;
    let router = backend.router();
    (backend, router)
}

// ─────────────────────────────────────────────────────────────────────────────
// Stub services
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_auth(bus: &Arc<dyn MessageBus>, codec: JsonCodec, cancel: &CancellationToken) {
    let accounts: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));

    let register_accounts = Arc::clone(&accounts);
    drop(tokio::spawn(responder::serve_requests(
        Arc::clone(bus),
        codec,
        Subject::from(subjects::AUTH_REGISTER),
        cancel.clone(),
        move |request: AuthRequest| {
            let accounts = Arc::clone(&register_accounts);
            async move {
                let mut accounts = accounts.lock();
                if accounts.contains_key(&request.username) {
                    return Err("Username already taken".to_owned());
                }
                let _ = accounts.insert(request.username.clone(), request.password.clone());
                Ok(auth_reply(&request.username))
            }
        },
    )));

    let login_accounts = accounts;
    drop(tokio::spawn(responder::serve_requests(
        Arc::clone(bus),
        codec,
        Subject::from(subjects::AUTH_LOGIN),
        cancel.clone(),
        move |request: AuthRequest| {
            let accounts = Arc::clone(&login_accounts);
            async move {
                let accounts = accounts.lock();
                match accounts.get(&request.username) {
                    Some(password) if *password == request.password => {
                        Ok(auth_reply(&request.username))
                    }
                    _ => Err("Invalid username or password".to_owned()),
                }
            }
        },
    )));
}

fn spawn_directory(bus: &Arc<dyn MessageBus>, codec: JsonCodec, cancel: &CancellationToken) {
    drop(tokio::spawn(responder::serve_requests(
        Arc::clone(bus),
        codec,
        Subject::from(subjects::USER_PROFILE_GET),
        cancel.clone(),
        |request: ProfileGetRequest| async move { Ok::<_, String>(profile_for(&request.user_id)) },
    )));
    drop(tokio::spawn(responder::serve_requests(
        Arc::clone(bus),
        codec,
        Subject::from(subjects::USER_PROFILES_GET_BATCH),
        cancel.clone(),
        |request: ProfileBatchRequest| async move {
            let profiles = request.user_ids.iter().map(profile_for).collect();
            Ok::<_, String>(ProfileBatchReply { profiles })
        },
    )));
    drop(tokio::spawn(responder::serve_requests(
        Arc::clone(bus),
        codec,
        Subject::from(subjects::USER_PROFILE_UPDATE),
        cancel.clone(),
        |request: ProfileUpdateRequest| async move {
            let mut profile = profile_for(&request.user_id);
            if let Some(username) = request.new_username {
                profile.username = username;
            }
            Ok::<_, String>(profile)
        },
    )));
    drop(tokio::spawn(responder::serve_requests(
        Arc::clone(bus),
        codec,
        Subject::from(subjects::USER_SEARCH),
        cancel.clone(),
        |request: SearchRequest| async move {
            let users = vec![UserProfile::new(
                user_id_for(&request.query),
                request.query.clone(),
            )];
            Ok::<_, String>(SearchReply { users })
        },
    )));
}

pub fn user_id_for(username: &str) -> UserId {
    UserId::from(format!("u-{username}"))
}

pub fn profile_for(user_id: &UserId) -> UserProfile {
    UserProfile::new(user_id.clone(), format!("name-{user_id}"))
}

fn auth_reply(username: &str) -> AuthReply {
    let user_id = user_id_for(username);
    AuthReply {
        token: mint_token(&user_id),
        user_id,
        username: username.to_owned(),
    }
}

/// Sign a token the way the auth service would.
pub fn mint_token(user_id: &UserId) -> String {
    let claims = Claims {
        user_id: user_id.to_string(),
        exp: unix_now() + 3600,
        iss: TEST_ISSUER.to_owned(),
        aud: JWT_AUDIENCE.to_owned(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("token encode")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Drive one request through the router and decode the response.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
    });
    (status, body)
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request("GET", uri, token, None)
}

pub fn post(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    request("POST", uri, token, Some(body))
}

pub fn put(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    request("PUT", uri, token, Some(body))
}

pub fn patch(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    request("PATCH", uri, token, Some(body))
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    request("DELETE", uri, token, None)
}

fn request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket helpers
// ─────────────────────────────────────────────────────────────────────────────

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect_ws(addr: SocketAddr, token: &str) -> WsClient {
    try_connect_ws(addr, Some(token))
        .await
        .expect("ws connect")
}

pub async fn try_connect_ws(addr: SocketAddr, token: Option<&str>) -> Result<WsClient, WsError> {
    let mut request = format!("ws://{addr}/ws")
        .into_client_request()
        .expect("ws url");
    if let Some(token) = token {
        let _ = request.headers_mut().insert(
            "Authorization",
            format!("Bearer {token}").parse().expect("header value"),
        );
    }
    connect_async(request).await.map(|(socket, _)| socket)
}

/// Next text frame as JSON; panics if none arrives within two seconds.
pub async fn next_json(socket: &mut WsClient) -> serde_json::Value {
    use futures::StreamExt;

    let deadline = Duration::from_secs(2);
    let started = Instant::now();
    while started.elapsed() < deadline {
        let remaining = deadline.saturating_sub(started.elapsed());
        let Ok(Some(frame)) = tokio::time::timeout(remaining, socket.next()).await else {
            break;
        };
        if let WsMessage::Text(text) = frame.expect("ws read") {
            return serde_json::from_str(text.as_str()).expect("frame json");
        }
    }
    panic!("no text frame within {deadline:?}");
}

/// Assert no text frame arrives for a while (pings are fine).
pub async fn expect_silence(socket: &mut WsClient) {
    use futures::StreamExt;

    let deadline = Instant::now() + Duration::from_millis(150);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, socket.next()).await {
            Err(_) => return,
            Ok(Some(Ok(WsMessage::Text(text)))) => panic!("unexpected frame: {text}"),
            Ok(_) => {}
        }
    }
}

/// Poll `check` until it holds or the deadline passes.
pub async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
