//! Gateway assembly: shared state, the listener, and graceful shutdown.

use crate::auth::{JwtVerifier, TokenVerifier};
use crate::config::{GatewayConfig, JWT_AUDIENCE};
use crate::health::SessionCounter;
use crate::shutdown::{self, ShutdownCoordinator};
use crate::{metrics, routes};
use courier_bus::{MessageBus, RpcClient, SubjectSpace};
use courier_core::codec::JsonCodec;
use courier_profiles::ProfileResolver;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Everything the routes and sessions need. Cloned per request; every field
/// is a handle.
#[derive(Clone)]
pub struct AppState {
    /// The transport, for session publishes and subscriptions.
    pub bus: Arc<dyn MessageBus>,
    /// RPC bridge for the REST translations.
    pub rpc: RpcClient,
    /// Batched profile enrichment for outbound frames.
    pub resolver: ProfileResolver,
    /// Bearer-token verifier.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Subject builders for personal inboxes.
    pub space: SubjectSpace,
    /// Wire codec.
    pub codec: JsonCodec,
    /// Runtime settings.
    pub config: Arc<GatewayConfig>,
    /// Handle for rendering `/metrics`.
    pub metrics: PrometheusHandle,
    /// When this state was assembled; `/health` reports uptime from here.
    pub started_at: Instant,
    /// Live session tally for `/health`.
    pub sessions: SessionCounter,
    /// Teardown signal observed by the listener and every session.
    pub shutdown: ShutdownCoordinator,
}

impl AppState {
    /// Assemble the shared state over the given transport and verifier.
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        bus: Arc<dyn MessageBus>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let codec = JsonCodec::new();
        let rpc = RpcClient::with_timeout(Arc::clone(&bus), codec, config.rpc_timeout);
        let resolver = ProfileResolver::new(rpc.clone());
        let space = config.subject_space();
        let metrics = metrics::install_recorder();
        Self {
            bus,
            rpc,
            resolver,
            verifier,
            space,
            codec,
            config: Arc::new(config),
            metrics,
            started_at: Instant::now(),
            sessions: SessionCounter::new(),
            shutdown: ShutdownCoordinator::new(),
        }
    }
}

/// Failures while starting the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The TCP listener could not be created on the configured address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A configured gateway, ready to bind.
pub struct GatewayServer {
    config: GatewayConfig,
    bus: Arc<dyn MessageBus>,
    verifier: Arc<dyn TokenVerifier>,
}

impl GatewayServer {
    /// A gateway verifying tokens against the configured HS256 secret.
    #[must_use]
    pub fn new(config: GatewayConfig, bus: Arc<dyn MessageBus>) -> Self {
        let verifier = Arc::new(JwtVerifier::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            JWT_AUDIENCE,
        ));
        Self::with_verifier(config, bus, verifier)
    }

    /// A gateway with a caller-supplied token verifier.
    #[must_use]
    pub fn with_verifier(
        config: GatewayConfig,
        bus: Arc<dyn MessageBus>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            config,
            bus,
            verifier,
        }
    }

    /// Bind the listener and start serving. Returns once the port is open.
    pub async fn bind(self) -> Result<RunningGateway, ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let state = AppState::new(self.config, self.bus, self.verifier);
        let shutdown = state.shutdown.clone();
        let sessions = state.sessions.clone();
        let drain_timeout = state.config.drain_timeout;
        let router = routes::router(state);

        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await });
            if let Err(error) = serve.await {
                error!(%error, "gateway server error");
            }
        });
        info!(addr = %local, "gateway listening");
        Ok(RunningGateway {
            addr: local,
            shutdown,
            sessions,
            drain_timeout,
            handle,
        })
    }
}

/// Handle on a serving gateway.
pub struct RunningGateway {
    addr: SocketAddr,
    shutdown: ShutdownCoordinator,
    sessions: SessionCounter,
    drain_timeout: Duration,
    handle: JoinHandle<()>,
}

impl RunningGateway {
    /// The bound socket address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// WebSocket sessions currently streaming.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.sessions.active()
    }

    /// Signal every session, stop accepting connections, and wait up to the
    /// configured drain window for the listener to finish.
    pub async fn shutdown(self) {
        self.shutdown.shutdown();
        shutdown::drain(self.handle, self.drain_timeout).await;
        info!("gateway stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
