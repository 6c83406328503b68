//! # courier
//!
//! Gateway binary — wires the in-process bus, the chat service, and the
//! HTTP/WebSocket server into one runnable process.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use courier_bus::{InMemoryBus, MessageBus, RpcClient};
use courier_chat::{ChatService, ChatStore, InMemoryChatStore};
use courier_core::codec::JsonCodec;
use courier_gateway::config::GatewayConfig;
use courier_gateway::server::GatewayServer;
use courier_profiles::ProfileResolver;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    courier_core::logging::init_subscriber("info");

    let config = GatewayConfig::from_env();

    // Single-process wiring: the bus, the chat store, and every chat.*
    // responder live here. The auth and user-directory subjects belong to
    // external services; on this in-memory transport nobody serves them, so
    // calls against them resolve through the failure taxonomy.
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let store: Arc<dyn ChatStore> = Arc::new(InMemoryChatStore::new());
    let codec = JsonCodec::new();

    let rpc = RpcClient::with_timeout(Arc::clone(&bus), codec, config.rpc_timeout);
    let service = ChatService::new(
        Arc::clone(&bus),
        store,
        ProfileResolver::new(rpc),
        codec,
        config.subject_space(),
    );
    let workers_cancel = CancellationToken::new();
    let workers = service.spawn(&bus, codec, &workers_cancel);

    let gateway = GatewayServer::new(config, bus)
        .bind()
        .await
        .context("failed to bind the gateway listener")?;
    info!(addr = %gateway.addr(), "courier gateway listening");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    gateway.shutdown().await;
    workers_cancel.cancel();
    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}
