//! # courier-gateway
//!
//! The edge of the deployment: terminates HTTP and WebSocket connections,
//! verifies bearer tokens, translates REST calls into bus RPCs through
//! [`courier_bus::RpcClient`], and multiplexes each WebSocket session onto
//! its user's personal inbox subject.
//!
//! The gateway holds no business state. Every request is either answered
//! from the bus or refused at the boundary; every session owns exactly one
//! inbox subscription, released when the session ends, however it ends.

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod status;
pub mod ws;

pub use config::GatewayConfig;
pub use server::{AppState, GatewayServer, RunningGateway, ServerError};
pub use shutdown::ShutdownCoordinator;
