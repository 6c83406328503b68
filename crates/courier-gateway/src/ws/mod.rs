//! WebSocket session handling.

pub mod session;
