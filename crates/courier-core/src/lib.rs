//! # courier-core
//!
//! Shared vocabulary for the Courier message-routing layer.
//!
//! Every other Courier crate depends on this one for:
//!
//! - **Branded IDs**: [`ids::UserId`], [`ids::ChatId`], [`ids::MessageId`],
//!   [`ids::ConnectionId`] as newtypes for type safety
//! - **Codec**: [`codec::JsonCodec`], the immutable serializer configuration
//!   passed explicitly to each component
//! - **Failure taxonomy**: [`failure::ServiceFailure`] and the uniform
//!   [`failure::ErrorEnvelope`] used by every RPC error reply
//! - **Profiles**: [`profile::UserProfile`] with its fixed fallback placeholder
//! - **Wire schemas**: bus events ([`envelope`]), WebSocket frames ([`frame`]),
//!   and RPC request/reply bodies ([`user`], [`chat`])
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other courier crates.

#![deny(unsafe_code)]

pub mod chat;
pub mod codec;
pub mod envelope;
pub mod failure;
pub mod frame;
pub mod ids;
pub mod logging;
pub mod profile;
pub mod user;
