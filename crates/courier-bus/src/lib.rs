//! # courier-bus
//!
//! The subject-addressed pub/sub layer: the [`bus::MessageBus`] port with its
//! RAII [`bus::Subscription`] handle, the in-process transport
//! [`memory::InMemoryBus`], the RPC correlation bridge [`rpc::RpcClient`],
//! and the fixed-shape responder loops in [`responder`].
//!
//! The bridge is the only way Courier makes synchronous calls across the
//! bus: one uniquely-addressed reply inbox per call, a hard deadline, and a
//! decode ladder that classifies every reply as success, domain rejection,
//! or protocol violation.

#![deny(unsafe_code)]

pub mod bus;
pub mod memory;
pub mod responder;
pub mod rpc;
pub mod subject;

pub use bus::{BusError, BusMessage, MessageBus, Subscription};
pub use memory::InMemoryBus;
pub use rpc::RpcClient;
pub use subject::{Subject, SubjectSpace, subjects};
