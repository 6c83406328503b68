//! # courier-chat
//!
//! The chat domain behind the bus: persistence ([`store::ChatStore`] with an
//! in-process implementation), the persist-first fanout router
//! ([`fanout::FanoutRouter`]), and the [`service::ChatService`] that answers
//! the `chat.*` request subjects and consumes the ingestion event stream.

#![deny(unsafe_code)]

pub mod fanout;
pub mod service;
pub mod store;

pub use fanout::FanoutRouter;
pub use service::{ChatError, ChatService, DEFAULT_HISTORY_LIMIT};
pub use store::{ChatStore, InMemoryChatStore, StoreError};
