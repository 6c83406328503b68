//! # courier-profiles
//!
//! The profile enrichment aggregator: id-bearing storage records go in,
//! profile-bearing client views come out. Every call makes at most one
//! batched directory lookup over the bus, and ids the directory cannot
//! name resolve to the fixed placeholder profile instead of failing the
//! batch.

#![deny(unsafe_code)]

pub mod resolver;

pub use resolver::{DEFAULT_LOOKUP_TIMEOUT, ProfileResolver};
