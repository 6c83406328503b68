//! Explicit JSON codec shared by every component.
//!
//! The routing layer used to rely on an implicitly shared serializer
//! configuration; here the configuration is a value. Components receive a
//! [`JsonCodec`] at construction time and use it for every wire encode/decode,
//! so the lenient-decode policy (unknown fields tolerated, missing required
//! fields rejected) is pinned in exactly one place.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from [`JsonCodec`] operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A value could not be serialized to JSON.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
    /// A payload could not be deserialized into the expected schema.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Immutable JSON serializer configuration.
///
/// Cheap to copy; construct once at startup and hand a copy to each
/// component. Decoding tolerates unknown fields (forward compatibility with
/// newer peers) and rejects missing required ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    _private: (),
}

impl JsonCodec {
    /// Create the codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize a value to a JSON byte payload.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }

    /// Serialize a value to a JSON string (WebSocket text frames).
    pub fn encode_string<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(CodecError::Encode)
    }

    /// Deserialize a JSON byte payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(payload).map_err(CodecError::Decode)
    }

    /// Deserialize a JSON string into `T`.
    pub fn decode_str<T: DeserializeOwned>(&self, text: &str) -> Result<T, CodecError> {
        serde_json::from_str(text).map_err(CodecError::Decode)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
