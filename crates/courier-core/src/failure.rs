//! Failure taxonomy for cross-service calls.
//!
//! Every RPC through the bridge resolves to exactly one outcome: the decoded
//! success payload or one [`ServiceFailure`] variant. The variants separate
//! expected domain rejections (user-facing message, mapped to a client
//! status) from infrastructure faults (timeout, unreachable transport) and
//! from protocol violations, which are the fatal-fault channel: logged with
//! the offending sample, never echoed to a client.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Longest reply sample retained for protocol-violation diagnostics.
const MAX_SAMPLE_LEN: usize = 256;

/// One of the five possible outcomes of a bridged RPC, minus success.
#[derive(Debug, Error)]
pub enum ServiceFailure {
    /// The transport reported the request could not be routed at all
    /// (bus closed, connection lost).
    #[error("service for '{subject}' is unreachable: {reason}")]
    Unreachable {
        /// Subject the request was addressed to.
        subject: String,
        /// Transport-level cause, for logs.
        reason: String,
    },

    /// No reply arrived before the deadline.
    #[error("request to '{subject}' timed out after {timeout:?}")]
    Timeout {
        /// Subject the request was addressed to.
        subject: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The downstream service explicitly rejected the request. The message
    /// is user-facing and preserved verbatim.
    #[error("{message}")]
    Domain {
        /// Rejection reason as produced by the downstream service.
        message: String,
    },

    /// The reply matched neither the success schema nor the `{error}`
    /// envelope. The sample is for internal logs only; `Display` never
    /// includes it.
    #[error("unrecognized reply from '{subject}'")]
    Protocol {
        /// Subject the request was addressed to.
        subject: String,
        /// Truncated raw reply, or a description of the local fault.
        sample: String,
    },
}

impl ServiceFailure {
    /// A domain rejection with the given user-facing message.
    #[must_use]
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            message: message.into(),
        }
    }

    /// A protocol violation carrying a bounded sample of the raw reply.
    #[must_use]
    pub fn protocol(subject: impl Into<String>, raw: &[u8]) -> Self {
        Self::Protocol {
            subject: subject.into(),
            sample: sample_of(raw),
        }
    }

    /// True for the variants callers may present to end users verbatim.
    #[must_use]
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain { .. })
    }
}

/// Render a bounded, lossy preview of raw reply bytes for logging.
#[must_use]
pub fn sample_of(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut sample: String = text.chars().take(MAX_SAMPLE_LEN).collect();
    if text.chars().count() > MAX_SAMPLE_LEN {
        sample.push('…');
    }
    sample
}

/// The uniform error reply envelope used on every RPC subject.
///
/// Any reply that decodes to this shape (and not to the success schema) is a
/// domain rejection; its `error` string is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// User-facing rejection message.
    pub error: String,
}

impl ErrorEnvelope {
    /// Wrap a message in the envelope.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
