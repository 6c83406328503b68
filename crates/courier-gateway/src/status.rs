//! Mapping bus-level failures onto HTTP responses.
//!
//! One place decides which status each [`ServiceFailure`] earns and what
//! body the client sees. Domain rejections pass their message through
//! verbatim; everything else gets a fixed text so internals never leak.

use axum::Json;
use axum::http::StatusCode;
use courier_bus::subjects;
use courier_core::failure::{ErrorEnvelope, ServiceFailure};
use tracing::{error, warn};

/// HTTP rendering of one refused request.
pub type ApiError = (StatusCode, Json<ErrorEnvelope>);

/// Map a failure from an RPC on `subject` onto its client-facing response.
///
/// Domain rejections are 401 on the auth subjects and 400 elsewhere, with
/// the service's message verbatim. Transport faults become 503, deadlines
/// 504. Protocol violations become an opaque 500; the reply sample stays in
/// the logs.
#[must_use]
pub fn failure_response(subject: &str, failure: &ServiceFailure) -> ApiError {
    match failure {
        ServiceFailure::Unreachable { .. } => {
            error!(subject, %failure, "service unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorEnvelope::new(failure.to_string())),
            )
        }
        ServiceFailure::Timeout { .. } => {
            warn!(subject, %failure, "request timed out");
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(ErrorEnvelope::new(failure.to_string())),
            )
        }
        ServiceFailure::Domain { message } => {
            let status = if subjects::is_auth(subject) {
                StatusCode::UNAUTHORIZED
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(ErrorEnvelope::new(message.clone())))
        }
        ServiceFailure::Protocol { sample, .. } => {
            error!(subject, sample, "unintelligible service reply");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorEnvelope::new("An internal error occurred")),
            )
        }
    }
}

/// The uniform 401 for missing or invalid bearer tokens.
#[must_use]
pub fn unauthorized() -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorEnvelope::new(
            "Token is not valid, missing, or has expired",
        )),
    )
}

/// A 400 with the given user-facing message.
#[must_use]
pub fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorEnvelope::new(message)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
