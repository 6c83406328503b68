//! Gateway runtime settings, loaded from `COURIER_*` environment variables.
//!
//! Every variable is optional; unset or unparseable values fall back to the
//! defaults below. The only fallback worth shouting about is the signing
//! secret, which is logged as insecure when the development value is in
//! effect. The secret itself is never logged.

use crate::shutdown::DEFAULT_DRAIN_TIMEOUT;
use courier_bus::SubjectSpace;
use courier_bus::rpc::DEFAULT_RPC_TIMEOUT;
use std::time::Duration;
use tracing::warn;

/// Signing secret used when `COURIER_JWT_SECRET` is unset. Local runs only.
const DEV_JWT_SECRET: &str = "courier-dev-secret";

/// Audience expected in client tokens. Fixed across the deployment; the
/// auth service signs with the same value.
pub const JWT_AUDIENCE: &str = "courier-clients";

/// Runtime settings for one gateway process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Interface the HTTP listener binds.
    pub host: String,
    /// Port the HTTP listener binds. Zero picks a free port.
    pub port: u16,
    /// HMAC-SHA256 secret for verifying client bearer tokens.
    pub jwt_secret: String,
    /// Issuer expected in client tokens.
    pub jwt_issuer: String,
    /// Prefix for personal inbox subjects.
    pub inbox_prefix: String,
    /// Deadline for bus RPCs issued on behalf of HTTP requests.
    pub rpc_timeout: Duration,
    /// Interval between WebSocket pings.
    pub ping_interval: Duration,
    /// Sessions that have not answered a ping within this window are closed.
    pub pong_timeout: Duration,
    /// Outbound frame buffer per WebSocket session.
    pub frame_buffer: usize,
    /// How long shutdown waits for live sessions before aborting them.
    pub drain_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            jwt_secret: DEV_JWT_SECRET.to_owned(),
            jwt_issuer: "courier".to_owned(),
            inbox_prefix: SubjectSpace::DEFAULT_INBOX_PREFIX.to_owned(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            ping_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(30),
            frame_buffer: 64,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    /// Load settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let jwt_secret = match lookup("COURIER_JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("COURIER_JWT_SECRET not set, using the development secret (insecure)");
                defaults.jwt_secret
            }
        };
        Self {
            host: lookup("COURIER_HOST").unwrap_or(defaults.host),
            port: number(&lookup, "COURIER_PORT", defaults.port),
            jwt_secret,
            jwt_issuer: lookup("COURIER_JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            inbox_prefix: lookup("COURIER_INBOX_PREFIX").unwrap_or(defaults.inbox_prefix),
            rpc_timeout: duration_ms(&lookup, "COURIER_RPC_TIMEOUT_MS", defaults.rpc_timeout),
            ping_interval: duration_secs(&lookup, "COURIER_WS_PING_SECS", defaults.ping_interval),
            pong_timeout: duration_secs(&lookup, "COURIER_WS_PONG_SECS", defaults.pong_timeout),
            frame_buffer: number(&lookup, "COURIER_WS_FRAME_BUFFER", defaults.frame_buffer),
            drain_timeout: duration_secs(&lookup, "COURIER_DRAIN_SECS", defaults.drain_timeout),
        }
    }

    /// The `host:port` string the listener binds.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The subject space built from the configured inbox prefix.
    #[must_use]
    pub fn subject_space(&self) -> SubjectSpace {
        SubjectSpace::new(self.inbox_prefix.clone())
    }
}

fn number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, raw, "not a number, keeping the default");
                default
            }
        },
    }
}

fn duration_ms(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(key, raw, "not a number, keeping the default");
                default
            }
        },
    }
}

fn duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(key, raw, "not a number, keeping the default");
                default
            }
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::ids::UserId;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_the_defaults() {
        let config = GatewayConfig::from_lookup(|_| None);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.rpc_timeout, Duration::from_secs(5));
        assert_eq!(config.ping_interval, Duration::from_secs(15));
        assert_eq!(config.pong_timeout, Duration::from_secs(30));
        assert_eq!(config.frame_buffer, 64);
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
    }

    #[test]
    fn environment_overrides_apply() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("COURIER_HOST", "0.0.0.0"),
            ("COURIER_PORT", "9090"),
            ("COURIER_JWT_SECRET", "prod-secret"),
            ("COURIER_JWT_ISSUER", "courier-prod"),
            ("COURIER_RPC_TIMEOUT_MS", "1500"),
            ("COURIER_WS_PING_SECS", "5"),
            ("COURIER_DRAIN_SECS", "3"),
        ]));
        assert_eq!(config.bind_addr(), "0.0.0.0:9090");
        assert_eq!(config.jwt_secret, "prod-secret");
        assert_eq!(config.jwt_issuer, "courier-prod");
        assert_eq!(config.rpc_timeout, Duration::from_millis(1500));
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.drain_timeout, Duration::from_secs(3));
    }

    #[test]
    fn unparseable_numbers_keep_the_defaults() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("COURIER_PORT", "eight"),
            ("COURIER_WS_PONG_SECS", "soon"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.pong_timeout, Duration::from_secs(30));
    }

    #[test]
    fn inbox_prefix_feeds_the_subject_space() {
        let config =
            GatewayConfig::from_lookup(lookup_from(&[("COURIER_INBOX_PREFIX", "edge.push")]));
        let inbox = config.subject_space().personal_inbox(&UserId::from("u1"));
        assert_eq!(inbox.as_str(), "edge.push.u1");
    }
}
