//! Tracing subscriber setup.
//!
//! Log context (connection id, user id, subject) is carried on spans; every
//! component in the routing layer logs through `tracing` and nothing else.

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at startup (or from test harness setup). Subsequent calls are
/// no-ops. `RUST_LOG` takes precedence over the `level` argument.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init is a no-op if a subscriber is already installed
    let _ = subscriber.try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
