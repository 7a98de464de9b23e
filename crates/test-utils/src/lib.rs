//! Shared helpers for taskdag's integration tests.

pub mod recording;

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialise tracing once for a test binary. Level comes from
/// `TASKDAG_LOG`, defaulting to warn so test output stays quiet.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var("TASKDAG_LOG").unwrap_or_else(|_| "warn".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
