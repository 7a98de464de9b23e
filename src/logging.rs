// src/logging.rs

//! Logging setup for `taskdag` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. explicit level passed by the embedding application (if provided)
//! 2. `TASKDAG_LOG` environment variable (e.g. "info", "taskdag=debug")
//! 3. default to `info`

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup; calling it again returns an error instead
/// of panicking, so embedding applications that already installed a
/// subscriber keep theirs.
pub fn init_logging(level: Option<tracing::Level>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_env("TASKDAG_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))?;

    Ok(())
}
