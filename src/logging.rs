//! `tracing` subscriber setup for binaries and tests embedding the translator.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Failure installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive did not parse.
    #[error("invalid log level: {0}")]
    InvalidDirective(String),
    /// Another subscriber is already installed.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Installs a `fmt` subscriber filtered by `level` (e.g. `"graphql_cypher=debug"`).
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidDirective(e.to_string()))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
