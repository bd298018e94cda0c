//! Error taxonomy for the bridge.
//!
//! - Configuration errors (`InvalidIngestTarget`, `InvalidPattern`, `Config`) are fatal and
//! raised before any I/O against the store begins.
//! - `NoStreamsFound` is fatal for tail and list mode.
//! - Store and I/O errors are fatal, retries belong to the transport layer.
//! - Per-message formatting errors are never surfaced through `BridgeError`, see
//! [`FormatError`](crate::formatter::formatter::FormatError).

use std::io;

/// Errors raised by a [`LogStore`](crate::store::client::LogStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("unexpected reply from store: {0}")]
    Protocol(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that end a bridge run.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("No Streams found to monitor.")]
    NoStreamsFound,
    #[error("invalid ingestion target: {0}")]
    InvalidIngestTarget(String),
    #[error("invalid stream pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to read input: {0}")]
    Input(#[source] io::Error),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

impl BridgeError {
    /// Process exit status for this error.
    ///
    /// `2` for configuration errors, `1` for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            BridgeError::InvalidIngestTarget(_)
            | BridgeError::InvalidPattern { .. }
            | BridgeError::Config(_) => 2,
            BridgeError::NoStreamsFound
            | BridgeError::Store(_)
            | BridgeError::Input(_)
            | BridgeError::Output(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_configuration_errors_to_usage_status() {
        assert_eq!(BridgeError::InvalidIngestTarget("x".into()).exit_code(), 2);
        assert_eq!(BridgeError::Config("batch size".into()).exit_code(), 2);
        assert_eq!(BridgeError::NoStreamsFound.exit_code(), 1);
        assert_eq!(
            BridgeError::Store(StoreError::Unavailable("down".into())).exit_code(),
            1
        );
    }

    #[test]
    fn should_render_no_streams_message() {
        assert_eq!(
            BridgeError::NoStreamsFound.to_string(),
            "No Streams found to monitor."
        );
    }
}
