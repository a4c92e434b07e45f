//! Error types for modidx.

use thiserror::Error;

/// Main error type for modidx.
#[derive(Error, Debug)]
pub enum ModidxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Parse pool failed to start: {0}")]
    PoolStart(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for modidx operations.
pub type Result<T> = std::result::Result<T, ModidxError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_worker_error_message() {
        let err = ModidxError::Worker("handshake timed out".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Worker error"));
        assert!(msg.contains("handshake timed out"));
    }

    #[test]
    fn test_pool_start_error_message() {
        let err = ModidxError::PoolStart("no workers could be started".to_string());
        assert!(err.to_string().contains("failed to start"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: ModidxError = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ bad json").unwrap_err();
        let err: ModidxError = json_err.into();
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn test_config_error_message() {
        let err = ModidxError::Config("MODIDX_WORKERS must be a number".to_string());
        assert!(err.to_string().contains("MODIDX_WORKERS"));
    }
}
