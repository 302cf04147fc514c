//! Error types for FerriteDB.

use thiserror::Error;

/// Result type alias using FerriteError.
pub type Result<T> = std::result::Result<T, FerriteError>;

/// Errors that can occur in FerriteDB operations.
#[derive(Debug, Error)]
pub enum FerriteError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: i32 },

    #[error("Page corrupted: {page_id}, reason: {reason}")]
    PageCorrupted { page_id: i32, reason: String },

    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    // Index errors
    #[error("Header page full, unable to register index")]
    HeaderPageFull,

    // Input errors
    #[error("Parse error: {0}")]
    ParseError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: FerriteError = io_err.into();
        assert!(matches!(err, FerriteError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_page_not_found_display() {
        let err = FerriteError::PageNotFound { page_id: 42 };
        assert_eq!(err.to_string(), "Page not found: 42");
    }

    #[test]
    fn test_page_corrupted_display() {
        let err = FerriteError::PageCorrupted {
            page_id: 100,
            reason: "bad page type".to_string(),
        };
        assert_eq!(err.to_string(), "Page corrupted: 100, reason: bad page type");
    }

    #[test]
    fn test_buffer_pool_full_display() {
        let err = FerriteError::BufferPoolFull;
        assert_eq!(err.to_string(), "Buffer pool full, unable to allocate frame");
    }

    #[test]
    fn test_header_page_full_display() {
        let err = FerriteError::HeaderPageFull;
        assert_eq!(
            err.to_string(),
            "Header page full, unable to register index"
        );
    }

    #[test]
    fn test_parse_error_display() {
        let err = FerriteError::ParseError("not a number: abc".to_string());
        assert_eq!(err.to_string(), "Parse error: not a number: abc");
    }

    #[test]
    fn test_config_error_display() {
        let err = FerriteError::ConfigError("index name too long".to_string());
        assert_eq!(err.to_string(), "Configuration error: index name too long");
    }

    #[test]
    fn test_internal_error_display() {
        let err = FerriteError::Internal("assertion failed".to_string());
        assert_eq!(err.to_string(), "Internal error: assertion failed");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(FerriteError::Internal("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FerriteError>();
    }
}
