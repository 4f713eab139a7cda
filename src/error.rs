//! Error types for Talaria
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Talaria operations
///
/// This enum encompasses all possible errors that can occur during a
/// relay cycle, configuration loading, conversation storage, and the
/// web server lifecycle.
#[derive(Error, Debug)]
pub enum TalariaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No API credential configured; the relay refuses to start a cycle
    #[error("Missing API credential: {0}")]
    MissingCredential(String),

    /// Upstream returned a non-2xx status; carries the status code and a
    /// truncated response body. Never retried.
    #[error("Upstream error {status}: {body}")]
    Upstream {
        /// HTTP status code returned by the upstream API
        status: u16,
        /// Response body, truncated for display
        body: String,
    },

    /// Network read exceeded the configured deadline. Never retried.
    #[error("Upstream request timed out")]
    Timeout,

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Web server lifecycle errors
    #[error("Server error: {0}")]
    Server(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Talaria operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = TalariaError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_missing_credential_display() {
        let error = TalariaError::MissingCredential("set api.key or TALARIA_API_KEY".to_string());
        assert_eq!(
            error.to_string(),
            "Missing API credential: set api.key or TALARIA_API_KEY"
        );
    }

    #[test]
    fn test_upstream_error_display() {
        let error = TalariaError::Upstream {
            status: 429,
            body: "rate limited".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("429"));
        assert!(s.contains("rate limited"));
    }

    #[test]
    fn test_timeout_display() {
        let error = TalariaError::Timeout;
        assert_eq!(error.to_string(), "Upstream request timed out");
    }

    #[test]
    fn test_storage_error_display() {
        let error = TalariaError::Storage("database connection failed".to_string());
        assert_eq!(
            error.to_string(),
            "Storage error: database connection failed"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: TalariaError = io_error.into();
        assert!(matches!(error, TalariaError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_str = "{invalid json}";
        let json_error = serde_json::from_str::<serde_json::Value>(json_str).unwrap_err();
        let error: TalariaError = json_error.into();
        assert!(matches!(error, TalariaError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_str = "invalid: : yaml";
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let error: TalariaError = yaml_error.into();
        assert!(matches!(error, TalariaError::Yaml(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TalariaError>();
    }
}
