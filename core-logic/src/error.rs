//! # Core Error Types
//!
//! Centralized error definitions for the core-logic crate.
//! All errors implement `std::error::Error` and `std::fmt::Display`.

use thiserror::Error;

/// Unified error type for core-logic operations.
///
/// Wraps the specific error enums so the application layer can match on
/// one type when it needs to distinguish fatal setup problems from
/// runtime failures.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(ConfigError),

    #[error(transparent)]
    Input(InputError),

    #[error("Journal error: {0}")]
    Journal(JournalError),

    #[error(transparent)]
    Network(NetworkError),
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::Config(e)
    }
}

impl From<InputError> for CoreError {
    fn from(e: InputError) -> Self {
        CoreError::Input(e)
    }
}

impl From<JournalError> for CoreError {
    fn from(e: JournalError) -> Self {
        CoreError::Journal(e)
    }
}

impl From<NetworkError> for CoreError {
    fn from(e: NetworkError) -> Self {
        CoreError::Network(e)
    }
}

/// Configuration-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required configuration field: '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid range: min {min} is greater than max {max}")]
    InvalidRange { min: String, max: String },

    #[error("Unknown chain '{name}' in '{field}'")]
    UnknownChain { field: String, name: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },
}

/// Errors in the line-delimited input lists (credentials, proxies, deposit addresses)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Invalid private key on line {line}: expected 64 hex chars")]
    InvalidKeyFormat { line: usize },

    #[error("Invalid proxy on line {line}: '{value}' (expected user:pass@host:port)")]
    InvalidProxy { line: usize, value: String },

    #[error("Proxy count ({proxies}) exceeds private key count ({keys})")]
    TooManyProxies { proxies: usize, keys: usize },

    #[error("No private keys found in {path}")]
    NoCredentials { path: String },
}

/// Action journal errors
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Connection pool exhausted (max: {max_size})")]
    PoolExhausted { max_size: u32 },

    #[error("Failed to open journal at {path}: {msg}")]
    OpenFailed { path: String, msg: String },

    #[error("Query failed: {msg}")]
    QueryFailed { msg: String },
}

/// Network and HTTP-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("Request timeout after {timeout_ms}ms to {endpoint}")]
    Timeout { timeout_ms: u64, endpoint: String },

    #[error("HTTP error {status_code} from {endpoint}")]
    HttpError { status_code: u16, endpoint: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_display() {
        let err = InputError::TooManyProxies {
            proxies: 4,
            keys: 3,
        };
        assert_eq!(
            err.to_string(),
            "Proxy count (4) exceeds private key count (3)"
        );
    }

    #[test]
    fn test_core_error_wraps_config() {
        let err: CoreError = ConfigError::MissingField {
            field: "rpc.base".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(err.to_string().contains("rpc.base"));
    }
}
