//! # Trendo Common
//!
//! Error types and logging configuration shared by the TrendoAI offline worker crates.
//!
//! ## Features
//!
//! - Unified error type with backtrace support
//! - Logging configuration and setup
//! - Result extension traits

use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for the worker and its hosts.
#[derive(Error, Debug)]
pub enum TrendoError {
    /// Network-related errors.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Cache storage errors.
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Worker lifecycle errors.
    #[error("Lifecycle error: {message}")]
    Lifecycle {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Logging setup errors.
    #[error("Logging error: {0}")]
    Logging(String),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unexpected failure wrapped with context.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl TrendoError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    /// Create a lifecycle error with source.
    pub fn lifecycle_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Lifecycle {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the failure came from the network and the caller may fall back to cache.
    pub fn is_offline_recoverable(&self) -> bool {
        matches!(self, TrendoError::Network { .. } | TrendoError::Io(_))
    }

    /// Get the error category for logs.
    pub fn category(&self) -> &'static str {
        match self {
            TrendoError::Network { .. } => "network",
            TrendoError::Cache { .. } => "cache",
            TrendoError::Lifecycle { .. } => "lifecycle",
            TrendoError::Config { .. } => "config",
            TrendoError::Logging(_) => "logging",
            TrendoError::Io(_) => "io",
            TrendoError::Json(_) => "json",
            TrendoError::NotFound(_) => "not_found",
            TrendoError::InvalidArgument(_) => "invalid_argument",
            TrendoError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, TrendoError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| TrendoError::Internal {
            message: format!("{}: {}", message.into(), e),
            backtrace: Some(backtrace::Backtrace::new()),
        })
    }}

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| TrendoError::NotFound(resource.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(TrendoError::cache("test").category(), "cache");
        assert_eq!(TrendoError::network("test").category(), "network");
        assert_eq!(TrendoError::config("bad tag").category(), "config");
    }

    #[test]
    fn test_offline_recoverable() {
        assert!(TrendoError::network("dns").is_offline_recoverable());
        assert!(!TrendoError::cache("full").is_offline_recoverable());
        assert!(!TrendoError::NotFound("x".into()).is_offline_recoverable());
    }

    #[test]
    fn test_context_wraps_message() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk gone",
        ));
        let err = res.context("reading worker.json").unwrap_err();
        assert!(err.to_string().contains("reading worker.json: disk gone"));
        assert_eq!(err.category(), "internal");
    }

    #[test]
    fn test_option_ext() {
        let some: Option<i32> = Some(42);
        assert_eq!(some.ok_or_not_found("test").unwrap(), 42);

        let none: Option<i32> = None;
        assert!(matches!(
            none.ok_or_not_found("test"),
            Err(TrendoError::NotFound(_))
        ));
    }
}
