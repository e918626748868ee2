//! Error types and handling for pagesync-core operations.
//!
//! Every fallible operation in the crate returns [`Result<T, Error>`]. Errors
//! carry enough structure for two decisions made elsewhere:
//!
//! - **Retry**: [`Error::is_recoverable`] is the classifier the download and
//!   source layers hand to [`RetryPolicy`](crate::retry::RetryPolicy).
//! - **Run outcome**: [`Error::class`] places an error in the sync taxonomy so
//!   the orchestrator knows whether to degrade or abort.
//!
//! ## Error Classes
//!
//! - **Transient**: network, timeout, rate limit. Retried, then degraded.
//! - **Degraded**: a single asset or page could not be produced.
//! - **Fatal-Local**: cache flush, output directory, configuration.
//! - **Fatal-Remote**: authentication or unreachable content source.
//!
//! ```rust
//! use pagesync_core::{Error, ErrorClass};
//!
//! let err = Error::Timeout("asset fetch".to_string());
//! assert!(err.is_recoverable());
//! assert_eq!(err.class(), ErrorClass::Transient);
//!
//! let err = Error::Config("retry.max_attempts must be at least 1".to_string());
//! assert!(!err.is_recoverable());
//! assert_eq!(err.class(), ErrorClass::FatalLocal);
//! ```

use std::time::Duration;

use thiserror::Error;

/// The main error type for pagesync-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Timeouts and interruptions are retryable; everything else (permission
    /// denied, disk full) is treated as permanent.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level HTTP failure (connect, TLS, body read).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error("Remote error ({status}): {message}")]
    Remote {
        /// HTTP status code returned by the remote.
        status: u16,
        /// Message extracted from the response body, if any.
        message: String,
    },

    /// The content source rejected our credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote asked us to slow down.
    #[error("Rate limited{}", retry_after_suffix(.retry_after))]
    RateLimited {
        /// Server-provided `Retry-After` hint.
        retry_after: Option<Duration>,
    },

    /// Operation exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Remote payload did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Cache store or output tree could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The run was interrupted before the operation could start.
    #[error("Cancelled")]
    Cancelled,

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

/// Position of an error in the sync failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network hiccup, timeout or rate limit; worth retrying.
    Transient,
    /// A single sub-operation failed permanently; the run continues.
    Degraded,
    /// Local state cannot be trusted or persisted; the run aborts.
    FatalLocal,
    /// The content source is unusable; the run aborts before processing.
    FatalRemote,
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Network timeouts, connection failures, rate limits and 5xx responses
    /// are recoverable. Malformed payloads, client errors and permission
    /// problems are not: retrying them only burns the attempt budget.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Remote { status, .. } => *status >= 500 || *status == 408,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    /// Classify the error for run-level handling.
    ///
    /// Callers that own a degradable sub-operation (one asset, one page)
    /// downgrade anything non-fatal to [`ErrorClass::Degraded`] themselves;
    /// this method only reports what the error looks like in isolation.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        if self.is_recoverable() {
            return ErrorClass::Transient;
        }
        match self {
            Self::Unauthorized(_) => ErrorClass::FatalRemote,
            Self::Io(_) | Self::Storage(_) | Self::Config(_) | Self::Serialization(_) => {
                ErrorClass::FatalLocal
            },
            _ => ErrorClass::Degraded,
        }
    }

    /// Get the error category as a string identifier for structured logs.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Remote { .. } => "remote",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout(_) => "timeout",
            Self::Parse(_) => "parse",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Cancelled => "cancelled",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
