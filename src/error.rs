//! Unified error handling for the gridcast crate
//!
//! This module provides a unified error type that wraps the scheduler's domain
//! errors together with I/O, serialization and configuration failures.
//!
//! # Architecture
//!
//! - [`GridcastErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use gridcast::error::{Error, ErrorCategory, GridcastErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {}", err);
//!     } else {
//!         eprintln!("Fatal error ({:?}): {}", err.category(), err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::scheduler::error::{ErrorKind, SchedulerError};

/// Common trait for all gridcast error types
pub trait GridcastErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid plans, zones, grids or settings
    Config,
    /// Compilation outcomes reported to the caller (already compiled, gaps, cancellation)
    Scheduling,
    /// Concurrent edits of a frozen day
    Concurrency,
    /// Storage and I/O errors
    Storage,
    /// Parsing and serialization errors
    Parsing,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label for log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Scheduling => "scheduling",
            Self::Concurrency => "concurrency",
            Self::Storage => "storage",
            Self::Parsing => "parsing",
            Self::Other => "other",
        }
    }
}

impl GridcastErrorTrait for SchedulerError {
    fn is_recoverable(&self) -> bool {
        SchedulerError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self.kind() {
            ErrorKind::Configuration | ErrorKind::DstConflict => ErrorCategory::Config,
            ErrorKind::ResolutionGap
            | ErrorKind::EmptyPattern
            | ErrorKind::AlreadyCompiled
            | ErrorKind::Cancelled => ErrorCategory::Scheduling,
            ErrorKind::OverlapConflict | ErrorKind::Concurrency => ErrorCategory::Concurrency,
            ErrorKind::Storage => ErrorCategory::Storage,
        }
    }
}

/// Unified error type for the gridcast crate
#[derive(Error, Debug)]
pub enum Error {
    /// Scheduler domain errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl GridcastErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) | Self::Toml(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Scheduler(e) => GridcastErrorTrait::category(e),
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) | Self::Toml(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_error_category() {
        let grid: Error = SchedulerError::grid(15, "not a block start").into();
        assert_eq!(grid.category(), ErrorCategory::Config);

        let stale: Error = SchedulerError::VersionConflict {
            expected: 1,
            actual: 2,
        }
        .into();
        assert_eq!(stale.category(), ErrorCategory::Concurrency);

        let compiled: Error = SchedulerError::AlreadyCompiled {
            channel_id: "ch1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }
        .into();
        assert_eq!(compiled.category(), ErrorCategory::Scheduling);
    }

    #[test]
    fn test_is_recoverable() {
        let io_err: Error = io::Error::new(io::ErrorKind::Other, "disk busy").into();
        assert!(io_err.is_recoverable());

        let config_err = Error::config("horizon out of range");
        assert!(!config_err.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let unified: Error = SchedulerError::cancelled("deadline").into();
        assert!(matches!(unified, Error::Scheduler(_)));

        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let unified: Error = toml_err.into();
        assert_eq!(unified.category(), ErrorCategory::Parsing);
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.to_string(), "Something went wrong");
    }
}
