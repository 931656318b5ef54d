//! Unified error types for the proxtrace core library.
//!
//! This module provides a unified error type [`TraceError`] that covers the
//! failure modes that can cross the coordinator boundary. Each module also has
//! its own specific error type (`ConfigError`, `SettingsError`, `RadioError`)
//! for internal use.
//!
//! Most radio trouble is not an error here. Missing hardware, a powered-off
//! adapter or a missing identity leave the coordinator stopped and are
//! observed through its status instead.
//!
//! # Example
//!
//! ```rust
//! use proxtrace_core::error::{TraceError, Result};
//! use uuid::Uuid;
//!
//! fn service_id(id: Option<Uuid>) -> Result<Uuid> {
//!     id.ok_or(TraceError::NotInitialized)
//! }
//! assert!(service_id(None).is_err());
//! ```

use thiserror::Error;

/// The unified error type for all proxtrace operations.
#[derive(Debug, Error)]
pub enum TraceError {
    /// An identity-dependent operation ran before a secret was configured.
    #[error("No identity configured. Set a unique secret before starting a trace.")]
    NotInitialized,

    /// An error occurred while persisting or reading settings.
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

/// A specialized [`Result`] type for proxtrace operations.
pub type Result<T> = std::result::Result<T, TraceError>;

impl TraceError {
    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
        }
    }
}

impl From<crate::settings::SettingsError> for TraceError {
    fn from(err: crate::settings::SettingsError) -> Self {
        use crate::settings::SettingsError;
        match err {
            SettingsError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {}", path.display(), source))
            }
            SettingsError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            SettingsError::ParseError { path, source } => {
                Self::PersistenceError(format!("Failed to parse {}: {}", path.display(), source))
            }
            SettingsError::SerializeError(e) => Self::PersistenceError(e.to_string()),
            SettingsError::CreateDirError { path, source } => Self::PersistenceError(format!(
                "Failed to create directory {}: {}",
                path.display(),
                source
            )),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
