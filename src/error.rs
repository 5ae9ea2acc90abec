//! Error types for lobstore
//!
//! Provides a unified error type for all operations.
//!
//! The variants follow the store's failure categories:
//! - format errors abort opening a store
//! - invariant violations signal a caller bug or on-disk corruption and are
//!   never recovered from inside the store
//! - storage I/O errors come from the block store unchanged
//! - content errors flag corrupted page payloads

use thiserror::Error;

/// Result type alias using LobError
pub type Result<T> = std::result::Result<T, LobError>;

/// Unified error type for lobstore operations
#[derive(Debug, Error)]
pub enum LobError {
    // -------------------------------------------------------------------------
    // Storage I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Format error: {0}")]
    Format(String),

    // -------------------------------------------------------------------------
    // Invariant Violations
    // -------------------------------------------------------------------------
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // -------------------------------------------------------------------------
    // Content Errors
    // -------------------------------------------------------------------------
    #[error("Content corruption: {0}")]
    Content(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LobError {
    /// True for contract violations (bad status, misaligned offsets, ...)
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, LobError::InvariantViolation(_))
    }

    /// True for errors raised by the underlying block store
    pub fn is_storage_io(&self) -> bool {
        matches!(self, LobError::Io(_) | LobError::Storage(_))
    }

    /// Build an invariant violation and log it; these are always bugs
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(violation = %msg, "store invariant violated");
        LobError::InvariantViolation(msg)
    }
}

impl From<bincode::Error> for LobError {
    fn from(e: bincode::Error) -> Self {
        LobError::Serialization(e.to_string())
    }
}

impl From<LobError> for std::io::Error {
    fn from(e: LobError) -> Self {
        use std::io::ErrorKind;
        match e {
            LobError::Io(inner) => inner,
            corrupt @ (LobError::Content(_) | LobError::Format(_)) => {
                std::io::Error::new(ErrorKind::InvalidData, corrupt)
            }
            other => std::io::Error::new(ErrorKind::Other, other),
        }
    }
}
