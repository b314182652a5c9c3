//! Store boundary error type.
//!
//! Every adapter decodes its backend failures into [`StoreError`] exactly
//! once, so callers branch on a closed set of outcomes instead of matching
//! backend-specific error codes.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Parameter not found: {name}")]
    NotFound { name: String },

    #[error("Access denied for '{name}': {message}")]
    AccessDenied { name: String, message: String },

    /// The value exists but the caller may not decrypt it.
    #[error("No access to decrypt '{name}'")]
    EncryptionContextDenied { name: String },

    #[error("Store transport failure: {0}")]
    Transport(String),
}

/// Coarse classification used by the engine to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    Denied,
    Other,
}

impl StoreError {
    pub fn not_found(name: impl Into<String>) -> Self {
        StoreError::NotFound { name: name.into() }
    }

    pub fn access_denied(name: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::AccessDenied {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::NotFound { .. } => StoreErrorKind::NotFound,
            StoreError::AccessDenied { .. } | StoreError::EncryptionContextDenied { .. } => {
                StoreErrorKind::Denied
            }
            StoreError::Transport(_) => StoreErrorKind::Other,
        }
    }

    /// Returns true if the error only affects a single record and the
    /// surrounding run may continue.
    pub fn is_record_scoped(&self) -> bool {
        !matches!(self.kind(), StoreErrorKind::Other)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
