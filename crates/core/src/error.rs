//! Shared error model.

use thiserror::Error;

/// Result type used by the core primitives.
pub type CoreResult<T> = Result<T, CoreError>;

/// Error raised when a core primitive cannot be constructed.
///
/// Decision functions never surface these; they only appear at parsing
/// boundaries (identifiers, role values).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A JSON value cannot be used as a role identifier.
    #[error("invalid role: {0}")]
    InvalidRole(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_role(msg: impl Into<String>) -> Self {
        Self::InvalidRole(msg.into())
    }
}
