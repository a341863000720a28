//! Errors raised when building domain values from outside input.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A room code, name or other value broke its invariant.
    #[error("Invalid value: {0}")]
    Invalid(String),

    /// A wire token (role, audio category) that names nothing we know.
    #[error("Unrecognized value: {0}")]
    Unrecognized(String),
}

impl DomainError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn unrecognized(msg: impl Into<String>) -> Self {
        Self::Unrecognized(msg.into())
    }
}
