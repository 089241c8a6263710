//! Errors raised while parsing shared types.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors from parsing identifiers and class names.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// An unknown tier or priority name was provided.
    #[error("unknown class name: {0}")]
    UnknownClass(String),
}
