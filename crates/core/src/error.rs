//! Shared error model for the primitives in this crate.

use thiserror::Error;

/// Result type for core primitives.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failure to construct a core primitive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A name used as a storage or schema identifier was malformed.
    #[error("invalid name: {0}")]
    InvalidName(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::InvalidName(msg.into())
    }
}

/// Check that `name` is a plain identifier: ASCII letter or `_` first, then
/// ASCII alphanumerics or `_`.
///
/// Table and column names flow from rule configuration into store queries, so
/// every executor validates them with this before use.
pub fn ensure_identifier(name: &str) -> CoreResult<()> {
    let mut chars = name.chars();
    let valid_head = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(CoreError::invalid_name(format!("'{name}' is not a plain identifier")))
    }
}
