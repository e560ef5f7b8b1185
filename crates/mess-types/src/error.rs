//! Common error types

use thiserror::Error;

/// Errors raised while parsing domain values from their wire form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessTypeError {
    /// Unknown enum value
    #[error("invalid {kind}: {value}")]
    InvalidValue {
        /// Which type was being parsed
        kind: &'static str,
        /// The rejected input
        value: String,
    },

    /// Malformed identifier
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// Malformed scanned payload
    #[error("invalid QR payload: {0}")]
    InvalidPayload(String),
}

impl MessTypeError {
    pub(crate) fn invalid(kind: &'static str, value: &str) -> Self {
        Self::InvalidValue {
            kind,
            value: value.to_string(),
        }
    }
}
