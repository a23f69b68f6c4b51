//! Error types and result types for adapter operations.
//!
//! Each layer signals its own error kind:
//!
//! - [`MarshalError`] - a value could not be converted between the dynamic and native models
//! - [`IdentityError`] - identifier text could not be parsed
//! - [`CursorStateError`] - a cursor modifier was applied after iteration began
//! - [`DriverError`] - anything the underlying driver reported, passed through verbatim
//!
//! [`LayerError`] unifies them, and [`LayerResult<T>`] is the return type of the public
//! handle and cursor operations.

use std::error::Error as StdError;
use thiserror::Error;

use crate::{cursor::CursorStatus, value::ValueKind};

/// Errors raised while converting between [`DynamicValue`](crate::value::DynamicValue) and BSON.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarshalError {
    /// The value tree nests deeper than the configured limit.
    #[error("Value nesting exceeds the maximum depth of {limit}")]
    DepthExceeded {
        /// The configured maximum depth.
        limit: usize,
    },
    /// A mapping key cannot be stored as a document key.
    #[error("Invalid document key: {0:?}")]
    InvalidKey(String),
    /// The native regular expression type rejected the pattern.
    #[error("Invalid regular expression: {0}")]
    InvalidRegex(String),
    /// A regular expression flag outside the known flag set.
    #[error("Invalid regular expression flag: {0:?}")]
    InvalidRegexFlag(char),
    /// A document was required but a value of another kind was supplied.
    #[error("Expected an object, found {0}")]
    NotADocument(ValueKind),
    /// An identifier could not be resolved.
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// A specialized `Result` type for marshalling.
pub type MarshalResult<T> = Result<T, MarshalError>;

/// Malformed identifier text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The text is not 24 characters long.
    #[error("Identifier {text:?} must be 24 hex characters, found {len}")]
    InvalidLength {
        /// The rejected text.
        text: String,
        /// Its length in characters.
        len: usize,
    },
    /// The text contains a non-hex character.
    #[error("Identifier {text:?} contains a non-hex character")]
    InvalidHex {
        /// The rejected text.
        text: String,
    },
}

/// A cursor modifier was invoked once the cursor had already started iterating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot apply {modifier} to a cursor that is {status}")]
pub struct CursorStateError {
    /// Name of the rejected modifier.
    pub modifier: &'static str,
    /// State of the cursor at the time of the call.
    pub status: CursorStatus,
}

/// An opaque failure reported by the underlying document store driver.
///
/// The adapter never interprets, retries or translates these errors. The original
/// driver error is kept as the [`source`](StdError::source).
#[derive(Error, Debug)]
#[error("Driver error: {message}")]
pub struct DriverError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl DriverError {
    /// Creates a driver error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    /// Wraps an error produced by a driver.
    pub fn from_source<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the driver's message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A specialized `Result` type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// Represents every error the adapter can surface to a caller.
#[derive(Error, Debug)]
pub enum LayerError {
    /// Conversion between dynamic and native values failed.
    #[error("Marshal error: {0}")]
    Marshal(#[from] MarshalError),
    /// Identifier text could not be parsed.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
    /// A cursor was misused.
    #[error("Cursor state error: {0}")]
    CursorState(#[from] CursorStateError),
    /// The underlying driver failed.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// A specialized `Result` type for adapter operations.
pub type LayerResult<T> = Result<T, LayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = DriverError::from_source(io);

        assert_eq!(err.message(), "reset by peer");
        assert!(err.source().is_some());
    }

    #[test]
    fn layer_error_wraps_each_kind() {
        let err: LayerError = IdentityError::InvalidHex { text: "zz".into() }.into();
        assert!(matches!(err, LayerError::Identity(_)));

        let err: LayerError = DriverError::new("boom").into();
        assert_eq!(err.to_string(), "Driver error: boom");
    }
}
