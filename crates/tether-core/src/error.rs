#![forbid(unsafe_code)]

//! Error taxonomy for the tether primitives.
//!
//! No error here is fatal to the hosting application; every failure degrades
//! to a well-defined, inspectable state:
//!
//! - [`DecodeError`]: malformed persisted value. Recovered locally by falling
//!   back to a default (or retaining the prior value); never propagated.
//! - [`StoreError`]: store write or I/O failure. Surfaced as a non-fatal
//!   diagnostic; the in-memory value remains authoritative.
//! - [`FetchError`]: fetch rejection. Surfaced as a terminal `Failure` state,
//!   recoverable via refetch.

use thiserror::Error;

/// A persisted value could not be decoded back into its in-memory type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode persisted value: {reason}")]
pub struct DecodeError {
    reason: String,
}

impl DecodeError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// The external key/value store failed to persist or load a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store write failed for key `{key}`: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("store I/O error: {0}")]
    Io(String),

    #[error("store serialization failed: {0}")]
    Codec(String),
}

impl StoreError {
    #[must_use]
    pub fn write_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// An asynchronous fetch operation rejected.
///
/// Held inside the `Failure` request state, so it must stay cheaply
/// cloneable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed: {message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
