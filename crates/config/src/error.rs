//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The layered configuration could not be read or did not match the
    /// expected shape (bad syntax, wrong types, missing keys).
    #[display("failed to load configuration")]
    Load,
    /// A required option is present but empty.
    #[display("missing required option: {_0}")]
    Missing(#[error(not(source))] &'static str),
    /// No remote with this name is configured.
    #[display("unknown remote: {_0}")]
    UnknownRemote(#[error(not(source))] String),
    /// An encoding ruleset named a rule that does not exist.
    #[display("invalid encoding rule: {_0}")]
    InvalidEncoding(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed. Configuration errors
    /// need a fix from the user first.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
