//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! The kinds are split so that callers can tell "does not exist" apart from
//! "exists but broken" apart from "ambiguous", which is what keeps
//! filesystem-level semantics (a missing directory versus an empty one) correct.

use crate::models::HashType;
use derive_more::{Display, Error};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No remote asset matched the path (after any allowed retries).
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// More than one remote asset matched a single path. This is a data
    /// integrity problem on the remote, never a transient one.
    #[display("duplicate objects found: {_0}")]
    AmbiguousMatch(#[error(not(source))] String),
    /// Folder-scoped operation against a folder the remote doesn't know.
    #[display("directory not found: {_0}")]
    DirectoryNotFound(#[error(not(source))] String),
    /// Zero-byte uploads are refused before any request is made.
    #[display("can't upload empty file: {_0}")]
    EmptyUploadRejected(#[error(not(source))] String),
    /// A plain (non-update) upload landed on an asset that already exists.
    #[display("object already exists: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// Only MD5 is available from the remote.
    #[display("hash type not supported: {_0}")]
    UnsupportedHash(#[error(not(source))] HashType),
    /// Ranged download never produced a response of the requested length.
    #[display("range verification failed after {attempts} attempts")]
    RangeVerificationFailed { attempts: u32 },
    /// Network or transport-level failure talking to the remote.
    #[display("transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// A structured error payload inside an otherwise successful response,
    /// or a request the remote refuses outright (such as a `404` from the
    /// delivery endpoint).
    #[display("remote error: {_0}")]
    Remote(#[error(not(source))] String),
    /// A paginated listing failed part way through.
    #[display("failed to list: {_0}")]
    ListFailed(#[error(not(source))] String),
    /// Path escapes the root, or names a file where none can exist.
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// The remote has no settable modification time.
    #[display("can't set modification time")]
    CantSetModTime,
    /// The filesystem's cancellation token fired between retry attempts.
    #[display("operation cancelled")]
    Cancelled,
    /// Remote options failed validation.
    #[display("invalid remote configuration")]
    Config,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` for the kinds that mean "nothing is there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::DirectoryNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::NotFound("a/b.txt".to_string()).to_string(), "object not found: a/b.txt");
        assert_eq!(ErrorKind::UnsupportedHash(HashType::Sha1).to_string(), "hash type not supported: sha1");
        assert_eq!(
            ErrorKind::RangeVerificationFailed { attempts: 7 }.to_string(),
            "range verification failed after 7 attempts"
        );
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Transport("reset".to_string()).is_retryable());
        assert!(!ErrorKind::Remote("bad request".to_string()).is_retryable());
        assert!(!ErrorKind::AmbiguousMatch("x".to_string()).is_retryable());
        assert!(!ErrorKind::NotFound("x".to_string()).is_retryable());
    }

    #[test]
    fn error_kind_not_found() {
        assert!(ErrorKind::NotFound("x".to_string()).is_not_found());
        assert!(ErrorKind::DirectoryNotFound("x".to_string()).is_not_found());
        assert!(!ErrorKind::AmbiguousMatch("x".to_string()).is_not_found());
    }

    #[test]
    fn error_from_result() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        let err: Result<()> = result.or_raise(|| ErrorKind::Transport("upload".to_string()));
        // Exn<E> implements Deref<Target = E>
        assert_eq!(*err.unwrap_err(), ErrorKind::Transport("upload".to_string()));
    }
}
