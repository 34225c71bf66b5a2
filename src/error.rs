//! Centralized error types for midsearch.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the midsearch library.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The server refused the credentials. Always fatal.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Connection-level failure (I/O, TLS, connection dropped).
    #[error("Network error: {0}")]
    Network(String),

    /// A mailbox could not be opened (nonexistent, no permission, ...).
    #[error("Cannot select mailbox '{mailbox}': {reason}")]
    MailboxSelection { mailbox: String, reason: String },

    /// The server answered NO/BAD to a SEARCH command.
    #[error("Search criteria rejected: {0}")]
    CriteriaRejected(String),

    /// Any other unexpected server response.
    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Neither inline ids nor an ids file produced a target.
    #[error("No Message-IDs provided")]
    NoTargets,

    /// The user interrupted the run.
    #[error("Operation cancelled by user")]
    Cancelled,
}

/// Convenience alias for `Result<T, SearchError>`.
pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the whole run.
    ///
    /// Selection failures, rejected criteria and protocol hiccups are scoped
    /// to a single mailbox or candidate and only produce warnings.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_)
                | Self::Network(_)
                | Self::Io { .. }
                | Self::Config(_)
                | Self::NoTargets
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `SearchError::io`).
impl From<std::io::Error> for SearchError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
