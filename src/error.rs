//! Error types for search and retrieval operations.
//!
//! This module provides the [`EngineError`] type for every engine operation,
//! the [`ErrorKind`] discriminant stored in per-server outcomes, and the
//! [`Result`] convenience type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for all engine operations.
///
/// Per-server failures (connection, protocol, cancellation) are captured into
/// that server's outcome by the dispatcher and never abort sibling sessions.
/// Bounds and parse failures raised while navigating records are local to the
/// fetch that produced them.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A server-list entry is missing a required key or has a malformed value.
    #[error("Configuration error in entry {entry}: {message}")]
    Config {
        /// Entry index, plus the name when one could be read
        entry: String,
        /// What was wrong with the entry
        message: String,
    },

    /// The client process could not be started or the target refused the connection.
    #[error("Connection error for {server}: {message}")]
    Connection {
        /// Server name
        server: String,
        /// Underlying message
        message: String,
    },

    /// The client produced an unrecognized response or the server rejected the request.
    #[error("Protocol error for {server}: {message}")]
    Protocol {
        /// Server name
        server: String,
        /// Underlying message
        message: String,
    },

    /// A record index outside `1..=hits` was requested.
    #[error("Record index {index} out of range (hits: {hits})")]
    Bounds {
        /// Requested 1-based index
        index: usize,
        /// Last known hit count
        hits: usize,
    },

    /// Raw record text contained no recognizable field lines.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A record cannot be represented in ISO 2709.
    #[error("Export error: {0}")]
    Export(String),

    /// The search input was rejected before any session was opened.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The operation was aborted by the user.
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error from a file or the client process pipes.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a server list or configuration file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error category recorded in a [`ServerOutcome`](crate::aggregator::ServerOutcome).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad or missing server entry
    Config,
    /// Process spawn failure or target refusal
    Connection,
    /// Unrecognized or rejected response
    Protocol,
    /// Index out of range
    Bounds,
    /// Unparseable record text
    Parse,
    /// Record too large to export
    Export,
    /// Rejected search input
    InvalidQuery,
    /// Aborted by the user
    Cancelled,
    /// IO or JSON failure
    Io,
}

impl EngineError {
    /// The category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Config { .. } => ErrorKind::Config,
            EngineError::Connection { .. } => ErrorKind::Connection,
            EngineError::Protocol { .. } => ErrorKind::Protocol,
            EngineError::Bounds { .. } => ErrorKind::Bounds,
            EngineError::Parse(_) => ErrorKind::Parse,
            EngineError::Export(_) => ErrorKind::Export,
            EngineError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Io(_) | EngineError::Json(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn connection(server: &str, message: impl Into<String>) -> Self {
        EngineError::Connection {
            server: server.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn protocol(server: &str, message: impl Into<String>) -> Self {
        EngineError::Protocol {
            server: server.to_string(),
            message: message.into(),
        }
    }
}

/// Convenience type alias for [`std::result::Result`] with [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;
