//! Error types for refscope queries.
//!
//! Only conditions that abort a query are errors. Everything that merely
//! shrinks a result set is handled as filtering and never reaches this type:
//!
//! - a moniker without package information
//! - a candidate filter rejecting an identifier
//! - an upload whose commit no longer exists
//! - a location that cannot be adjusted to the viewed commit
//! - a path the actor may not read
//!
//! Collaborator failures are constructed by the collaborator implementations
//! and propagated to the caller unchanged. Cancellation and timeouts are
//! separate variants so callers can tell "try again" apart from "the client
//! gave up".

use std::time::Duration;
use thiserror::Error;

/// Result type for refscope operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for refscope operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The index store failed to answer.
    #[error("index store error: {0}")]
    IndexStore(String),

    /// The catalog store failed to answer.
    #[error("catalog store error: {0}")]
    Catalog(String),

    /// The commit-existence oracle failed to answer.
    #[error("commit oracle error: {0}")]
    CommitOracle(String),

    /// The position adjuster failed to answer.
    #[error("position adjuster error: {0}")]
    Adjuster(String),

    /// The authorization checker failed to answer.
    #[error("authorization error: {0}")]
    Authorization(String),

    /// The caller cancelled the query.
    #[error("query cancelled")]
    Cancelled,

    /// The query exceeded its configured deadline.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the query was abandoned rather than failed.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_))
    }

    /// Returns `true` if an external collaborator reported the failure.
    #[must_use]
    pub fn is_collaborator_error(&self) -> bool {
        matches!(
            self,
            Self::IndexStore(_)
                | Self::Catalog(_)
                | Self::CommitOracle(_)
                | Self::Adjuster(_)
                | Self::Authorization(_)
        )
    }
}
