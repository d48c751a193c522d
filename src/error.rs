//! Error types for the session and cache engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the session and cache engine
#[derive(Error, Debug)]
pub enum Error {
    /// The backing ordered store rejected or failed an operation
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The upstream row source failed to produce a snapshot
    #[error("upstream fetch failed for row {row_id}: {reason}")]
    UpstreamFetch { row_id: String, reason: String },

    /// A page request could not be parsed into a cacheable form
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error came from the backing store rather than the
    /// engine itself. Background workers treat these as transient.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

// =============================================================================
// Tests
// =============================================================================
