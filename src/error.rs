//! Error types for media-dl
//!
//! Two layers of error handling exist in this crate:
//! - [`Error`] — internal fallible operations (configuration, I/O, outbound
//!   delivery)
//! - [`FetchError`] — the external fetch collaborator boundary; every way the
//!   opaque downloader can go wrong is converted into one of these variants
//!   before it reaches the executor, so a misbehaving fetcher can never crash
//!   a worker or leave the pool in an inconsistent state.
//!
//! Job-level failures (invalid input, timeout, size limit, fetch error) are
//! deliberately **not** represented here: they are expected outcomes and are
//! modeled as the [`FailureReason`](crate::types::FailureReason) tagged
//! outcome returned by `submit`, so callers make exhaustive decisions on all
//! terminal states instead of catching exceptions.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Outbound delivery to the chat transport failed
    #[error("delivery error: {0}")]
    Delivery(String),
}

/// Errors from the external fetch collaborator
///
/// The fetch call is opaque and untrusted; the executor wraps it so that any
/// of these surface as a `Fetch` failure reason rather than propagating.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The fetcher process could not be launched at all
    #[error("failed to launch fetcher: {0}")]
    Launch(String),

    /// The fetcher ran but reported failure
    #[error("fetch failed (exit code {code:?}): {detail}")]
    Failed {
        /// Process exit code, if the process exited normally
        code: Option<i32>,
        /// Captured diagnostic output (stderr tail or error message)
        detail: String,
    },

    /// The fetcher claimed success but produced no output file
    #[error("fetcher produced no artifact for template {template}")]
    NoArtifact {
        /// The output path template the fetcher was given
        template: PathBuf,
    },

    /// The fetch was cancelled before completing
    #[error("fetch cancelled")]
    Cancelled,
}
