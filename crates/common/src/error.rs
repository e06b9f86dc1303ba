//! Error types for sslsearch
//!
//! Two families: `ScanError` is the closed set of per-target outcomes a worker
//! can branch on, `SslSearchError` covers the fatal failures reported before
//! any scanning starts.

use std::io;
use thiserror::Error;

/// Per-target failure kinds. None of these abort the overall scan.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanError {
    #[error("could not connect to remote host")]
    Connection,

    #[error("could not find TLS on remote port")]
    NoTls,

    #[error("certificate details did not match requirement")]
    NoMatch,

    #[error("parent context cancelled")]
    Cancelled,

    #[error("error calculating JARM fingerprint")]
    JarmNotCalculated,
}

impl ScanError {
    /// Whether the error is accounted as a failure in the stats registry.
    /// `NoMatch` is a normal outcome and `Cancelled` is shutdown.
    #[inline]
    #[must_use]
    pub const fn is_counted_failure(&self) -> bool {
        matches!(self, ScanError::Connection | ScanError::NoTls)
    }
}

#[derive(Error, Debug)]
pub enum SslSearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("Invalid pattern: {0}")]
    Pattern(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for fatal sslsearch operations
pub type SslSearchResult<T> = Result<T, SslSearchError>;
