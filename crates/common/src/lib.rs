//! sslsearch common - shared types and traits
//!
//! This crate provides the data model, the error taxonomy, the stage traits,
//! the stats registry and the object pool used across the sslsearch
//! pipeline crates.

pub mod error;
pub mod pool;
pub mod stats;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{ScanError, SslSearchError, SslSearchResult};
pub use pool::{Pool, Pooled};
pub use stats::{ScanStats, StatsSnapshot};
pub use traits::{Enricher, Prober};
pub use types::{
    CertificateInfo, CidrBlock, EnrichmentRecord, Finding, FindingRecord, MatchResult,
    ScanOptions, ScanTarget, StageOptions, SubRange,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
