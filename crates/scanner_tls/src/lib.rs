//! TLS probe engine
//!
//! Dials a target, completes a non-verifying TLS handshake, extracts the leaf
//! certificate's subject and SANs and filters it by keyword and region.

pub mod dialer;
pub mod matcher;
pub mod scanner;
pub mod tls;

pub use dialer::Dialer;
pub use matcher::CertificateMatcher;
pub use scanner::TlsProber;
pub use tls::{certificate_info, insecure_connector};
