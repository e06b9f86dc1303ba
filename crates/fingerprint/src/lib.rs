//! Finding enrichment
//!
//! Two best-effort enrichers run after a certificate match:
//! - `ServerHeaderGrabber`: HTTPS `Server` response header
//! - `JarmFingerprinter`: JARM active TLS fingerprint

pub mod jarm;
pub mod server_header;

pub use jarm::{JarmFingerprinter, JarmTransport, TcpTransport};
pub use server_header::{server_header_from, ServerHeaderGrabber};
