//! JARM active TLS fingerprinting
//!
//! Ten crafted ClientHellos are sent on ten fresh connections; each first
//! reply is reduced to a short component string and the ten components are
//! hashed into a 62 character fingerprint. Any transport failure or
//! truncated ServerHello fails the whole attempt, which is then rerun from
//! the first probe.

pub mod parse;
pub mod probes;

pub use parse::{jarm_hash, read_server_hello, TruncatedHello, EMPTY_COMPONENT, FINGERPRINT_LEN};
pub use probes::{Probe, PROBES};

use async_trait::async_trait;
use sslsearch_common::{Enricher, EnrichmentRecord, MatchResult, ScanError};
use sslsearch_scanner_tls::Dialer;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Largest reply read per probe.
pub const MAX_REPLY: usize = 1484;

/// One request/response exchange per probe.
#[async_trait]
pub trait JarmTransport: Send + Sync {
    /// Send `hello` on a fresh connection and return the first chunk read back.
    async fn exchange(&self, addr: SocketAddr, hello: &[u8]) -> io::Result<Vec<u8>>;
}

/// Plain TCP transport with the scan timeout on every step.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    dialer: Dialer,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            dialer: Dialer::new(timeout),
        }
    }
}

fn timed_out(_: tokio::time::error::Elapsed) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "JARM exchange timed out")
}

#[async_trait]
impl JarmTransport for TcpTransport {
    async fn exchange(&self, addr: SocketAddr, hello: &[u8]) -> io::Result<Vec<u8>> {
        let mut stream = self.dialer.connect(addr).await?;
        let limit = self.dialer.timeout();
        timeout(limit, stream.write_all(hello))
            .await
            .map_err(timed_out)??;

        let mut buf = vec![0u8; MAX_REPLY];
        match timeout(limit, stream.read(&mut buf)).await.map_err(timed_out)? {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            // servers commonly hang up on hellos they dislike; that is an answer
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::UnexpectedEof
                ) =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Error, Debug)]
enum AttemptError {
    #[error("exchange failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Truncated(#[from] TruncatedHello),

    #[error("cancelled")]
    Cancelled,
}

pub struct JarmFingerprinter<T = TcpTransport> {
    transport: T,
    attempts: u32,
    cancel: CancellationToken,
}

impl JarmFingerprinter<TcpTransport> {
    pub fn new(timeout: Duration, retries: u32, cancel: CancellationToken) -> Self {
        Self::with_transport(TcpTransport::new(timeout), retries, cancel)
    }
}

impl<T: JarmTransport> JarmFingerprinter<T> {
    /// `retries` is the total number of attempts; zero still makes one.
    pub fn with_transport(transport: T, retries: u32, cancel: CancellationToken) -> Self {
        Self {
            transport,
            attempts: retries.max(1),
            cancel,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub async fn fingerprint(&self, addr: SocketAddr) -> Result<String, ScanError> {
        for attempt in 1..=self.attempts {
            if self.cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            match self.run_probes(addr).await {
                Ok(fp) => return Ok(fp),
                Err(AttemptError::Cancelled) => return Err(ScanError::Cancelled),
                Err(e) => debug!(attempt, "JARM attempt against {} failed: {}", addr, e),
            }
        }
        Err(ScanError::JarmNotCalculated)
    }

    async fn run_probes(&self, addr: SocketAddr) -> Result<String, AttemptError> {
        let host = addr.ip().to_string();
        let mut components = Vec::with_capacity(PROBES.len());
        for probe in &PROBES {
            let hello = probe.client_hello(&host);
            let reply = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
                r = self.transport.exchange(addr, &hello) => r?,
            };
            components.push(read_server_hello(&reply)?);
        }
        trace!("JARM components for {}: {}", addr, components.join(","));
        Ok(jarm_hash(&components))
    }
}

#[async_trait]
impl<T: JarmTransport> Enricher for JarmFingerprinter<T> {
    async fn enrich(&self, result: &MatchResult, record: &mut EnrichmentRecord) {
        match self.fingerprint(result.target.socket_addr()).await {
            Ok(fp) => record.jarm_fingerprint = Some(fp),
            Err(e) => debug!("{}: {}", result.target, e),
        }
    }

    fn name(&self) -> &str {
        "jarm"
    }
}
