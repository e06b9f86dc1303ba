//! Bounded-timeout TCP dialer

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::instrument;

/// Stateless connect helper; safe to share and reuse across targets.
#[derive(Debug, Clone)]
pub struct Dialer {
    timeout: Duration,
}

impl Dialer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a TCP connection, failing with `TimedOut` once the timeout elapses.
    #[instrument(level = "trace", skip(self))]
    pub async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let stream = timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timeout"))??;
        // handshake records are small; don't let Nagle hold them back
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl Default for Dialer {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
