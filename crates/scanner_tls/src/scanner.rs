//! TLS probe: connect, handshake without verification, read the leaf
//! certificate and run it through the keyword/region filters.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_native_tls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::dialer::Dialer;
use crate::matcher::CertificateMatcher;
use crate::tls::{certificate_info, insecure_connector};
use sslsearch_common::{
    CertificateInfo, MatchResult, Pool, Prober, ScanError, ScanStats, ScanTarget,
    SslSearchResult,
};

/// Probe engine shared by every scan worker.
pub struct TlsProber {
    dialers: Pool<Dialer>,
    connectors: Pool<TlsConnector>,
    matcher: CertificateMatcher,
    stats: Arc<ScanStats>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl TlsProber {
    /// `pool_size` bounds how many idle dialers/connectors are kept around;
    /// it should match the scan worker count.
    pub fn new(
        timeout: Duration,
        pool_size: usize,
        matcher: CertificateMatcher,
        stats: Arc<ScanStats>,
        cancel: CancellationToken,
    ) -> SslSearchResult<Self> {
        let prototype = insecure_connector()?;
        Ok(Self {
            dialers: Pool::new(pool_size, move || Dialer::new(timeout)),
            connectors: Pool::new(pool_size, move || prototype.clone()),
            matcher,
            stats,
            cancel,
            timeout,
        })
    }

    /// Connect and handshake, returning the presented leaf certificate.
    #[instrument(level = "trace", skip_all, fields(target = %target))]
    async fn fetch_certificate(&self, target: &ScanTarget) -> Result<CertificateInfo, ScanError> {
        let stream = {
            let dialer = self.dialers.acquire();
            dialer.connect(target.socket_addr()).await.map_err(|e| {
                trace!("connect failed: {}", e);
                ScanError::Connection
            })?
        };

        let connector = self.connectors.acquire();
        let domain = target.ip.to_string();
        let tls = match timeout(self.timeout, connector.connect(&domain, stream)).await {
            Ok(Ok(tls)) => tls,
            Ok(Err(e)) => {
                trace!("handshake failed: {}", e);
                return Err(ScanError::NoTls);
            }
            Err(_) => {
                trace!("handshake timed out");
                return Err(ScanError::NoTls);
            }
        };

        let der = tls
            .get_ref()
            .peer_certificate()
            .ok()
            .flatten()
            .and_then(|cert| cert.to_der().ok())
            .ok_or(ScanError::NoTls)?;

        certificate_info(&der).map_err(|e| {
            debug!("unparseable certificate from {}: {}", target, e);
            ScanError::NoTls
        })
    }

    async fn inspect(
        &self,
        target: &ScanTarget,
        region: Option<&str>,
    ) -> Result<MatchResult, ScanError> {
        let certificate = self.fetch_certificate(target).await?;
        let (keyword, matched_region) = self.matcher.evaluate(&certificate, region)?;
        Ok(MatchResult::new(
            *target,
            certificate,
            keyword,
            matched_region,
        ))
    }
}

#[async_trait]
impl Prober for TlsProber {
    async fn probe(
        &self,
        target: &ScanTarget,
        region: Option<&str>,
    ) -> Result<MatchResult, ScanError> {
        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScanError::Cancelled),
            r = self.inspect(target, region) => r,
        };

        match &outcome {
            Ok(m) => {
                debug!(
                    "match {} keyword={:?} region={:?}",
                    target, m.matched_keyword, m.matched_region
                );
                self.stats.finding();
            }
            Err(e) => self.stats.record_error(*e),
        }
        outcome
    }

    fn name(&self) -> &str {
        "tls"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_native_tls::TlsAcceptor;

    const SANS: [&str; 2] = ["shop.example.com", "api.eu-west-1.example.net"];

    /// Loopback TLS server presenting a fresh self-signed certificate.
    async fn tls_server() -> SocketAddr {
        let mut params =
            rcgen::CertificateParams::new(SANS.iter().map(|s| s.to_string()).collect::<Vec<_>>())
                .unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "shop.example.com");
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        let identity = native_tls::Identity::from_pkcs8(
            cert.pem().as_bytes(),
            key.serialize_pem().as_bytes(),
        )
        .unwrap();
        let acceptor = TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Ok(mut tls) = acceptor.accept(sock).await {
                        let mut buf = [0u8; 1];
                        let _ = tls.read(&mut buf).await;
                    }
                });
            }
        });
        addr
    }

    fn matching(
        keyword: &str,
        region: &str,
        stats: Arc<ScanStats>,
    ) -> TlsProber {
        let matcher = CertificateMatcher::new(keyword, region).unwrap();
        TlsProber::new(Duration::from_secs(5), 2, matcher, stats, CancellationToken::new())
            .unwrap()
    }

    fn prober(stats: Arc<ScanStats>, cancel: CancellationToken) -> TlsProber {
        let matcher = CertificateMatcher::new(".*", ".*").unwrap();
        TlsProber::new(Duration::from_secs(2), 4, matcher, stats, cancel).unwrap()
    }

    fn target(addr: std::net::SocketAddr) -> ScanTarget {
        ScanTarget::new(addr.ip(), addr.port())
    }

    #[tokio::test]
    async fn refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let stats = Arc::new(ScanStats::new());
        let p = prober(stats.clone(), CancellationToken::new());
        assert_eq!(p.probe(&target(addr), None).await, Err(ScanError::Connection));
        assert_eq!(stats.snapshot().connection_errors, 1);
        assert_eq!(stats.snapshot().findings, 0);
    }

    #[tokio::test]
    async fn plaintext_service_is_no_tls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let _ = sock
                    .write_all(b"HTTP/1.0 400 Bad Request\r\n\r\n")
                    .await;
            }
        });

        let stats = Arc::new(ScanStats::new());
        let p = prober(stats.clone(), CancellationToken::new());
        assert_eq!(p.probe(&target(addr), None).await, Err(ScanError::NoTls));
        assert_eq!(stats.snapshot().tls_errors, 1);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = Arc::new(ScanStats::new());
        let p = prober(stats.clone(), cancel);
        let t = ScanTarget::new("127.0.0.1".parse().unwrap(), 1);
        assert_eq!(p.probe(&t, None).await, Err(ScanError::Cancelled));
        // shutdown is not an error
        assert_eq!(stats.snapshot(), Default::default());
    }

    #[tokio::test]
    async fn cancel_interrupts_stalled_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // accept and never answer the ClientHello
            if let Ok((sock, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(sock);
            }
        });

        let cancel = CancellationToken::new();
        let p = prober(Arc::new(ScanStats::new()), cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert_eq!(p.probe(&target(addr), None).await, Err(ScanError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn pooled_objects_are_reused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let p = prober(Arc::new(ScanStats::new()), CancellationToken::new());
        for _ in 0..3 {
            let _ = p.probe(&target(addr), None).await;
        }
        assert_eq!(p.dialers.created(), 1);
        assert_eq!(p.dialers.idle(), 1);
    }

    #[tokio::test]
    async fn matching_certificate_is_a_finding() {
        let addr = tls_server().await;
        let stats = Arc::new(ScanStats::new());
        let p = matching("example", "^us-", stats.clone());

        let m = p.probe(&target(addr), Some("us-east-1")).await.unwrap();
        assert_eq!(m.target, target(addr));
        assert_eq!(m.certificate.subject, "CN=shop.example.com");
        assert_eq!(m.certificate.sans, SANS);
        assert_eq!(m.matched_keyword, "example");
        assert_eq!(m.matched_region, "us-");
        assert_eq!(stats.snapshot().findings, 1);
        assert_eq!(stats.snapshot().no_matches, 0);
    }

    #[tokio::test]
    async fn keyword_without_region_is_no_match() {
        let addr = tls_server().await;
        let stats = Arc::new(ScanStats::new());
        let p = matching("example", "^ap-", stats.clone());

        assert_eq!(
            p.probe(&target(addr), Some("us-east-1")).await,
            Err(ScanError::NoMatch)
        );
        let snap = stats.snapshot();
        assert_eq!(snap.findings, 0);
        assert_eq!(snap.no_matches, 1);
    }

    #[tokio::test]
    async fn region_read_from_certificate_when_unlabelled() {
        let addr = tls_server().await;
        let p = matching(r"shop\.", r"eu-west-\d", Arc::new(ScanStats::new()));

        let m = p.probe(&target(addr), None).await.unwrap();
        assert_eq!(m.matched_keyword, "shop.");
        assert_eq!(m.matched_region, "eu-west-1");
    }
}
