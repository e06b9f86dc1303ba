//! HTTP `Server` header grab over HTTPS

use async_trait::async_trait;
use reqwest::header::{HeaderMap, SERVER};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use sslsearch_common::{
    Enricher, EnrichmentRecord, MatchResult, Pool, ScanTarget, SslSearchError, SslSearchResult,
};

/// Issues one `GET https://ip:port/` per finding; the body is never read.
pub struct ServerHeaderGrabber {
    clients: Pool<Client>,
    cancel: CancellationToken,
}

impl ServerHeaderGrabber {
    pub fn new(
        timeout: Duration,
        pool_size: usize,
        cancel: CancellationToken,
    ) -> SslSearchResult<Self> {
        let prototype = Client::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| SslSearchError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            clients: Pool::new(pool_size, move || prototype.clone()),
            cancel,
        })
    }

    pub async fn grab(&self, target: &ScanTarget) -> Option<String> {
        let client = self.clients.acquire();
        let url = format!("https://{}/", target.socket_addr());
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            r = client.get(&url).send() => r,
        };
        match response {
            Ok(resp) => server_header_from(resp.headers()),
            Err(e) => {
                trace!("header grab from {} failed: {}", url, e);
                None
            }
        }
    }
}

/// Trimmed `Server` value; blank counts as absent.
pub fn server_header_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SERVER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Enricher for ServerHeaderGrabber {
    async fn enrich(&self, result: &MatchResult, record: &mut EnrichmentRecord) {
        record.server_header = self.grab(&result.target).await;
    }

    fn name(&self) -> &str {
        "server-header"
    }
}
