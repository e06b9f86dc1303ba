//! Core traits for sslsearch pipeline stages

use async_trait::async_trait;

use crate::error::ScanError;
use crate::types::{EnrichmentRecord, MatchResult, ScanTarget};

/// Probe one target and decide whether its certificate is a finding.
#[async_trait]
pub trait Prober: Send + Sync {
    /// `region` is the label of the block the target came from, if any.
    async fn probe(&self, target: &ScanTarget, region: Option<&str>)
        -> Result<MatchResult, ScanError>;

    /// Prober name/identifier
    fn name(&self) -> &str;
}

/// Best-effort enrichment of a finding. Implementations write only their own
/// field of the record and never fail the finding.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, result: &MatchResult, record: &mut EnrichmentRecord);

    /// Stage name used in logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CertificateInfo;
    use std::net::{IpAddr, Ipv4Addr};

    struct EchoProber;

    #[async_trait]
    impl Prober for EchoProber {
        async fn probe(
            &self,
            target: &ScanTarget,
            region: Option<&str>,
        ) -> Result<MatchResult, ScanError> {
            Ok(MatchResult::new(
                *target,
                CertificateInfo::default(),
                String::new(),
                region.unwrap_or_default().to_string(),
            ))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct Tagger;

    #[async_trait]
    impl Enricher for Tagger {
        async fn enrich(&self, _result: &MatchResult, record: &mut EnrichmentRecord) {
            record.server_header = Some("tagged".into());
        }

        fn name(&self) -> &str {
            "tagger"
        }
    }

    #[tokio::test]
    async fn prober_and_enricher_objects() {
        let prober: Box<dyn Prober> = Box::new(EchoProber);
        let target = ScanTarget::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 443);
        let result = prober.probe(&target, Some("eu-west-1")).await.unwrap();
        assert_eq!(result.matched_region, "eu-west-1");

        let enricher: Box<dyn Enricher> = Box::new(Tagger);
        let mut record = EnrichmentRecord::default();
        enricher.enrich(&result, &mut record).await;
        assert_eq!(record.server_header.as_deref(), Some("tagged"));
    }
}
