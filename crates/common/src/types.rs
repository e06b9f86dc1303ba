//! Core data types for the sslsearch pipeline
//!
//! Targets and sub-ranges are cheap value types generated on demand by the
//! scheduler. Match results are immutable once built; enrichment is carried
//! next to them in a separate record so each stage owns exactly one field.

use chrono::{DateTime, Utc};
use ipnet::{IpAddrRange, IpNet, Ipv4AddrRange, Ipv6AddrRange};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{SslSearchError, SslSearchResult};

/// Single scan target (IP + port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanTarget {
    pub ip: IpAddr,
    pub port: u16,
}

impl ScanTarget {
    #[inline]
    #[must_use]
    pub const fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    #[inline]
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SocketAddr brackets IPv6 hosts
        write!(f, "{}", self.socket_addr())
    }
}

/// Input CIDR block with an optional cloud region label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrBlock {
    pub net: IpNet,
    pub region: Option<Arc<str>>,
}

impl CidrBlock {
    /// Build a block, normalising the base to the network address.
    #[must_use]
    pub fn new(net: IpNet) -> Self {
        Self {
            net: net.trunc(),
            region: None,
        }
    }

    #[must_use]
    pub fn with_region<S: AsRef<str>>(mut self, region: S) -> Self {
        let region = region.as_ref().trim();
        self.region = if region.is_empty() {
            None
        } else {
            Some(Arc::from(region))
        };
        self
    }

    /// Number of host bits (address width minus prefix length).
    #[inline]
    #[must_use]
    pub fn host_bits(&self) -> u8 {
        self.net.max_prefix_len() - self.net.prefix_len()
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{} ({})", self.net, region),
            None => write!(f, "{}", self.net),
        }
    }
}

/// A fixed-size slice of a `CidrBlock`, the unit handed to one scan worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubRange {
    pub net: IpNet,
    pub region: Option<Arc<str>>,
}

impl SubRange {
    /// Every address in the sub-range, network and broadcast included.
    #[must_use]
    pub fn addresses(&self) -> IpAddrRange {
        match self.net {
            IpNet::V4(n) => IpAddrRange::from(Ipv4AddrRange::new(n.network(), n.broadcast())),
            IpNet::V6(n) => IpAddrRange::from(Ipv6AddrRange::new(n.network(), n.broadcast())),
        }
    }

    /// Address count, saturating for a whole IPv6 space.
    #[must_use]
    pub fn address_count(&self) -> u128 {
        let bits = u32::from(self.net.max_prefix_len() - self.net.prefix_len());
        1u128.checked_shl(bits).unwrap_or(u128::MAX)
    }
}

impl fmt::Display for SubRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.net)
    }
}

/// Subject and SANs of the leaf certificate presented by a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub subject: String,
    pub sans: Vec<String>,
}

impl CertificateInfo {
    #[must_use]
    pub fn new<S: Into<String>>(subject: S, sans: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            sans,
        }
    }

    /// Subject first, then SANs in certificate order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.subject.as_str()).chain(self.sans.iter().map(String::as_str))
    }
}

/// A target whose certificate passed both the keyword and the region filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub target: ScanTarget,
    pub certificate: CertificateInfo,
    pub matched_keyword: String,
    pub matched_region: String,
    pub timestamp: DateTime<Utc>,
}

impl MatchResult {
    #[must_use]
    pub fn new(
        target: ScanTarget,
        certificate: CertificateInfo,
        matched_keyword: String,
        matched_region: String,
    ) -> Self {
        Self {
            target,
            certificate,
            matched_keyword,
            matched_region,
            timestamp: Utc::now(),
        }
    }
}

/// Best-effort recon attached to a match. Each field has a single owning stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub server_header: Option<String>,
    pub jarm_fingerprint: Option<String>,
}

impl EnrichmentRecord {
    /// Take every field `other` filled in.
    pub fn merge(&mut self, other: EnrichmentRecord) {
        if other.server_header.is_some() {
            self.server_header = other.server_header;
        }
        if other.jarm_fingerprint.is_some() {
            self.jarm_fingerprint = other.jarm_fingerprint;
        }
    }
}

/// A match travelling through the enrichment stages towards the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub result: MatchResult,
    pub enrichment: EnrichmentRecord,
}

impl From<MatchResult> for Finding {
    fn from(result: MatchResult) -> Self {
        Self {
            result,
            enrichment: EnrichmentRecord::default(),
        }
    }
}

impl Finding {
    #[must_use]
    pub fn to_record(&self) -> FindingRecord {
        let r = &self.result;
        FindingRecord {
            ip: r.target.ip,
            port: r.target.port,
            matched_keyword: r.matched_keyword.clone(),
            matched_region: r.matched_region.clone(),
            certificate_subject: r.certificate.subject.clone(),
            certificate_sans: r.certificate.sans.clone(),
            server_header: self.enrichment.server_header.clone(),
            jarm_fingerprint: self.enrichment.jarm_fingerprint.clone(),
            timestamp: r.timestamp,
        }
    }
}

/// One line of output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingRecord {
    pub ip: IpAddr,
    pub port: u16,
    pub matched_keyword: String,
    pub matched_region: String,
    pub certificate_subject: String,
    #[serde(rename = "certificateSANs")]
    pub certificate_sans: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub server_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub jarm_fingerprint: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Worker count and toggle for one enrichment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOptions {
    pub enabled: bool,
    pub workers: usize,
}

/// Scan behaviour tuning options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    pub ports: Vec<u16>,
    pub keyword_pattern: String,
    pub region_pattern: String,
    /// Each scan worker unit covers 2^cidr_suffix addresses.
    pub cidr_suffix: u8,
    pub timeout: Duration,
    pub scan_workers: usize,
    pub server_header: StageOptions,
    pub jarm: StageOptions,
    pub jarm_retries: u32,
    pub console_out: bool,
    pub progress_interval: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ports: vec![443],
            keyword_pattern: ".*".to_string(),
            region_pattern: ".*".to_string(),
            cidr_suffix: 4,
            timeout: Duration::from_secs(10),
            scan_workers: 2000,
            server_header: StageOptions {
                enabled: false,
                workers: 10,
            },
            jarm: StageOptions {
                enabled: false,
                workers: 50,
            },
            jarm_retries: 3,
            console_out: false,
            progress_interval: Duration::from_secs(10),
        }
    }
}

impl ScanOptions {
    /// Reject configurations that cannot start a scan.
    pub fn validate(&self) -> SslSearchResult<()> {
        if self.ports.is_empty() {
            return Err(SslSearchError::Config("no ports specified".into()));
        }
        if self.ports.contains(&0) {
            return Err(SslSearchError::Config("port 0 is not scannable".into()));
        }
        if self.scan_workers == 0 {
            return Err(SslSearchError::Config("scan worker count must be > 0".into()));
        }
        if self.server_header.enabled && self.server_header.workers == 0 {
            return Err(SslSearchError::Config(
                "server header worker count must be > 0".into(),
            ));
        }
        if self.jarm.enabled && self.jarm.workers == 0 {
            return Err(SslSearchError::Config("JARM worker count must be > 0".into()));
        }
        if self.timeout.is_zero() {
            return Err(SslSearchError::Config("timeout must be > 0".into()));
        }
        if self.cidr_suffix > 128 {
            return Err(SslSearchError::Config(format!(
                "CIDR suffix {} exceeds the widest address family",
                self.cidr_suffix
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn target_display_brackets_ipv6() {
        let t = ScanTarget::new("2001:db8::1".parse().unwrap(), 443);
        assert_eq!(t.to_string(), "[2001:db8::1]:443");
        let t = ScanTarget::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 8443);
        assert_eq!(t.to_string(), "10.0.0.1:8443");
    }

    #[test]
    fn block_is_normalised() {
        let b = CidrBlock::new("10.0.0.5/30".parse().unwrap()).with_region(" us-east-1 ");
        assert_eq!(b.net.to_string(), "10.0.0.4/30");
        assert_eq!(b.region.as_deref(), Some("us-east-1"));
        assert_eq!(b.host_bits(), 2);
    }

    #[test]
    fn sub_range_includes_network_and_broadcast() {
        let r = SubRange {
            net: "10.0.0.0/30".parse().unwrap(),
            region: None,
        };
        let ips: Vec<IpAddr> = r.addresses().collect();
        assert_eq!(ips.len(), 4);
        assert_eq!(r.address_count(), 4);
        assert_eq!(ips[0], IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)));
        assert_eq!(ips[3], IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)));
    }

    #[test]
    fn record_uses_output_field_names() {
        let result = MatchResult::new(
            ScanTarget::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 443),
            CertificateInfo::new("CN=example.com", vec!["example.com".into()]),
            "example".into(),
            "us-east-1".into(),
        );
        let mut finding = Finding::from(result);
        finding.enrichment.server_header = Some("nginx".into());

        let value = serde_json::to_value(finding.to_record()).unwrap();
        assert_eq!(value["ip"], "127.0.0.1");
        assert_eq!(value["matchedKeyword"], "example");
        assert_eq!(value["certificateSANs"][0], "example.com");
        assert_eq!(value["serverHeader"], "nginx");
        assert!(value.get("jarmFingerprint").is_none());
    }

    #[test]
    fn options_validation() {
        assert!(ScanOptions::default().validate().is_ok());

        let mut o = ScanOptions::default();
        o.scan_workers = 0;
        assert!(o.validate().is_err());

        let mut o = ScanOptions::default();
        o.ports.clear();
        assert!(o.validate().is_err());

        let mut o = ScanOptions::default();
        o.jarm = StageOptions {
            enabled: true,
            workers: 0,
        };
        assert!(o.validate().is_err());

        // disabled stages may carry a zero worker count
        let mut o = ScanOptions::default();
        o.server_header.workers = 0;
        assert!(o.validate().is_ok());
    }

    #[test]
    fn merge_keeps_each_stage_field() {
        let mut record = EnrichmentRecord {
            server_header: Some("nginx".into()),
            jarm_fingerprint: None,
        };
        record.merge(EnrichmentRecord {
            server_header: None,
            jarm_fingerprint: Some("0".repeat(62)),
        });
        assert_eq!(record.server_header.as_deref(), Some("nginx"));
        assert_eq!(record.jarm_fingerprint.map(|f| f.len()), Some(62));
    }
}
