//! Keyword and region filters over certificate fields

use regex::Regex;
use sslsearch_common::{CertificateInfo, ScanError, SslSearchError, SslSearchResult};

/// Compiled keyword/region patterns, shared read-only by all scan workers.
#[derive(Debug, Clone)]
pub struct CertificateMatcher {
    keyword: Regex,
    region: Regex,
}

impl CertificateMatcher {
    pub fn new(keyword: &str, region: &str) -> SslSearchResult<Self> {
        let keyword = Regex::new(keyword)
            .map_err(|e| SslSearchError::Pattern(format!("keyword regex: {e}")))?;
        let region = Regex::new(region)
            .map_err(|e| SslSearchError::Pattern(format!("region regex: {e}")))?;
        Ok(Self { keyword, region })
    }

    /// Text matched by the keyword pattern in the first matching field
    /// (subject, then SANs).
    pub fn match_keyword(&self, cert: &CertificateInfo) -> Option<String> {
        first_match(&self.keyword, cert.fields())
    }

    /// Text matched by the region pattern. A block label takes precedence
    /// over the certificate fields.
    pub fn match_region(&self, cert: &CertificateInfo, label: Option<&str>) -> Option<String> {
        match label {
            Some(label) => first_match(&self.region, std::iter::once(label)),
            None => first_match(&self.region, cert.fields()),
        }
    }

    /// Both filters must pass; returns (keyword, region).
    pub fn evaluate(
        &self,
        cert: &CertificateInfo,
        label: Option<&str>,
    ) -> Result<(String, String), ScanError> {
        let keyword = self.match_keyword(cert).ok_or(ScanError::NoMatch)?;
        let region = self.match_region(cert, label).ok_or(ScanError::NoMatch)?;
        Ok((keyword, region))
    }
}

fn first_match<'a>(re: &Regex, mut fields: impl Iterator<Item = &'a str>) -> Option<String> {
    fields.find_map(|f| re.find(f).map(|m| m.as_str().to_string()))
}
