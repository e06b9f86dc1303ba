//! Non-verifying TLS client and leaf certificate extraction
//!
//! The scanner inspects whatever certificate a server presents, so chain and
//! hostname verification are both switched off and SNI is not sent (targets
//! are bare addresses).

use sslsearch_common::{CertificateInfo, SslSearchError, SslSearchResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio_native_tls::TlsConnector;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

/// Build the connector every pooled TLS client is cloned from.
pub fn insecure_connector() -> SslSearchResult<TlsConnector> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .use_sni(false)
        .build()
        .map_err(|e| SslSearchError::Config(format!("cannot build TLS client: {e}")))?;
    Ok(TlsConnector::from(connector))
}

/// Subject and SANs of a DER encoded certificate.
pub fn certificate_info(der: &[u8]) -> Result<CertificateInfo, String> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| e.to_string())?;
    let subject = cert.subject().to_string();

    let mut sans = Vec::new();
    // a broken SAN extension still leaves a usable subject
    if let Ok(Some(ext)) = cert.subject_alternative_name() {
        for name in &ext.value.general_names {
            match name {
                GeneralName::DNSName(s) | GeneralName::RFC822Name(s) | GeneralName::URI(s) => {
                    sans.push((*s).to_string())
                }
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        sans.push(ip.to_string());
                    }
                }
                _ => {}
            }
        }
    }

    Ok(CertificateInfo::new(subject, sans))
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}
