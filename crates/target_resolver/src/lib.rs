//! Target Resolver - CIDR input parsing and sub-range partitioning
//!
//! Turns operator input into an ordered list of `CidrBlock`s. Supported
//! token forms:
//! - CIDR: "192.168.1.0/24", "2001:db8::/64"
//! - single address (treated as /32 or /128): "1.2.3.4"
//! - region label, inline: "10.0.0.0/16=us-east-1"
//! - region label, file line: "10.0.0.0/16 us-east-1"

pub mod partition;

pub use partition::{effective_prefix, partition, sub_range_count, total_sub_ranges, SubRanges};

use anyhow::{bail, Context, Result};
use ipnet::IpNet;
use sslsearch_common::{CidrBlock, SslSearchError};
use std::collections::HashSet;
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

pub struct TargetResolver;

impl TargetResolver {
    pub fn new() -> Self {
        Self
    }

    /// Parse a comma-separated CIDR list; `=region` labels a block.
    pub fn parse_cidr_list(list: &str) -> Result<Vec<CidrBlock>> {
        let mut blocks = Vec::new();
        for token in list.split(',') {
            let t = token.trim();
            if t.is_empty() {
                continue;
            }
            let (cidr, region) = match t.split_once('=') {
                Some((c, r)) => (c.trim(), r),
                None => (t, ""),
            };
            let net = parse_net(cidr)?;
            blocks.push(CidrBlock::new(net).with_region(region));
        }
        Ok(dedup(blocks))
    }

    /// Parse `CIDR [region]` lines. `#` starts a comment.
    pub fn parse_cidr_lines(text: &str) -> Result<Vec<CidrBlock>> {
        let mut blocks = Vec::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let cidr = fields.next().unwrap_or_default();
            let region = fields.next().unwrap_or_default();
            let net = parse_net(cidr).with_context(|| format!("line {line_no}"))?;
            blocks.push(CidrBlock::new(net).with_region(region));
        }
        Ok(dedup(blocks))
    }

    /// Load blocks from a file, `-` meaning stdin. The read runs on the
    /// blocking pool so it never stalls the async runtime.
    pub async fn load_cidr_file(path: &Path) -> Result<Vec<CidrBlock>> {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || -> Result<String> {
            if owned.as_os_str() == "-" {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("failed to read CIDR list from stdin")?;
                Ok(buf)
            } else {
                std::fs::read_to_string(&owned)
                    .with_context(|| format!("failed to read CIDR file: {}", owned.display()))
            }
        })
        .await
        .context("blocking CIDR file read failed")??;

        Self::parse_cidr_lines(&text)
    }

    /// Combine inline and file input, preserving order: inline blocks first.
    pub async fn resolve(list: Option<&str>, file: Option<&Path>) -> Result<Vec<CidrBlock>> {
        let mut blocks = Vec::new();
        if let Some(list) = list {
            blocks.extend(Self::parse_cidr_list(list)?);
        }
        if let Some(file) = file {
            blocks.extend(Self::load_cidr_file(file).await?);
        }
        let blocks = dedup(blocks);
        if blocks.is_empty() {
            bail!(SslSearchError::Config("no CIDR ranges to scan".into()));
        }
        debug!("resolved {} CIDR block(s)", blocks.len());
        Ok(blocks)
    }
}

impl Default for TargetResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_net(token: &str) -> Result<IpNet> {
    if let Ok(net) = token.parse::<IpNet>() {
        return Ok(net);
    }
    if let Ok(ip) = token.parse::<IpAddr>() {
        let host_prefix = if ip.is_ipv4() { 32 } else { 128 };
        return IpNet::new(ip, host_prefix)
            .map_err(|_| SslSearchError::InvalidCidr(token.to_string()).into());
    }
    bail!(SslSearchError::InvalidCidr(token.to_string()))
}

/// Drop repeated blocks, keeping the first occurrence, so no target is probed twice
/// because of duplicated input.
fn dedup(blocks: Vec<CidrBlock>) -> Vec<CidrBlock> {
    let mut seen = HashSet::new();
    blocks.into_iter().filter(|b| seen.insert(b.net)).collect()
}
