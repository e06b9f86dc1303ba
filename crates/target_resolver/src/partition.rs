//! Sub-range partitioning
//!
//! A block is cut into sub-ranges of 2^suffix addresses. The suffix is clamped
//! to the block's host bits, so an oversized suffix yields the whole block as a
//! single sub-range. Generation is lazy: a /8 at suffix 4 is a million units
//! and they are never all materialised.

use ipnet::{IpNet, IpSubnets};
use sslsearch_common::{CidrBlock, SubRange};
use std::sync::Arc;
use tracing::warn;

/// Prefix length of the sub-ranges cut from `net` at `suffix`.
#[inline]
#[must_use]
pub fn effective_prefix(net: &IpNet, suffix: u8) -> u8 {
    let host_bits = net.max_prefix_len() - net.prefix_len();
    net.max_prefix_len() - suffix.min(host_bits)
}

/// Number of sub-ranges a block produces, saturating at `u64::MAX`.
#[must_use]
pub fn sub_range_count(block: &CidrBlock, suffix: u8) -> u64 {
    let diff = u32::from(effective_prefix(&block.net, suffix) - block.net.prefix_len());
    1u64.checked_shl(diff).unwrap_or(u64::MAX)
}

/// Total sub-ranges across all blocks.
#[must_use]
pub fn total_sub_ranges(blocks: &[CidrBlock], suffix: u8) -> u64 {
    blocks
        .iter()
        .fold(0u64, |acc, b| acc.saturating_add(sub_range_count(b, suffix)))
}

/// Lazy FIFO stream of sub-ranges, block by block in input order.
pub struct SubRanges {
    blocks: std::vec::IntoIter<CidrBlock>,
    current: Option<(IpSubnets, Option<Arc<str>>)>,
    suffix: u8,
}

impl SubRanges {
    pub fn new(blocks: Vec<CidrBlock>, suffix: u8) -> Self {
        Self {
            blocks: blocks.into_iter(),
            current: None,
            suffix,
        }
    }
}

impl Iterator for SubRanges {
    type Item = SubRange;

    fn next(&mut self) -> Option<SubRange> {
        loop {
            if let Some((subnets, region)) = self.current.as_mut() {
                if let Some(net) = subnets.next() {
                    return Some(SubRange {
                        net,
                        region: region.clone(),
                    });
                }
                self.current = None;
            }

            let block = self.blocks.next()?;
            let prefix = effective_prefix(&block.net, self.suffix);
            match block.net.subnets(prefix) {
                Ok(subnets) => self.current = Some((subnets, block.region)),
                Err(e) => warn!("skipping {}: cannot split at /{}: {}", block.net, prefix, e),
            }
        }
    }
}

/// Sub-ranges of a single block.
pub fn partition(block: &CidrBlock, suffix: u8) -> SubRanges {
    SubRanges::new(vec![block.clone()], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::IpAddr;

    fn block(s: &str) -> CidrBlock {
        CidrBlock::new(s.parse().unwrap())
    }

    fn assert_exact_partition(b: &CidrBlock, suffix: u8) {
        let ranges: Vec<SubRange> = partition(b, suffix).collect();
        assert_eq!(ranges.len() as u64, sub_range_count(b, suffix));

        let mut seen = HashSet::new();
        let mut visited = 0u128;
        for r in &ranges {
            for ip in r.addresses() {
                assert!(b.net.contains(&ip), "{ip} outside {}", b.net);
                assert!(seen.insert(ip), "{ip} visited twice");
                visited += 1;
            }
        }
        let block_size = 1u128 << (b.net.max_prefix_len() - b.net.prefix_len());
        assert_eq!(visited, block_size);
    }

    #[test]
    fn partitions_are_exact() {
        for (cidr, suffix) in [
            ("10.0.0.0/24", 4),
            ("10.0.0.0/24", 0),
            ("10.0.0.0/30", 2),
            ("192.168.7.0/29", 1),
            ("203.0.113.9/32", 4),
            ("2001:db8::/120", 4),
            ("2001:db8::/124", 8),
        ] {
            assert_exact_partition(&block(cidr), suffix);
        }
    }

    #[test]
    fn unit_size_is_two_to_the_suffix() {
        let ranges: Vec<SubRange> = partition(&block("10.0.0.0/24"), 4).collect();
        assert_eq!(ranges.len(), 16);
        assert!(ranges.iter().all(|r| r.net.prefix_len() == 28));
        assert_eq!(ranges[1].net.to_string(), "10.0.0.16/28");
    }

    #[test]
    fn oversized_suffix_is_whole_block() {
        let b = block("10.0.0.0/30");
        let ranges: Vec<SubRange> = partition(&b, 12).collect();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].net, b.net);
        assert_eq!(sub_range_count(&b, 12), 1);
    }

    #[test]
    fn fifo_across_blocks_keeps_region() {
        let blocks = vec![
            block("10.0.0.0/30").with_region("us-east-1"),
            block("10.1.0.0/31"),
        ];
        assert_eq!(total_sub_ranges(&blocks, 1), 3);

        let ranges: Vec<SubRange> = SubRanges::new(blocks, 1).collect();
        let nets: Vec<String> = ranges.iter().map(|r| r.net.to_string()).collect();
        assert_eq!(nets, vec!["10.0.0.0/31", "10.0.0.2/31", "10.1.0.0/31"]);
        assert_eq!(ranges[0].region.as_deref(), Some("us-east-1"));
        assert_eq!(ranges[2].region, None);
    }

    #[test]
    fn huge_ipv6_count_saturates() {
        let b = block("2001:db8::/32");
        assert_eq!(sub_range_count(&b, 4), u64::MAX);
        let first = partition(&b, 4).next().unwrap();
        assert_eq!(first.address_count(), 16);
        assert!(first.net.contains(&"2001:db8::f".parse::<IpAddr>().unwrap()));
    }
}
