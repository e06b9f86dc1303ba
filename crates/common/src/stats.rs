//! Process-wide scan counters
//!
//! All mutations take the exclusive side of a single reader/writer lock;
//! progress readers take the shared side and copy out a snapshot.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Point-in-time copy of the counters. Every field only ever grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub ranges_total: u64,
    pub ranges_scanned: u64,
    pub ips_scanned: u64,
    pub findings: u64,
    pub connection_errors: u64,
    pub tls_errors: u64,
    pub no_matches: u64,
}

impl StatsSnapshot {
    /// Percentage of sub-ranges completed, in [0.0, 100.0].
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.ranges_total == 0 {
            0.0
        } else {
            (self.ranges_scanned as f64 / self.ranges_total as f64) * 100.0
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanStats {
    inner: RwLock<StatsSnapshot>,
}

impl ScanStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ranges_total(&self, n: u64) {
        let mut s = self.inner.write();
        s.ranges_total = s.ranges_total.saturating_add(n);
    }

    pub fn range_scanned(&self) {
        let mut s = self.inner.write();
        s.ranges_scanned = s.ranges_scanned.saturating_add(1);
    }

    pub fn ip_scanned(&self) {
        let mut s = self.inner.write();
        s.ips_scanned = s.ips_scanned.saturating_add(1);
    }

    pub fn finding(&self) {
        let mut s = self.inner.write();
        s.findings = s.findings.saturating_add(1);
    }

    /// Account a per-target error. Cancellation and JARM failures are not counted here.
    pub fn record_error(&self, err: ScanError) {
        let mut s = self.inner.write();
        match err {
            ScanError::Connection => s.connection_errors = s.connection_errors.saturating_add(1),
            ScanError::NoTls => s.tls_errors = s.tls_errors.saturating_add(1),
            ScanError::NoMatch => s.no_matches = s.no_matches.saturating_add(1),
            ScanError::Cancelled | ScanError::JarmNotCalculated => {}
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        *self.inner.read()
    }
}
