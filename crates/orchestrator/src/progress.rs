//! Progress reporting

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::sink::SinkReport;
use sslsearch_common::{ScanStats, StatsSnapshot};

/// Logs a stats snapshot every `interval` until stopped.
pub struct ProgressReporter {
    stats: Arc<ScanStats>,
    interval: Duration,
}

impl ProgressReporter {
    pub fn new(stats: Arc<ScanStats>, interval: Duration) -> Self {
        Self { stats, interval }
    }

    pub fn spawn(self, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.interval.is_zero() {
                return;
            }
            let mut ticker = tokio::time::interval(self.interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => log_progress(&self.stats.snapshot()),
                }
            }
        })
    }
}

fn log_progress(s: &StatsSnapshot) {
    info!(
        "progress {:.1}%: ranges {}/{}, ips {}, findings {}",
        s.progress(),
        s.ranges_scanned,
        s.ranges_total,
        s.ips_scanned,
        s.findings
    );
}

pub fn print_summary(s: &StatsSnapshot, report: &SinkReport) {
    info!("Scan Summary:");
    info!("  Ranges scanned: {}/{}", s.ranges_scanned, s.ranges_total);
    info!("  IPs scanned: {}", s.ips_scanned);
    info!("  Findings: {}", s.findings);
    info!(
        "  Errors: {} connection, {} TLS, {} no match",
        s.connection_errors, s.tls_errors, s.no_matches
    );
    info!(
        "  Written: {} (dropped {}, truncated {})",
        report.written, report.dropped, report.truncated
    );
}
