//! CIDR scheduler: sub-range fan-out over a fixed worker pool
//!
//! All workers pull from one lazily generated FIFO of sub-ranges. A worker
//! owns its sub-range until every address x port in it has been probed;
//! cancellation is checked before each sub-range and before each probe.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use sslsearch_common::{
    CidrBlock, Finding, Prober, ScanError, ScanOptions, ScanStats, ScanTarget, SubRange,
};
use sslsearch_target_resolver::{total_sub_ranges, SubRanges};

pub struct CidrScheduler {
    prober: Arc<dyn Prober>,
    stats: Arc<ScanStats>,
    cancel: CancellationToken,
    ports: Arc<[u16]>,
    suffix: u8,
    workers: usize,
}

impl CidrScheduler {
    pub fn new(
        prober: Arc<dyn Prober>,
        stats: Arc<ScanStats>,
        cancel: CancellationToken,
        options: &ScanOptions,
    ) -> Self {
        Self {
            prober,
            stats,
            cancel,
            ports: Arc::from(options.ports.as_slice()),
            suffix: options.cidr_suffix,
            workers: options.scan_workers.max(1),
        }
    }

    /// Start the worker pool. Matches arrive on `out`; the returned handle
    /// resolves once every worker has exited, at which point all senders
    /// are gone and the channel closes.
    pub fn spawn(
        self,
        blocks: Vec<CidrBlock>,
        out: mpsc::UnboundedSender<Finding>,
    ) -> JoinHandle<()> {
        let total = total_sub_ranges(&blocks, self.suffix);
        self.stats.add_ranges_total(total);
        info!(
            "scanning {} block(s) as {} sub-range(s) (suffix {}) with {} workers",
            blocks.len(),
            total,
            self.suffix,
            self.workers
        );

        let queue = Arc::new(Mutex::new(SubRanges::new(blocks, self.suffix)));
        let mut handles = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let worker = Worker {
                id,
                queue: queue.clone(),
                prober: self.prober.clone(),
                stats: self.stats.clone(),
                cancel: self.cancel.clone(),
                ports: self.ports.clone(),
                out: out.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        drop(out);

        tokio::spawn(async move {
            for h in handles {
                if let Err(e) = h.await {
                    warn!("scan worker panicked: {}", e);
                }
            }
            debug!("all scan workers exited");
        })
    }
}

struct Worker {
    id: usize,
    queue: Arc<Mutex<SubRanges>>,
    prober: Arc<dyn Prober>,
    stats: Arc<ScanStats>,
    cancel: CancellationToken,
    ports: Arc<[u16]>,
    out: mpsc::UnboundedSender<Finding>,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let next = { self.queue.lock().await.next() };
            let Some(range) = next else { break };

            match self.scan_range(&range).await {
                Ok(()) => self.stats.range_scanned(),
                Err(_) => break,
            }
        }
        trace!(worker = self.id, "scan worker done");
    }

    /// Probe every address x port of one sub-range. Only cancellation aborts.
    async fn scan_range(&self, range: &SubRange) -> Result<(), ScanError> {
        let region = range.region.as_deref();
        for ip in range.addresses() {
            for &port in self.ports.iter() {
                if self.cancel.is_cancelled() {
                    return Err(ScanError::Cancelled);
                }
                let target = ScanTarget::new(ip, port);
                match self.prober.probe(&target, region).await {
                    Ok(m) => {
                        info!("found {} ({})", target, m.matched_keyword);
                        if self.out.send(Finding::from(m)).is_err() {
                            warn!("finding for {} dropped: pipeline closed", target);
                        }
                    }
                    Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
                    Err(e) => trace!("{}: {}", target, e),
                }
            }
            self.stats.ip_scanned();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sslsearch_common::{CertificateInfo, MatchResult};
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    /// Matches every target; optionally cancels on the first call.
    struct MockProber {
        seen: StdMutex<Vec<(ScanTarget, Option<String>)>>,
        cancel_on_first: Option<CancellationToken>,
    }

    impl MockProber {
        fn new() -> Self {
            Self {
                seen: StdMutex::new(Vec::new()),
                cancel_on_first: None,
            }
        }

        fn targets(&self) -> Vec<ScanTarget> {
            self.seen.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    #[async_trait]
    impl Prober for MockProber {
        async fn probe(
            &self,
            target: &ScanTarget,
            region: Option<&str>,
        ) -> Result<MatchResult, ScanError> {
            self.seen
                .lock()
                .unwrap()
                .push((*target, region.map(str::to_string)));
            if let Some(c) = &self.cancel_on_first {
                c.cancel();
                return Err(ScanError::NoMatch);
            }
            Ok(MatchResult::new(
                *target,
                CertificateInfo::new("CN=test", vec![]),
                "test".into(),
                region.unwrap_or("test").into(),
            ))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn options(ports: Vec<u16>, suffix: u8, workers: usize) -> ScanOptions {
        ScanOptions {
            ports,
            cidr_suffix: suffix,
            scan_workers: workers,
            ..ScanOptions::default()
        }
    }

    fn blocks(list: &str) -> Vec<CidrBlock> {
        list.split(',')
            .map(|s| CidrBlock::new(s.parse().unwrap()))
            .collect()
    }

    async fn run(
        prober: Arc<MockProber>,
        cancel: CancellationToken,
        opts: &ScanOptions,
        input: Vec<CidrBlock>,
    ) -> (Arc<ScanStats>, Vec<Finding>) {
        let stats = Arc::new(ScanStats::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = CidrScheduler::new(prober, stats.clone(), cancel, opts).spawn(input, tx);
        let mut found = Vec::new();
        while let Some(f) = rx.recv().await {
            found.push(f);
        }
        handle.await.unwrap();
        (stats, found)
    }

    #[tokio::test]
    async fn slash_30_with_suffix_2() {
        let prober = Arc::new(MockProber::new());
        let (stats, found) = run(
            prober.clone(),
            CancellationToken::new(),
            &options(vec![443], 2, 4),
            blocks("10.0.0.0/30"),
        )
        .await;

        let snap = stats.snapshot();
        assert_eq!(prober.targets().len(), 4);
        assert_eq!(snap.ranges_total, 1);
        assert_eq!(snap.ranges_scanned, 1);
        assert_eq!(snap.ips_scanned, 4);
        assert_eq!(found.len(), 4);
    }

    #[tokio::test]
    async fn every_target_probed_once() {
        let prober = Arc::new(MockProber::new());
        let (stats, _) = run(
            prober.clone(),
            CancellationToken::new(),
            &options(vec![443, 8443], 2, 3),
            blocks("10.0.0.0/28,192.168.1.0/30"),
        )
        .await;

        let targets = prober.targets();
        let unique: HashSet<_> = targets.iter().collect();
        assert_eq!(targets.len(), 40);
        assert_eq!(unique.len(), 40);
        let snap = stats.snapshot();
        assert_eq!(snap.ranges_total, 5);
        assert_eq!(snap.ranges_scanned, 5);
        assert_eq!(snap.ips_scanned, 20);
    }

    #[tokio::test]
    async fn region_label_reaches_prober() {
        let prober = Arc::new(MockProber::new());
        let input = vec![CidrBlock::new("10.9.0.0/31".parse().unwrap()).with_region("eu-west-1")];
        let (_, found) = run(
            prober.clone(),
            CancellationToken::new(),
            &options(vec![443], 4, 1),
            input,
        )
        .await;
        let seen = prober.seen.lock().unwrap();
        assert!(seen.iter().all(|(_, r)| r.as_deref() == Some("eu-west-1")));
        assert!(found.iter().all(|f| f.result.matched_region == "eu-west-1"));
    }

    #[tokio::test]
    async fn cancelled_before_start_scans_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let prober = Arc::new(MockProber::new());
        let (stats, found) = run(
            prober.clone(),
            cancel,
            &options(vec![443], 2, 8),
            blocks("10.0.0.0/24"),
        )
        .await;

        assert!(prober.targets().is_empty());
        assert!(found.is_empty());
        let snap = stats.snapshot();
        assert_eq!(snap.ranges_total, 64);
        assert_eq!(snap.ranges_scanned, 0);
    }

    #[tokio::test]
    async fn cancel_mid_range_stops_the_worker() {
        let cancel = CancellationToken::new();
        let prober = Arc::new(MockProber {
            seen: StdMutex::new(Vec::new()),
            cancel_on_first: Some(cancel.clone()),
        });
        let (stats, found) = run(
            prober.clone(),
            cancel,
            &options(vec![443], 4, 1),
            blocks("10.0.0.0/24"),
        )
        .await;

        assert_eq!(prober.targets().len(), 1);
        assert!(found.is_empty());
        let snap = stats.snapshot();
        // the interrupted sub-range is not counted as scanned
        assert_eq!(snap.ranges_scanned, 0);
        assert_eq!(snap.ips_scanned, 1);
    }
}
