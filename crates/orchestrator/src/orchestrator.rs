//! Orchestrator - wires scheduler, enrichment stages and sink into one pipeline

use anyhow::Result;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::enrichment::{EnrichmentPipeline, EnrichmentStage};
use crate::progress::ProgressReporter;
use crate::scheduler::CidrScheduler;
use crate::sink::{ResultSink, SinkReport};
use sslsearch_common::{CidrBlock, Enricher, Prober, ScanOptions, ScanStats};

/// Scan pipeline: CIDR scheduler -> enrichment stages (side by side, one
/// pool each) -> result sink.
pub struct Orchestrator {
    options: ScanOptions,
    prober: Arc<dyn Prober>,
    stages: Vec<(Arc<dyn Enricher>, usize)>,
    stats: Arc<ScanStats>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        options: ScanOptions,
        prober: Arc<dyn Prober>,
        stats: Arc<ScanStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            options,
            prober,
            stages: Vec::new(),
            stats,
            cancel,
        }
    }

    /// Register an enrichment stage with its own worker pool.
    pub fn add_enricher(&mut self, enricher: Arc<dyn Enricher>, workers: usize) {
        self.stages.push((enricher, workers));
    }

    pub fn stats(&self) -> Arc<ScanStats> {
        self.stats.clone()
    }

    /// Scan `blocks` to completion or cancellation. Returns once every
    /// finding has reached the sink.
    #[instrument(skip_all, fields(blocks = blocks.len()))]
    pub async fn run<W>(
        &self,
        blocks: Vec<CidrBlock>,
        sink: &mut ResultSink<W>,
    ) -> Result<SinkReport>
    where
        W: AsyncWrite + Unpin + Send,
    {
        info!(
            "starting scan: prober={} ports={:?} stages={}",
            self.prober.name(),
            self.options.ports,
            self.stages.len()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = CidrScheduler::new(
            self.prober.clone(),
            self.stats.clone(),
            self.cancel.clone(),
            &self.options,
        )
        .spawn(blocks, tx);

        let stages = self
            .stages
            .iter()
            .map(|(enricher, workers)| EnrichmentStage::new(enricher.clone(), *workers))
            .collect();
        let (rx, enrichment) = EnrichmentPipeline::new(stages).spawn(rx, self.cancel.clone());

        let stop = self.cancel.child_token();
        let reporter = ProgressReporter::new(self.stats.clone(), self.options.progress_interval)
            .spawn(stop.clone());

        let report = sink.run(rx).await;

        scheduler.await?;
        enrichment.await?;
        stop.cancel();
        reporter.await?;

        if self.cancel.is_cancelled() {
            info!("scan cancelled; in-flight findings flushed");
        }
        Ok(report)
    }
}
