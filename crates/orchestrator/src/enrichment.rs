//! Enrichment stages
//!
//! Every stage is its own worker pool. A finding is handed to all stages at
//! once and reaches the sink when the last of them has reported back, so a
//! slow stage never holds up the others. After cancellation the workers stop
//! enriching but keep reporting so nothing found is lost.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sslsearch_common::{Enricher, EnrichmentRecord, Finding, MatchResult};

type Job = (u64, Arc<MatchResult>);
type Partial = (u64, EnrichmentRecord);

pub struct EnrichmentStage {
    enricher: Arc<dyn Enricher>,
    workers: usize,
}

impl EnrichmentStage {
    pub fn new(enricher: Arc<dyn Enricher>, workers: usize) -> Self {
        Self {
            enricher,
            workers: workers.max(1),
        }
    }

    pub fn name(&self) -> &str {
        self.enricher.name()
    }

    /// Start the pool: each job yields exactly one partial record on `done`.
    fn spawn(
        self,
        jobs: mpsc::UnboundedReceiver<Job>,
        done: mpsc::UnboundedSender<Partial>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let jobs = Arc::new(Mutex::new(jobs));
        let name = self.name().to_string();
        debug!("starting {} stage with {} workers", name, self.workers);

        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let jobs = jobs.clone();
            let done = done.clone();
            let enricher = self.enricher.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = { jobs.lock().await.recv().await };
                    let Some((id, result)) = next else { break };

                    let mut record = EnrichmentRecord::default();
                    if !cancel.is_cancelled() {
                        enricher.enrich(&result, &mut record).await;
                    }
                    if done.send((id, record)).is_err() {
                        warn!("{} stage: joiner closed", enricher.name());
                        break;
                    }
                }
            }));
        }

        tokio::spawn(async move {
            for h in handles {
                if let Err(e) = h.await {
                    warn!("{} worker panicked: {}", name, e);
                }
            }
            debug!("{} stage drained", name);
        })
    }
}

/// Fans findings out to every stage and joins the partial records.
pub struct EnrichmentPipeline {
    stages: Vec<EnrichmentStage>,
}

impl EnrichmentPipeline {
    pub fn new(stages: Vec<EnrichmentStage>) -> Self {
        Self { stages }
    }

    /// Start every stage between `input` and a fresh output channel. The
    /// returned handle finishes once all stages have drained.
    pub fn spawn(
        self,
        mut input: mpsc::UnboundedReceiver<Finding>,
        cancel: CancellationToken,
    ) -> (mpsc::UnboundedReceiver<Finding>, JoinHandle<()>) {
        if self.stages.is_empty() {
            return (input, tokio::spawn(async {}));
        }
        let (out, rx) = mpsc::unbounded_channel();
        let names: Vec<String> = self.stages.iter().map(|s| s.name().to_string()).collect();
        debug!("enrichment stages: {:?}", names);

        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut job_txs = Vec::with_capacity(self.stages.len());
        let mut stage_handles = Vec::with_capacity(self.stages.len());
        for stage in self.stages {
            let (job_tx, job_rx) = mpsc::unbounded_channel();
            job_txs.push(job_tx);
            stage_handles.push(stage.spawn(job_rx, done_tx.clone(), cancel.clone()));
        }
        drop(done_tx);

        let handle = tokio::spawn(async move {
            let mut pending: HashMap<u64, (Finding, usize)> = HashMap::new();
            let mut next_id = 0u64;
            let mut input_open = true;

            loop {
                tokio::select! {
                    next = input.recv(), if input_open => match next {
                        Some(finding) => {
                            let id = next_id;
                            next_id += 1;
                            let result = Arc::new(finding.result.clone());
                            let sent = job_txs
                                .iter()
                                .filter(|tx| tx.send((id, result.clone())).is_ok())
                                .count();
                            if sent == 0 {
                                let _ = out.send(finding);
                            } else {
                                pending.insert(id, (finding, sent));
                            }
                        }
                        None => {
                            input_open = false;
                            // closing the job queues lets the stages drain
                            job_txs.clear();
                        }
                    },
                    partial = done_rx.recv() => match partial {
                        Some((id, record)) => {
                            if let Some((finding, remaining)) = pending.get_mut(&id) {
                                finding.enrichment.merge(record);
                                *remaining -= 1;
                                if *remaining == 0 {
                                    if let Some((finding, _)) = pending.remove(&id) {
                                        let _ = out.send(finding);
                                    }
                                }
                            }
                        }
                        None => break,
                    },
                }
            }

            // stages gone before reporting back; forward what we have
            for (_, (finding, _)) in pending.drain() {
                let _ = out.send(finding);
            }
            for h in stage_handles {
                if let Err(e) = h.await {
                    warn!("enrichment stage failed: {}", e);
                }
            }
            debug!("enrichment drained");
        });
        (rx, handle)
    }
}
