//! Orchestrator - CIDR scheduling, enrichment stages and result output

mod enrichment;
mod orchestrator;
mod progress;
mod scheduler;
mod sink;

pub use enrichment::{EnrichmentPipeline, EnrichmentStage};
pub use orchestrator::Orchestrator;
pub use progress::{print_summary, ProgressReporter};
pub use scheduler::CidrScheduler;
pub use sink::{ResultSink, SinkError, SinkReport};
