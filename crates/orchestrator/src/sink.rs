//! Result sink: one JSON object per line, optionally echoed to stdout
//!
//! Lines go straight to the underlying writer. A record is only reported as
//! dropped when none of its bytes reached the output; a line that fails part
//! way through is retried from where it stopped.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use sslsearch_common::{Finding, SslSearchError};

/// Attempts to finish a line once some of it has been written.
const PARTIAL_RETRIES: usize = 3;

/// What the sink did with the findings it received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub written: u64,
    pub dropped: u64,
    /// Lines that reached the output incomplete.
    pub truncated: u64,
}

/// Outcome of a failed `write`.
#[derive(Debug)]
pub enum SinkError {
    /// Nothing of the record reached the output.
    Dropped(SslSearchError),
    /// Part of the line was written before the writer gave up.
    Truncated { written: usize, error: SslSearchError },
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Dropped(e) => write!(f, "{e}"),
            SinkError::Truncated { written, error } => {
                write!(f, "line cut after {written} bytes: {error}")
            }
        }
    }
}

pub struct ResultSink<W> {
    out: W,
    console: bool,
}

impl<W: AsyncWrite + Unpin + Send> ResultSink<W> {
    pub fn new(out: W, console: bool) -> Self {
        Self { out, console }
    }

    /// Serialize and write one finding; flushed so a killed scan keeps what it found.
    pub async fn write(&mut self, finding: &Finding) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&finding.to_record()).map_err(|e| {
            SinkError::Dropped(SslSearchError::Output(format!(
                "cannot serialize finding: {e}"
            )))
        })?;
        line.push(b'\n');
        self.write_line(&line).await?;

        if let Err(e) = self.out.flush().await {
            // the bytes were handed over; a later write reports a lasting fault
            warn!("output flush failed: {}", e);
        }
        if self.console {
            print!("{}", String::from_utf8_lossy(&line));
        }
        Ok(())
    }

    async fn write_line(&mut self, line: &[u8]) -> Result<(), SinkError> {
        let mut sent = 0;
        let mut retries = 0;
        while sent < line.len() {
            let error = match self.out.write(&line[sent..]).await {
                Ok(0) => SslSearchError::Output("output closed".into()),
                Ok(n) => {
                    sent += n;
                    continue;
                }
                Err(e) => SslSearchError::Io(e),
            };
            if sent == 0 {
                return Err(SinkError::Dropped(error));
            }
            if retries == PARTIAL_RETRIES {
                return Err(SinkError::Truncated { written: sent, error });
            }
            retries += 1;
        }
        Ok(())
    }

    /// Drain `rx` until every upstream sender is gone.
    pub async fn run(&mut self, mut rx: mpsc::UnboundedReceiver<Finding>) -> SinkReport {
        let mut report = SinkReport::default();
        while let Some(finding) = rx.recv().await {
            match self.write(&finding).await {
                Ok(()) => report.written += 1,
                Err(e @ SinkError::Dropped(_)) => {
                    warn!("dropping finding for {}: {}", finding.result.target, e);
                    report.dropped += 1;
                }
                Err(e @ SinkError::Truncated { .. }) => {
                    warn!("incomplete record for {}: {}", finding.result.target, e);
                    report.truncated += 1;
                }
            }
        }
        if let Err(e) = self.out.flush().await {
            warn!("final output flush failed: {}", e);
        }
        debug!(
            "sink closed: {} written, {} dropped, {} truncated",
            report.written, report.dropped, report.truncated
        );
        report
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
