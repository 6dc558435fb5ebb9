// crates/core/src/poll.rs
//! Repeated status checks for one job id.
//!
//! A [`PollLoop`] sleeps one interval, checks, and repeats until the backend
//! reports a terminal status, transport failures exceed the retry budget, or
//! the loop is cancelled. Checks never overlap: the next sleep starts only
//! after the previous check has returned.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::JobStatusClient;
use crate::error::TransportError;
use crate::metrics;
use crate::types::{JobId, RemoteStatus};

/// How a poll loop ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// Backend reported `done`; carries the full status body.
    Done(serde_json::Value),
    /// Backend reported `error`, with its detail if it sent one.
    JobFailed(Option<String>),
    /// Transport failures exhausted the retry budget.
    Transport(TransportError),
    Cancelled,
}

type CheckCallback = Box<dyn Fn(u32) + Send + Sync>;

/// Drives status checks for a single job.
pub struct PollLoop {
    client: Arc<dyn JobStatusClient>,
    job_id: JobId,
    interval: Duration,
    max_transport_retries: u32,
    on_check: Option<CheckCallback>,
}

impl PollLoop {
    pub fn new(client: Arc<dyn JobStatusClient>, job_id: JobId, interval: Duration) -> Self {
        Self {
            client,
            job_id,
            interval,
            max_transport_retries: 0,
            on_check: None,
        }
    }

    /// Tolerate up to `retries` consecutive transport failures.
    pub fn max_transport_retries(mut self, retries: u32) -> Self {
        self.max_transport_retries = retries;
        self
    }

    /// Called after every non-terminal check with the number of checks so far.
    pub fn on_check(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_check = Some(Box::new(f));
        self
    }

    /// Run until a terminal result or until `cancel` fires.
    ///
    /// Cancellation wins every race: once the token is cancelled no new
    /// `get_status` call starts, and a check already in flight is dropped.
    pub async fn run(self, cancel: CancellationToken) -> PollOutcome {
        let mut checks: u32 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = tokio::time::sleep(self.interval) => {}
            }
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                result = self.client.get_status(&self.job_id) => result,
            };
            checks += 1;
            metrics::record_status_check();

            match result {
                Ok(report) => {
                    consecutive_failures = 0;
                    match report.status {
                        RemoteStatus::Pending => {
                            tracing::debug!(job_id = %self.job_id, checks, "Job still pending");
                        }
                        RemoteStatus::Done => return PollOutcome::Done(report.payload),
                        RemoteStatus::Error => return PollOutcome::JobFailed(report.error),
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures > self.max_transport_retries {
                        return PollOutcome::Transport(e);
                    }
                    tracing::warn!(
                        job_id = %self.job_id,
                        attempt = consecutive_failures,
                        max_retries = self.max_transport_retries,
                        error = %e,
                        "Status check failed, retrying"
                    );
                }
            }

            if let Some(cb) = &self.on_check {
                cb(checks);
            }
        }
    }
}
