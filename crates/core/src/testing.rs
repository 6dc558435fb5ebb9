// crates/core/src/testing.rs
//! Scripted in-process backend for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{JobStatusClient, ReportClient};
use crate::error::{ReportError, SubmissionError, TransportError};
use crate::types::{
    FindingGroup, FindingReview, JobId, JobRequest, ScanSummary, StatusReport, SubjectKey,
};

/// One scripted answer of the status endpoint.
#[derive(Debug, Clone)]
pub enum Script {
    Pending,
    Done(serde_json::Value),
    Error(Option<String>),
    Transport,
}

#[derive(Default)]
struct State {
    submit_results: HashMap<String, VecDeque<Result<String, String>>>,
    statuses: HashMap<String, VecDeque<Script>>,
    submit_calls: HashMap<String, u32>,
    status_calls: HashMap<String, u32>,
    next_id: u32,
    in_flight: u32,
    max_in_flight: u32,
    findings: Vec<FindingGroup>,
    finding_loads: u32,
}

pub struct ScriptedClient {
    state: Mutex<State>,
    latency: Mutex<Duration>,
    submit_latency: Mutex<Duration>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            latency: Mutex::new(Duration::ZERO),
            submit_latency: Mutex::new(Duration::ZERO),
        })
    }

    /// Delay applied to every status check.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn set_submit_latency(&self, latency: Duration) {
        *self.submit_latency.lock().unwrap() = latency;
    }

    /// Next submission for `subject` returns this job id.
    pub fn script_submit(&self, subject: &str, job_id: &str) {
        self.state
            .lock()
            .unwrap()
            .submit_results
            .entry(subject.to_string())
            .or_default()
            .push_back(Ok(job_id.to_string()));
    }

    /// Next submission for `subject` is rejected with `message`.
    pub fn reject_submit(&self, subject: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .submit_results
            .entry(subject.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    /// Answers for successive checks of `job_id`. Once exhausted, checks
    /// answer `pending`.
    pub fn script_status(&self, job_id: &str, answers: Vec<Script>) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(job_id.to_string(), answers.into());
    }

    pub fn set_findings(&self, findings: Vec<FindingGroup>) {
        self.state.lock().unwrap().findings = findings;
    }

    pub fn submit_calls(&self, subject: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .submit_calls
            .get(subject)
            .copied()
            .unwrap_or(0)
    }

    pub fn status_calls(&self, job_id: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .status_calls
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_concurrent_checks(&self) -> u32 {
        self.state.lock().unwrap().max_in_flight
    }

    pub fn finding_loads(&self) -> u32 {
        self.state.lock().unwrap().finding_loads
    }
}

struct InFlight<'a>(&'a Mutex<State>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.lock() {
            state.in_flight -= 1;
        }
    }
}

#[async_trait]
impl JobStatusClient for ScriptedClient {
    async fn submit(&self, request: &JobRequest) -> Result<JobId, SubmissionError> {
        let subject = request.subject().as_str().to_string();
        let scripted = {
            let mut state = self.state.lock().unwrap();
            *state.submit_calls.entry(subject.clone()).or_default() += 1;
            state.next_id += 1;
            let fallback = format!("job-{}", state.next_id);
            state
                .submit_results
                .get_mut(&subject)
                .and_then(|q| q.pop_front())
                .unwrap_or(Ok(fallback))
        };

        let latency = *self.submit_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        scripted.map(JobId::new).map_err(|message| SubmissionError::Rejected {
            status: 400,
            message,
        })
    }

    async fn get_status(&self, job_id: &JobId) -> Result<StatusReport, TransportError> {
        let next = {
            let mut state = self.state.lock().unwrap();
            *state.status_calls.entry(job_id.to_string()).or_default() += 1;
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state
                .statuses
                .get_mut(job_id.as_str())
                .and_then(|q| q.pop_front())
                .unwrap_or(Script::Pending)
        };
        let _guard = InFlight(&self.state);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match next {
            Script::Pending => Ok(StatusReport::pending()),
            Script::Done(payload) => Ok(StatusReport::done(payload)),
            Script::Error(detail) => Ok(StatusReport::error(detail)),
            Script::Transport => Err(TransportError::Unreachable("connection refused".into())),
        }
    }
}

#[async_trait]
impl ReportClient for ScriptedClient {
    async fn fetch_findings(&self) -> Result<Vec<FindingGroup>, ReportError> {
        let mut state = self.state.lock().unwrap();
        state.finding_loads += 1;
        Ok(state.findings.clone())
    }

    async fn list_scans(&self, _subject: &SubjectKey) -> Result<Vec<ScanSummary>, ReportError> {
        Ok(Vec::new())
    }

    async fn delete_scan(&self, scan_id: &str) -> Result<(), ReportError> {
        Err(ReportError::NotFound(scan_id.to_string()))
    }

    async fn fetch_sarif(&self, scan_id: &str) -> Result<serde_json::Value, ReportError> {
        Err(ReportError::NotFound(scan_id.to_string()))
    }

    async fn suppress_finding(
        &self,
        scan_id: &str,
        _fingerprint: &str,
    ) -> Result<serde_json::Value, ReportError> {
        Err(ReportError::NotFound(scan_id.to_string()))
    }

    async fn review_finding(
        &self,
        scan_id: &str,
        _fingerprint: &str,
    ) -> Result<FindingReview, ReportError> {
        Err(ReportError::NotFound(scan_id.to_string()))
    }
}
