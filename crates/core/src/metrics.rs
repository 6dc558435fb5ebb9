// crates/core/src/metrics.rs
//! Job lifecycle metrics.
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed (the server installs the Prometheus one).

use std::time::Duration;

use metrics::{counter, histogram};

use crate::types::JobKind;

pub const JOBS_STARTED: &str = "scan_jobs_started_total";
pub const JOBS_DEDUPLICATED: &str = "scan_jobs_deduplicated_total";
pub const JOB_OUTCOMES: &str = "scan_job_outcomes_total";
pub const STATUS_CHECKS: &str = "scan_status_checks_total";
pub const JOB_DURATION: &str = "scan_job_duration_seconds";

pub(crate) fn record_job_started(kind: JobKind) {
    counter!(JOBS_STARTED, "kind" => kind.as_str()).increment(1);
}

pub(crate) fn record_deduplicated() {
    counter!(JOBS_DEDUPLICATED).increment(1);
}

/// `outcome` is `done` or a failure kind (`submission`, `transport`, ...).
pub(crate) fn record_outcome(kind: JobKind, outcome: &'static str, elapsed: Option<Duration>) {
    counter!(JOB_OUTCOMES, "kind" => kind.as_str(), "outcome" => outcome).increment(1);
    if let Some(elapsed) = elapsed {
        histogram!(JOB_DURATION, "kind" => kind.as_str()).record(elapsed.as_secs_f64());
    }
}

pub(crate) fn record_status_check() {
    counter!(STATUS_CHECKS).increment(1);
}
