// crates/core/src/types.rs
//! Job model shared by the tracker, the poll loop and the HTTP surface.
//!
//! Everything here is plain data. The [`JobTracker`](crate::tracker::JobTracker)
//! is the only component that mutates a [`Job`]; everyone else receives clones.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::SubmissionError;

/// Reserved subject key used by report-refresh jobs.
pub const REFRESH_SUBJECT: &str = "reports:refresh";

/// Look-back window of a refresh when the caller does not pick one.
pub const DEFAULT_REFRESH_DAYS: u32 = 7;

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque key identifying what is being scanned (`owner/repo` or a package path).
///
/// A subject has at most one in-flight job at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
    /// Build a scan subject key from user input. Surrounding whitespace is
    /// trimmed; an empty key is rejected the same way the backend rejects a
    /// missing repo. The reserved refresh key is rejected too, so a scan can
    /// never occupy the refresh job's slot.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, SubmissionError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() || trimmed == REFRESH_SUBJECT {
            return Err(SubmissionError::InvalidSubject(raw.as_ref().to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Key for reading or cancelling tracked state: any scan subject, or the
    /// reserved refresh key.
    pub fn lookup(raw: impl AsRef<str>) -> Result<Self, SubmissionError> {
        if raw.as_ref().trim() == REFRESH_SUBJECT {
            return Ok(Self::refresh());
        }
        Self::new(raw)
    }

    /// The subject shared by all report-refresh jobs.
    pub fn refresh() -> Self {
        Self(REFRESH_SUBJECT.to_string())
    }

    pub fn is_refresh(&self) -> bool {
        self.0 == REFRESH_SUBJECT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the backend hands out for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Kind of backend work a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Static-analysis scan of one subject.
    Scan,
    /// Bulk re-ingest of advisories for a number of past days.
    Refresh,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Refresh => "refresh",
        }
    }
}

/// A unit of work to submit to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    Scan { subject: SubjectKey },
    Refresh { days: u32 },
}

impl JobRequest {
    pub fn scan(subject: SubjectKey) -> Self {
        Self::Scan { subject }
    }

    pub fn refresh(days: u32) -> Self {
        Self::Refresh { days }
    }

    /// Subject the job is tracked under. All refreshes share one subject.
    pub fn subject(&self) -> SubjectKey {
        match self {
            Self::Scan { subject } => subject.clone(),
            Self::Refresh { .. } => SubjectKey::refresh(),
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::Scan { .. } => JobKind::Scan,
            Self::Refresh { .. } => JobKind::Refresh,
        }
    }
}

// =============================================================================
// Remote status
// =============================================================================

/// Status the backend reports for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Pending,
    Done,
    Error,
}

impl RemoteStatus {
    /// Parse the backend's status string. `running` counts as pending.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" | "running" | "queued" => Some(Self::Pending),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One answer from the status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: RemoteStatus,
    /// Server-provided failure detail, when the status is `Error`.
    pub error: Option<String>,
    /// Every other field of the response, kept opaque (e.g. `findings_count`).
    pub payload: serde_json::Value,
}

impl StatusReport {
    pub fn pending() -> Self {
        Self {
            status: RemoteStatus::Pending,
            error: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn done(payload: serde_json::Value) -> Self {
        Self {
            status: RemoteStatus::Done,
            error: None,
            payload,
        }
    }

    pub fn error(detail: Option<String>) -> Self {
        Self {
            status: RemoteStatus::Error,
            error: detail,
            payload: serde_json::Value::Null,
        }
    }
}

// =============================================================================
// Job state machine
// =============================================================================

/// Lifecycle phase of a subject's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Idle,
    Submitting,
    Polling,
    Done,
    Failed,
}

impl JobPhase {
    /// `Submitting` or `Polling`: a job exists and owns backend work.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Submitting | Self::Polling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Polling => "polling",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Why a job failed. The UI shows different copy per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The backend rejected the submission or could not be reached.
    Submission,
    /// A status check failed at the network layer.
    Transport,
    /// The backend reported the job itself as failed.
    Job,
    /// The job was cancelled before it finished.
    Cancelled,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Transport => "transport",
            Self::Job => "job",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Terminal result attached to a `Done` or `Failed` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Done {
        payload: serde_json::Value,
    },
    Failed {
        kind: FailureKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

/// Snapshot of one subject's job.
///
/// The tracker owns the authoritative copy; `get_state` and every
/// notification hand out clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub subject: SubjectKey,
    pub kind: JobKind,
    pub phase: JobPhase,
    /// Present once the submission succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_polled_at: Option<DateTime<Utc>>,
    /// Completed status checks.
    pub checks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    /// Tracker-wide sequence number of the job; 0 for an idle subject.
    #[ts(type = "number")]
    pub generation: u64,
}

impl Job {
    /// The state of a subject with no job.
    pub fn idle(subject: SubjectKey) -> Self {
        let kind = if subject.is_refresh() {
            JobKind::Refresh
        } else {
            JobKind::Scan
        };
        Self {
            subject,
            kind,
            phase: JobPhase::Idle,
            job_id: None,
            submitted_at: None,
            last_polled_at: None,
            checks: 0,
            outcome: None,
            generation: 0,
        }
    }

    pub(crate) fn submitting(request: &JobRequest, generation: u64) -> Self {
        Self {
            subject: request.subject(),
            kind: request.kind(),
            phase: JobPhase::Submitting,
            job_id: None,
            submitted_at: Some(Utc::now()),
            last_polled_at: None,
            checks: 0,
            outcome: None,
            generation,
        }
    }

    /// Server detail for failed jobs.
    pub fn failure(&self) -> Option<(FailureKind, Option<&str>)> {
        match &self.outcome {
            Some(JobOutcome::Failed { kind, detail }) => Some((*kind, detail.as_deref())),
            _ => None,
        }
    }
}

// =============================================================================
// Report data (external collaborator shapes)
// =============================================================================

/// Findings grouped by the repository or package they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
pub struct FindingGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg: Option<String>,
    /// Individual findings, passed through untouched.
    #[serde(default)]
    pub findings: Vec<serde_json::Value>,
}

impl FindingGroup {
    /// Subject a scan of this group would use, if the group has a repo.
    pub fn scan_subject(&self) -> Option<SubjectKey> {
        self.repo.as_deref().and_then(|r| SubjectKey::new(r).ok())
    }
}

/// One historical scan of a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
pub struct ScanSummary {
    #[serde(rename = "_id")]
    pub id: String,
    /// Unix seconds.
    #[ts(type = "number")]
    pub timestamp: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub findings_count: u64,
}

/// Automated verdict on one static-analysis finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
pub struct FindingReview {
    /// `true` when the finding looks like a real issue.
    pub verdict: bool,
    pub reason: String,
}
