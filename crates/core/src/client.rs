// crates/core/src/client.rs
//! Backend transport.
//!
//! [`JobStatusClient`] is the only thing the polling core needs from the
//! network: submit a job, ask for its status. [`ReportClient`] covers the
//! finding-set, scan-history and SARIF endpoints. Neither keeps state or retries;
//! retry policy lives in [`PollLoop`](crate::poll::PollLoop).

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::BackendConfig;
use crate::error::{ReportError, SubmissionError, TransportError};
use crate::types::{
    FindingGroup, FindingReview, JobId, JobRequest, RemoteStatus, ScanSummary, StatusReport,
    SubjectKey,
};

/// Submit-and-check interface to the job backend.
#[async_trait]
pub trait JobStatusClient: Send + Sync {
    /// Submit a unit of work and return the backend's job id.
    async fn submit(&self, request: &JobRequest) -> Result<JobId, SubmissionError>;

    /// Ask for the current status of a previously submitted job.
    async fn get_status(&self, job_id: &JobId) -> Result<StatusReport, TransportError>;
}

/// Access to loaded findings, per-subject scan history and the SARIF log of
/// each scan.
#[async_trait]
pub trait ReportClient: Send + Sync {
    async fn fetch_findings(&self) -> Result<Vec<FindingGroup>, ReportError>;

    async fn list_scans(&self, subject: &SubjectKey) -> Result<Vec<ScanSummary>, ReportError>;

    async fn delete_scan(&self, scan_id: &str) -> Result<(), ReportError>;

    /// Full SARIF log of one scan, passed through untouched.
    async fn fetch_sarif(&self, scan_id: &str) -> Result<serde_json::Value, ReportError>;

    /// Mark the result carrying `fingerprint` as suppressed. Returns the
    /// updated log.
    async fn suppress_finding(
        &self,
        scan_id: &str,
        fingerprint: &str,
    ) -> Result<serde_json::Value, ReportError>;

    /// Ask the backend for an automated review of one result.
    async fn review_finding(
        &self,
        scan_id: &str,
        fingerprint: &str,
    ) -> Result<FindingReview, ReportError>;
}

/// Body of the submit endpoints. Scans answer `job_id`, refreshes `_id`.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default, rename = "_id")]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Body of `GET /job_status/{id}`; all other fields become the payload.
#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// Body of `POST /scan/review`: either a review or the reason there is none.
#[derive(Debug, Deserialize)]
struct ReviewBody {
    #[serde(default)]
    review: Option<FindingReview>,
    #[serde(default)]
    error: Option<String>,
}

/// reqwest-backed implementation of both client traits.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
}

impl HttpBackend {
    /// Build a client whose every request is bounded by `request_timeout`.
    pub fn new(config: &BackendConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let base = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.api_prefix.trim_matches('/')
        );
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl JobStatusClient for HttpBackend {
    async fn submit(&self, request: &JobRequest) -> Result<JobId, SubmissionError> {
        let builder = match request {
            JobRequest::Scan { subject } => self
                .client
                .post(self.url("scan"))
                .json(&serde_json::json!({ "repo": subject.as_str() })),
            JobRequest::Refresh { days } => self
                .client
                .get(self.url("refresh_reports"))
                .query(&[("days", days)]),
        };

        let resp = builder.send().await.map_err(SubmissionError::from_reqwest)?;
        let status = resp.status();
        let body = resp.text().await.map_err(SubmissionError::from_reqwest)?;

        let parsed: Option<SubmitResponse> = serde_json::from_str(&body).ok();
        if !status.is_success() {
            let message = parsed
                .and_then(|p| p.error)
                .unwrap_or_else(|| body.trim().to_string());
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed = parsed
            .ok_or_else(|| SubmissionError::Malformed(format!("not a submit response: {body}")))?;
        match (parsed.job_id.or(parsed.id), parsed.error) {
            (Some(id), _) if !id.is_empty() => Ok(JobId::new(id)),
            (_, Some(message)) => Err(SubmissionError::Rejected {
                status: status.as_u16(),
                message,
            }),
            _ => Err(SubmissionError::Malformed("response has no job id".into())),
        }
    }

    async fn get_status(&self, job_id: &JobId) -> Result<StatusReport, TransportError> {
        let url = self.url(&format!("job_status/{}", urlencoding::encode(job_id.as_str())));
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = resp.json().await.map_err(TransportError::from_reqwest)?;
        let parsed: StatusBody = serde_json::from_value(payload.clone())
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        let remote = RemoteStatus::parse(&parsed.status).ok_or_else(|| {
            TransportError::Malformed(format!("unknown status {:?}", parsed.status))
        })?;

        Ok(StatusReport {
            status: remote,
            error: parsed.error,
            payload,
        })
    }
}

#[async_trait]
impl ReportClient for HttpBackend {
    async fn fetch_findings(&self) -> Result<Vec<FindingGroup>, ReportError> {
        let resp = self
            .client
            .get(self.url("reports"))
            .send()
            .await
            .map_err(ReportError::from_reqwest)?;
        let resp = check_report_status(resp, "reports").await?;
        resp.json().await.map_err(ReportError::from_reqwest)
    }

    async fn list_scans(&self, subject: &SubjectKey) -> Result<Vec<ScanSummary>, ReportError> {
        let url = self.url(&format!("scans/{}", urlencoding::encode(subject.as_str())));
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ReportError::from_reqwest)?;
        let resp = check_report_status(resp, subject.as_str()).await?;
        resp.json().await.map_err(ReportError::from_reqwest)
    }

    async fn delete_scan(&self, scan_id: &str) -> Result<(), ReportError> {
        let url = self.url(&format!("scans/delete/{}", urlencoding::encode(scan_id)));
        let resp = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(ReportError::from_reqwest)?;
        check_report_status(resp, scan_id).await?;
        Ok(())
    }

    async fn fetch_sarif(&self, scan_id: &str) -> Result<serde_json::Value, ReportError> {
        let url = self.url(&format!("sarif/{}", urlencoding::encode(scan_id)));
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ReportError::from_reqwest)?;
        let resp = check_report_status(resp, scan_id).await?;
        resp.json().await.map_err(ReportError::from_reqwest)
    }

    async fn suppress_finding(
        &self,
        scan_id: &str,
        fingerprint: &str,
    ) -> Result<serde_json::Value, ReportError> {
        // The backend exposes suppression as a GET.
        let url = self.url(&format!("sarif/{}/suppress", urlencoding::encode(scan_id)));
        let resp = self
            .client
            .get(url)
            .query(&[("fingerprint", fingerprint)])
            .send()
            .await
            .map_err(ReportError::from_reqwest)?;
        let resp = check_report_status(resp, scan_id).await?;
        resp.json().await.map_err(ReportError::from_reqwest)
    }

    async fn review_finding(
        &self,
        scan_id: &str,
        fingerprint: &str,
    ) -> Result<FindingReview, ReportError> {
        let resp = self
            .client
            .post(self.url("scan/review"))
            .json(&serde_json::json!({ "scan_id": scan_id, "fingerprint_id": fingerprint }))
            .send()
            .await
            .map_err(ReportError::from_reqwest)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ReportError::NotFound(scan_id.to_string()));
        }
        let body = resp.text().await.map_err(ReportError::from_reqwest)?;
        let parsed: Option<ReviewBody> = serde_json::from_str(&body).ok();

        // The backend reports a missing key or finding as `{error}`, with
        // either status.
        if let Some(message) = parsed.as_ref().and_then(|p| p.error.clone()) {
            return Err(ReportError::Rejected(message));
        }
        if !status.is_success() {
            return Err(ReportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parsed
            .and_then(|p| p.review)
            .ok_or_else(|| ReportError::Malformed(format!("not a review response: {body}")))
    }
}

async fn check_report_status(
    resp: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, ReportError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ReportError::NotFound(what.to_string()));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ReportError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}
