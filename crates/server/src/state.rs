// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use scanwatch_core::{
    Config, FindingCache, FindingStore, HttpBackend, JobStatusClient, JobTracker, ReportClient,
    ResultNotifier,
};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: Config,
    /// Per-subject job orchestration.
    pub tracker: JobTracker,
    /// Auto-expiring per-subject messages, fed by `tracker`.
    pub notifier: ResultNotifier,
    /// Finding groups, reloaded after every completed job.
    pub findings: FindingCache,
    /// Scan-history endpoints of the backend.
    pub reports: Arc<dyn ReportClient>,
}

impl AppState {
    /// Build state backed by the HTTP scan backend named in `config`.
    ///
    /// Must be called inside a Tokio runtime (the notifier spawns its
    /// listener task).
    pub fn new(config: Config) -> Result<Arc<Self>, reqwest::Error> {
        let backend = Arc::new(HttpBackend::new(&config.backend)?);
        Ok(Self::with_clients(config, backend.clone(), backend))
    }

    /// Build state from explicit clients (tests, alternative transports).
    pub fn with_clients(
        config: Config,
        jobs: Arc<dyn JobStatusClient>,
        reports: Arc<dyn ReportClient>,
    ) -> Arc<Self> {
        let findings = FindingCache::new(Arc::clone(&reports));
        let store: Arc<dyn FindingStore> = Arc::new(findings.clone());
        let tracker = JobTracker::with_store(jobs, Some(store), config.tracker.clone());
        let notifier = ResultNotifier::new(config.notifier.clone());
        notifier.attach(&tracker);

        Arc::new(Self {
            start_time: Instant::now(),
            config,
            tracker,
            notifier,
            findings,
            reports,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
