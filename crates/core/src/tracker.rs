// crates/core/src/tracker.rs
//! Per-subject job orchestration.
//!
//! [`JobTracker`] maps each subject to at most one job, drives that job
//! through `Submitting -> Polling -> Done | Failed`, holds the terminal state
//! for the display window and then forgets it. Observers hear about every
//! transition, either per subject through callbacks or globally through a
//! broadcast channel.
//!
//! Every job carries a tracker-wide `generation`. Background tasks only touch
//! the entry whose generation they were started with, so a result that
//! arrives after a cancel or a replacement is silently dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use ts_rs::TS;

use crate::client::JobStatusClient;
use crate::config::TrackerConfig;
use crate::findings::FindingStore;
use crate::metrics;
use crate::poll::{PollLoop, PollOutcome};
use crate::types::{FailureKind, Job, JobOutcome, JobPhase, JobRequest, SubjectKey};

/// Per-subject observer callback. Runs on whichever task made the transition.
pub type Callback = Arc<dyn Fn(&Job) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// One transition, as seen on the global stream.
#[derive(Debug, Clone, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job: Job,
    pub at: DateTime<Utc>,
}

struct Entry {
    job: Job,
    cancel: CancellationToken,
    reset: Option<JoinHandle<()>>,
    started: Instant,
}

impl Entry {
    fn teardown(self) {
        self.cancel.cancel();
        if let Some(reset) = self.reset {
            reset.abort();
        }
    }
}

#[derive(Default)]
struct Observers {
    by_subject: HashMap<SubjectKey, Vec<(SubscriptionId, Callback)>>,
    /// Highest revision delivered per subject.
    delivered: HashMap<SubjectKey, u64>,
}

struct Inner {
    client: Arc<dyn JobStatusClient>,
    store: Option<Arc<dyn FindingStore>>,
    config: TrackerConfig,
    next_generation: AtomicU64,
    next_subscription: AtomicU64,
    /// Bumped under the entries lock on every transition.
    next_revision: AtomicU64,
    entries: Mutex<HashMap<SubjectKey, Entry>>,
    observers: Mutex<Observers>,
    events: broadcast::Sender<JobEvent>,
}

/// Orchestrates at most one in-flight job per subject.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<Inner>,
}

impl JobTracker {
    pub fn new(client: Arc<dyn JobStatusClient>, config: TrackerConfig) -> Self {
        Self::with_store(client, None, config)
    }

    /// Like [`new`](Self::new), and ask `store` to reload after every job that
    /// ends in `Done`.
    pub fn with_store(
        client: Arc<dyn JobStatusClient>,
        store: Option<Arc<dyn FindingStore>>,
        config: TrackerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                config,
                next_generation: AtomicU64::new(1),
                next_subscription: AtomicU64::new(1),
                next_revision: AtomicU64::new(1),
                entries: Mutex::new(HashMap::new()),
                observers: Mutex::new(Observers::default()),
                events,
            }),
        }
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Start a job for the request's subject, or return the one already in
    /// flight.
    ///
    /// Returns immediately with the `Submitting` snapshot; submission and
    /// polling continue on a background task. Must be called inside a Tokio
    /// runtime.
    pub fn start(&self, request: JobRequest) -> Job {
        let subject = request.subject();
        let (job, cancel, revision) = {
            let mut entries = self.entries();
            if let Some(existing) = entries.get(&subject) {
                if existing.job.phase.is_in_flight() {
                    tracing::debug!(
                        subject = %subject,
                        generation = existing.job.generation,
                        "Job already in flight, returning existing"
                    );
                    metrics::record_deduplicated();
                    return existing.job.clone();
                }
            }
            // A terminal job still on display is replaced outright.
            if let Some(previous) = entries.remove(&subject) {
                previous.teardown();
            }

            let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
            let job = Job::submitting(&request, generation);
            let cancel = CancellationToken::new();
            entries.insert(
                subject.clone(),
                Entry {
                    job: job.clone(),
                    cancel: cancel.clone(),
                    reset: None,
                    started: Instant::now(),
                },
            );
            (job, cancel, self.bump_revision())
        };

        tracing::info!(
            subject = %subject,
            kind = job.kind.as_str(),
            generation = job.generation,
            "Job started"
        );
        metrics::record_job_started(job.kind);
        self.notify(&job, revision);

        tokio::spawn(self.clone().drive(request, job.generation, cancel));
        job
    }

    /// Current state of `subject`; `Idle` when nothing is tracked.
    pub fn get_state(&self, subject: &SubjectKey) -> Job {
        self.entries()
            .get(subject)
            .map(|e| e.job.clone())
            .unwrap_or_else(|| Job::idle(subject.clone()))
    }

    /// Every tracked job, in flight or on display, oldest first.
    pub fn active_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.entries().values().map(|e| e.job.clone()).collect();
        jobs.sort_by_key(|j| j.generation);
        jobs
    }

    /// Cancel the in-flight job for `subject`. Returns `false` when there is
    /// none. The job ends as `Failed` with kind `Cancelled`.
    pub fn cancel(&self, subject: &SubjectKey) -> bool {
        let (job, revision, elapsed) = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(subject) else {
                return false;
            };
            if !entry.job.phase.is_in_flight() {
                return false;
            }
            entry.cancel.cancel();
            let outcome = JobOutcome::Failed {
                kind: FailureKind::Cancelled,
                detail: None,
            };
            self.conclude(entry, outcome, false);
            (entry.job.clone(), self.bump_revision(), entry.started.elapsed())
        };

        tracing::info!(subject = %subject, generation = job.generation, "Job cancelled");
        metrics::record_outcome(job.kind, FailureKind::Cancelled.as_str(), Some(elapsed));
        self.notify(&job, revision);
        true
    }

    /// Register `callback` for every transition of `subject`.
    pub fn subscribe(
        &self,
        subject: &SubjectKey,
        callback: impl Fn(&Job) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers()
            .by_subject
            .entry(subject.clone())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Never affects the job itself.
    pub fn unsubscribe(&self, subject: &SubjectKey, id: SubscriptionId) -> bool {
        let tracked = self.entries().contains_key(subject);
        let mut observers = self.observers();
        let Some(list) = observers.by_subject.get_mut(subject) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            observers.by_subject.remove(subject);
            if !tracked {
                observers.delivered.remove(subject);
            }
        }
        removed
    }

    /// Stream of every transition for every subject (for SSE).
    pub fn subscribe_all(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until the job currently tracked for `subject` leaves flight.
    ///
    /// Returns the terminal snapshot, or whatever replaced it if the job was
    /// superseded. Returns immediately when nothing is in flight.
    pub async fn wait_for_terminal(&self, subject: &SubjectKey) -> Job {
        let mut rx = self.subscribe_all();
        let current = self.get_state(subject);
        if !current.phase.is_in_flight() {
            return current;
        }
        let generation = current.generation;

        loop {
            match rx.recv().await {
                Ok(event) if event.job.subject == *subject => {
                    let job = event.job;
                    if job.generation != generation || !job.phase.is_in_flight() {
                        return job;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    let now = self.get_state(subject);
                    if now.generation != generation || !now.phase.is_in_flight() {
                        return now;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return self.get_state(subject),
            }
        }
    }

    /// Cancel every in-flight job and pending reset, and forget all entries.
    pub fn shutdown(&self) {
        let drained: Vec<Entry> = self.entries().drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            entry.teardown();
        }
        {
            let mut observers = self.observers();
            let Observers {
                by_subject,
                delivered,
            } = &mut *observers;
            delivered.retain(|subject, _| by_subject.contains_key(subject));
        }
        tracing::info!(jobs = count, "Job tracker shut down");
    }

    // =========================================================================
    // Background work
    // =========================================================================

    async fn drive(self, request: JobRequest, generation: u64, cancel: CancellationToken) {
        let subject = request.subject();

        // -- Submit ----------------------------------------------------------
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = self.inner.client.submit(&request) => result,
        };
        let job_id = match submitted {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(subject = %subject, error = %e, "Submission failed");
                let outcome = JobOutcome::Failed {
                    kind: FailureKind::Submission,
                    detail: Some(e.detail()),
                };
                self.finish(&subject, generation, outcome, false);
                return;
            }
        };

        let polling = self.transition(&subject, generation, true, |job| {
            job.phase = JobPhase::Polling;
            job.job_id = Some(job_id.clone());
        });
        if !polling {
            return;
        }
        tracing::info!(subject = %subject, job_id = %job_id, "Job submitted, polling");

        // -- Poll ------------------------------------------------------------
        let tracker = self.clone();
        let progress_subject = subject.clone();
        let outcome = PollLoop::new(
            Arc::clone(&self.inner.client),
            job_id,
            self.inner.config.poll_interval(),
        )
        .max_transport_retries(self.inner.config.max_transport_retries)
        .on_check(move |checks| {
            // The Polling announcement made on submission covers the first
            // interval; each later pending check is announced once.
            let announce = checks > 1;
            tracker.transition(&progress_subject, generation, announce, |job| {
                job.checks = checks;
                job.last_polled_at = Some(Utc::now());
            });
        })
        .run(cancel)
        .await;

        let outcome = match outcome {
            PollOutcome::Cancelled => return,
            PollOutcome::Done(payload) => JobOutcome::Done { payload },
            PollOutcome::JobFailed(detail) => JobOutcome::Failed {
                kind: FailureKind::Job,
                detail,
            },
            PollOutcome::Transport(e) => JobOutcome::Failed {
                kind: FailureKind::Transport,
                detail: Some(e.to_string()),
            },
        };
        self.finish(&subject, generation, outcome, true);
    }

    /// Apply `f` to the in-flight job of `generation` and, when `announce` is
    /// set, notify observers. Returns `false` if that job is gone or already
    /// terminal.
    fn transition(
        &self,
        subject: &SubjectKey,
        generation: u64,
        announce: bool,
        f: impl FnOnce(&mut Job),
    ) -> bool {
        let (job, revision) = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(subject) else {
                return false;
            };
            if entry.job.generation != generation || !entry.job.phase.is_in_flight() {
                return false;
            }
            f(&mut entry.job);
            if !announce {
                return true;
            }
            (entry.job.clone(), self.bump_revision())
        };
        self.notify(&job, revision);
        true
    }

    fn finish(&self, subject: &SubjectKey, generation: u64, outcome: JobOutcome, checked: bool) {
        let (job, revision, elapsed) = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(subject) else {
                return;
            };
            if entry.job.generation != generation || !entry.job.phase.is_in_flight() {
                tracing::debug!(subject = %subject, generation, "Discarding stale job result");
                return;
            }
            self.conclude(entry, outcome, checked);
            (entry.job.clone(), self.bump_revision(), entry.started.elapsed())
        };

        match job.failure() {
            None => {
                tracing::info!(subject = %subject, checks = job.checks, "Job done");
                metrics::record_outcome(job.kind, "done", Some(elapsed));
            }
            Some((kind, detail)) => {
                tracing::warn!(
                    subject = %subject,
                    kind = kind.as_str(),
                    detail = detail.unwrap_or(""),
                    "Job failed"
                );
                metrics::record_outcome(job.kind, kind.as_str(), Some(elapsed));
            }
        }

        self.notify(&job, revision);

        if job.phase == JobPhase::Done {
            if let Some(store) = &self.inner.store {
                store.request_reload();
            }
        }
    }

    /// Move `entry` to its terminal phase and arm the idle reset.
    fn conclude(&self, entry: &mut Entry, outcome: JobOutcome, checked: bool) {
        entry.job.phase = match outcome {
            JobOutcome::Done { .. } => JobPhase::Done,
            JobOutcome::Failed { .. } => JobPhase::Failed,
        };
        if checked {
            entry.job.checks += 1;
            entry.job.last_polled_at = Some(Utc::now());
        }
        entry.job.outcome = Some(outcome);

        let tracker = self.clone();
        let subject = entry.job.subject.clone();
        let generation = entry.job.generation;
        let window = self.inner.config.display_window();
        entry.reset = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            tracker.reset(&subject, generation);
        }));
    }

    fn reset(&self, subject: &SubjectKey, generation: u64) {
        let revision = {
            let mut entries = self.entries();
            match entries.get(subject) {
                Some(e) if e.job.generation == generation && e.job.phase.is_terminal() => {}
                _ => return,
            }
            entries.remove(subject);
            self.bump_revision()
        };
        tracing::debug!(subject = %subject, generation, "Display window elapsed, subject idle");
        self.notify(&Job::idle(subject.clone()), revision);
    }

    // =========================================================================
    // Notification
    // =========================================================================

    /// Deliver `job` to observers unless a newer transition of the same
    /// subject already went out. Callbacks run with no lock held.
    fn notify(&self, job: &Job, revision: u64) {
        let callbacks: Vec<Callback> = {
            let mut observers = self.observers();
            let delivered = observers.delivered.get(&job.subject).copied().unwrap_or(0);
            if revision <= delivered {
                tracing::debug!(subject = %job.subject, revision, "Dropping out-of-order notification");
                return;
            }
            // An idle subject nobody listens to needs no ordering state.
            if job.phase == JobPhase::Idle && !observers.by_subject.contains_key(&job.subject) {
                observers.delivered.remove(&job.subject);
            } else {
                observers.delivered.insert(job.subject.clone(), revision);
            }

            // No receivers is fine.
            let _ = self.inner.events.send(JobEvent {
                job: job.clone(),
                at: Utc::now(),
            });

            observers
                .by_subject
                .get(&job.subject)
                .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            callback(job);
        }
    }

    #[cfg(test)]
    fn ordered_subjects(&self) -> usize {
        self.observers().delivered.len()
    }

    fn bump_revision(&self) -> u64 {
        self.inner.next_revision.fetch_add(1, Ordering::SeqCst)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SubjectKey, Entry>> {
        self.inner.entries.lock().unwrap_or_else(|e| {
            tracing::error!("Mutex poisoned on job entries: {e}");
            e.into_inner()
        })
    }

    fn observers(&self) -> MutexGuard<'_, Observers> {
        self.inner.observers.lock().unwrap_or_else(|e| {
            tracing::error!("Mutex poisoned on job observers: {e}");
            e.into_inner()
        })
    }
}
