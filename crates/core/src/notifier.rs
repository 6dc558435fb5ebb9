// crates/core/src/notifier.rs
//! Short-lived status messages derived from job transitions.
//!
//! Each subject shows at most one message. In-flight messages stay until
//! replaced; terminal ones expire after a TTL. Posting a newer message for a
//! subject cancels the older one's expiry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use ts_rs::TS;

use crate::config::NotifierConfig;
use crate::tracker::JobTracker;
use crate::types::{FailureKind, Job, JobKind, JobPhase, SubjectKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// The message currently shown for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub subject: SubjectKey,
    pub text: String,
    pub level: NoticeLevel,
    /// Generation of the job the message describes.
    #[ts(type = "number")]
    pub generation: u64,
    pub posted_at: DateTime<Utc>,
    /// `None` while the job is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NoticeEvent {
    Posted { notice: Notice },
    Cleared { subject: SubjectKey },
}

/// Message text and level for a job snapshot. `None` for idle subjects.
pub fn notice_text(job: &Job) -> Option<(String, NoticeLevel)> {
    let refresh = job.kind == JobKind::Refresh;
    let text = match job.phase {
        JobPhase::Idle => return None,
        JobPhase::Submitting | JobPhase::Polling => {
            let text = if refresh { "Refreshing..." } else { "Scanning..." };
            return Some((text.to_string(), NoticeLevel::Info));
        }
        JobPhase::Done => {
            let text = if refresh { "Refresh complete!" } else { "Scan complete" };
            return Some((text.to_string(), NoticeLevel::Success));
        }
        JobPhase::Failed => match job.failure() {
            Some((FailureKind::Cancelled, _)) if refresh => "Refresh cancelled".to_string(),
            Some((FailureKind::Cancelled, _)) => "Scan cancelled".to_string(),
            _ if refresh => "Refresh failed!".to_string(),
            Some((FailureKind::Submission, detail)) => {
                format!("Error: {}", detail.unwrap_or("submission failed"))
            }
            Some((FailureKind::Transport, _)) => "Error contacting server".to_string(),
            Some((FailureKind::Job, Some(detail))) => format!("Scan failed: {detail}"),
            Some((FailureKind::Job, None)) | None => "Scan failed".to_string(),
        },
    };
    Some((text, NoticeLevel::Error))
}

struct Slot {
    notice: Notice,
    seq: u64,
    expiry: Option<JoinHandle<()>>,
}

struct Inner {
    config: NotifierConfig,
    next_seq: AtomicU64,
    slots: Mutex<HashMap<SubjectKey, Slot>>,
    events: broadcast::Sender<NoticeEvent>,
}

/// Per-subject auto-expiring messages.
#[derive(Clone)]
pub struct ResultNotifier {
    inner: Arc<Inner>,
}

impl ResultNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                config,
                next_seq: AtomicU64::new(1),
                slots: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Follow every transition of `tracker` on a background task.
    pub fn attach(&self, tracker: &JobTracker) -> JoinHandle<()> {
        let mut rx = tracker.subscribe_all();
        let tracker = tracker.clone();
        let notifier = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => notifier.observe(&event.job),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Notifier lagged behind job events, resyncing");
                        for job in tracker.active_jobs() {
                            notifier.observe(&job);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Project one job snapshot onto its subject's message.
    pub fn observe(&self, job: &Job) {
        let Some((text, level)) = notice_text(job) else {
            return;
        };

        let ttl = match job.phase {
            JobPhase::Done | JobPhase::Failed => Some(self.ttl_for(job.kind)),
            _ => None,
        };

        let posted_at = Utc::now();
        let notice = Notice {
            subject: job.subject.clone(),
            text,
            level,
            generation: job.generation,
            posted_at,
            expires_at: ttl
                .and_then(|t| chrono::Duration::from_std(t).ok())
                .map(|d| posted_at + d),
        };

        {
            let mut slots = self.slots();
            if let Some(current) = slots.get(&job.subject) {
                // Repeated pending checks keep the existing message.
                if current.notice.generation == notice.generation
                    && current.notice.text == notice.text
                {
                    return;
                }
            }

            let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
            let expiry = ttl.map(|ttl| self.schedule_expiry(job.subject.clone(), seq, ttl));
            if let Some(previous) = slots.insert(
                job.subject.clone(),
                Slot {
                    notice: notice.clone(),
                    seq,
                    expiry,
                },
            ) {
                if let Some(handle) = previous.expiry {
                    handle.abort();
                }
            }
            let _ = self.inner.events.send(NoticeEvent::Posted {
                notice: notice.clone(),
            });
        }

        tracing::debug!(subject = %notice.subject, text = %notice.text, "Notice posted");
    }

    pub fn message(&self, subject: &SubjectKey) -> Option<Notice> {
        self.slots().get(subject).map(|s| s.notice.clone())
    }

    /// Every visible message, oldest first.
    pub fn messages(&self) -> Vec<Notice> {
        let mut all: Vec<Notice> = self.slots().values().map(|s| s.notice.clone()).collect();
        all.sort_by_key(|n| n.posted_at);
        all
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NoticeEvent> {
        self.inner.events.subscribe()
    }

    fn ttl_for(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Scan => self.inner.config.message_ttl(),
            JobKind::Refresh => self.inner.config.refresh_message_ttl(),
        }
    }

    fn schedule_expiry(&self, subject: SubjectKey, seq: u64, ttl: Duration) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            notifier.expire(&subject, seq);
        })
    }

    fn expire(&self, subject: &SubjectKey, seq: u64) {
        let mut slots = self.slots();
        match slots.get(subject) {
            Some(slot) if slot.seq == seq => {}
            _ => return,
        }
        slots.remove(subject);
        let _ = self.inner.events.send(NoticeEvent::Cleared {
            subject: subject.clone(),
        });
        tracing::debug!(subject = %subject, "Notice expired");
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SubjectKey, Slot>> {
        self.inner.slots.lock().unwrap_or_else(|e| {
            tracing::error!("Mutex poisoned on notices: {e}");
            e.into_inner()
        })
    }
}
