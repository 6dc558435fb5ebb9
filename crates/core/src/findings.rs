// crates/core/src/findings.rs
//! Loaded finding sets.
//!
//! The tracker only needs [`FindingStore::request_reload`]. [`FindingCache`]
//! is the in-memory implementation the server uses.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;

use crate::client::ReportClient;
use crate::error::ReportError;
use crate::types::FindingGroup;

/// Something holding finding collections that can be told to refresh.
pub trait FindingStore: Send + Sync {
    /// Fire-and-forget. Must not block the caller.
    fn request_reload(&self);
}

/// Last successfully loaded finding groups.
#[derive(Debug, Clone, Default, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct FindingSnapshot {
    pub groups: Vec<FindingGroup>,
    pub loaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReloadState {
    Idle,
    Running,
    /// Running, and another request arrived meanwhile.
    Queued,
}

struct CacheInner {
    client: Arc<dyn ReportClient>,
    snapshot: RwLock<Arc<FindingSnapshot>>,
    reload: Mutex<ReloadState>,
}

/// Finding groups fetched through a [`ReportClient`], reloaded on request.
///
/// Requests made while a reload runs collapse into a single follow-up load.
#[derive(Clone)]
pub struct FindingCache {
    inner: Arc<CacheInner>,
}

impl FindingCache {
    pub fn new(client: Arc<dyn ReportClient>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                client,
                snapshot: RwLock::new(Arc::new(FindingSnapshot::default())),
                reload: Mutex::new(ReloadState::Idle),
            }),
        }
    }

    pub fn snapshot(&self) -> Arc<FindingSnapshot> {
        match self.inner.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(e) => {
                tracing::error!("RwLock poisoned reading finding snapshot: {e}");
                Arc::clone(&e.into_inner())
            }
        }
    }

    /// Load now. On failure the previous snapshot is kept.
    pub async fn reload(&self) -> Result<usize, ReportError> {
        let groups = self.inner.client.fetch_findings().await?;
        let count = groups.len();
        let snapshot = Arc::new(FindingSnapshot {
            groups,
            loaded_at: Some(Utc::now()),
        });
        match self.inner.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(e) => {
                tracing::error!("RwLock poisoned writing finding snapshot: {e}");
                *e.into_inner() = snapshot;
            }
        }
        tracing::info!(groups = count, "Findings reloaded");
        Ok(count)
    }

    /// Advance the reload state machine; returns `(before, after)`.
    fn transition(&self, f: impl FnOnce(ReloadState) -> ReloadState) -> (ReloadState, ReloadState) {
        let mut guard = match self.inner.reload.lock() {
            Ok(g) => g,
            Err(e) => {
                tracing::error!("Mutex poisoned in finding reload state: {e}");
                e.into_inner()
            }
        };
        let before = *guard;
        *guard = f(before);
        (before, *guard)
    }

    async fn reload_until_settled(self) {
        loop {
            if let Err(e) = self.reload().await {
                tracing::warn!(error = %e, "Finding reload failed, keeping previous snapshot");
            }
            let (_, after) = self.transition(|s| match s {
                ReloadState::Queued => ReloadState::Running,
                _ => ReloadState::Idle,
            });
            if after == ReloadState::Idle {
                break;
            }
        }
    }
}

impl FindingStore for FindingCache {
    fn request_reload(&self) {
        let (before, _) = self.transition(|s| match s {
            ReloadState::Idle => ReloadState::Running,
            _ => ReloadState::Queued,
        });
        if before == ReloadState::Idle {
            tokio::spawn(self.clone().reload_until_settled());
        }
    }
}
