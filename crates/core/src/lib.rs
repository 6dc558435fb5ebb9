// crates/core/src/lib.rs
pub mod client;
pub mod config;
pub mod error;
pub mod findings;
pub mod metrics;
pub mod notifier;
pub mod poll;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{HttpBackend, JobStatusClient, ReportClient};
pub use config::Config;
pub use error::*;
pub use findings::{FindingCache, FindingSnapshot, FindingStore};
pub use notifier::{Notice, NoticeEvent, NoticeLevel, ResultNotifier};
pub use poll::{PollLoop, PollOutcome};
pub use tracker::{Callback, JobEvent, JobTracker, SubscriptionId};
pub use types::*;
