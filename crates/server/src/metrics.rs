//! Prometheus exporter for the job metrics recorded by `scanwatch-core`.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric descriptions
//! - Rendering for the `/metrics` endpoint

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use scanwatch_core::metrics::{
    JOBS_DEDUPLICATED, JOBS_STARTED, JOB_DURATION, JOB_OUTCOMES, STATUS_CHECKS,
};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup, before any job runs.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!(JOBS_STARTED, "Jobs submitted, by kind (scan, refresh)");
    describe_counter!(
        JOBS_DEDUPLICATED,
        "Start requests answered with an already in-flight job"
    );
    describe_counter!(JOB_OUTCOMES, "Terminal job outcomes, by kind and outcome");
    describe_counter!(STATUS_CHECKS, "Status checks issued against the backend");
    describe_histogram!(
        JOB_DURATION,
        "Time from start to terminal state in seconds"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}
