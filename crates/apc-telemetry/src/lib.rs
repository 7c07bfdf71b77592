// SPDX-License-Identifier: MIT OR Apache-2.0
//! apc-telemetry
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Structured telemetry for the AP worker: one-shot `tracing` subscriber
//! setup plus a thread-safe pipeline metrics collector.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Initialise the global tracing subscriber.
///
/// `level` overrides `RUST_LOG` when set; `json` switches the fmt layer to
/// JSON lines for log shippers. Calling twice is a no-op (the second call
/// fails to set the global default and is ignored).
pub fn init_telemetry(level: Option<&str>, json: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let result = if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };
    // Already initialised (tests, embedding); fine.
    drop(result);
}

/// Metrics for one completed package workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRunMetrics {
    /// Feedlot family processed.
    pub feedlot_family: String,
    /// Terminal package status.
    pub final_status: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Invoices extracted.
    pub invoices_extracted: u64,
    /// Activity executions (including replayed ones).
    pub activities_executed: u64,
    /// Activity retry attempts beyond the first.
    pub retries: u64,
}

/// Aggregated statistics across package runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Number of runs recorded.
    pub count: usize,
    /// Mean duration in milliseconds.
    pub mean_duration_ms: f64,
    /// Total invoices extracted.
    pub total_invoices: u64,
    /// Total retry attempts.
    pub total_retries: u64,
    /// Run counts per terminal status (deterministic ordering).
    pub status_counts: BTreeMap<String, usize>,
}

/// Thread-safe collector for package run metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Vec<PackageRunMetrics>>>,
}

impl MetricsCollector {
    /// Create a new, empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run.
    pub fn record(&self, metrics: PackageRunMetrics) {
        self.inner
            .lock()
            .expect("metrics lock poisoned")
            .push(metrics);
    }

    /// Number of runs recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("metrics lock poisoned").len()
    }

    /// Whether the collector has no recorded runs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute an aggregated summary of all recorded runs.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let data = self.inner.lock().expect("metrics lock poisoned");
        if data.is_empty() {
            return MetricsSummary::default();
        }
        let mut summary = MetricsSummary {
            count: data.len(),
            ..MetricsSummary::default()
        };
        let mut total_duration = 0u64;
        for run in data.iter() {
            total_duration += run.duration_ms;
            summary.total_invoices += run.invoices_extracted;
            summary.total_retries += run.retries;
            *summary
                .status_counts
                .entry(run.final_status.clone())
                .or_default() += 1;
        }
        summary.mean_duration_ms = total_duration as f64 / data.len() as f64;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: &str, duration_ms: u64) -> PackageRunMetrics {
        PackageRunMetrics {
            feedlot_family: "BOVINA".into(),
            final_status: status.into(),
            duration_ms,
            invoices_extracted: 2,
            activities_executed: 12,
            retries: 1,
        }
    }

    #[test]
    fn empty_collector_summarizes_to_zero() {
        let collector = MetricsCollector::new();
        assert!(collector.is_empty());
        assert_eq!(collector.summary(), MetricsSummary::default());
    }

    #[test]
    fn summary_aggregates_runs() {
        let collector = MetricsCollector::new();
        collector.record(run("RECONCILED_PASS", 100));
        collector.record(run("RECONCILED_PASS", 300));
        collector.record(run("RECONCILED_FAIL", 200));
        let summary = collector.summary();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.mean_duration_ms, 200.0);
        assert_eq!(summary.total_invoices, 6);
        assert_eq!(summary.status_counts["RECONCILED_PASS"], 2);
        assert_eq!(summary.status_counts["RECONCILED_FAIL"], 1);
    }

    #[test]
    fn init_twice_does_not_panic() {
        init_telemetry(Some("debug"), false);
        init_telemetry(None, true);
    }
}
