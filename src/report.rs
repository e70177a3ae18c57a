//! Reports generated from the final metrics snapshot.
//!
//! Every report is a pure function of a [`MetricsSnapshot`], the
//! [`ThresholdReport`] evaluated over it and the stage history:
//!  - a human readable text summary, see [`text::write_summary`],
//!  - a [`StructuredReport`], written as JSON or rendered as HTML by [`html::render`],
//!  - the raw snapshot, see [`write_export_file`].
//!
//! Metrics or statistics that are missing from the snapshot are omitted from the
//! reports, they never prevent a report from being written.

mod common;
pub mod html;
pub mod text;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::metrics::{self, MetricKind, MetricsSnapshot};
use crate::test_plan::TestPlanHistory;
use crate::threshold::ThresholdReport;
use crate::LoadTestError;

/// Percentiles included for every trend, from 0.0 to 1.0.
pub const PERCENTILES: [f64; 4] = [0.5, 0.9, 0.95, 0.99];

/// Metrics listed first, in this order, ahead of all others.
const PRIMARY_METRICS: [&str; 8] = [
    metrics::HTTP_REQS,
    metrics::HTTP_REQ_DURATION,
    metrics::HTTP_REQ_FAILED,
    metrics::CREATION_TIME,
    metrics::ERRORS,
    metrics::CHECKS,
    metrics::ITERATIONS,
    metrics::ITERATION_DURATION,
];

/// Defines the statistics reported about one metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub name: String,
    pub kind: MetricKind,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p50: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p90: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99: Option<f64>,
    /// Observations per second, for counters and rates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_second: Option<f64>,
}

/// Machine readable summary of a completed load test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    pub started: DateTime<Utc>,
    /// Seconds the load test ran.
    pub duration: f64,
    /// True only if every threshold passed.
    pub passed: bool,
    pub metrics: Vec<MetricEntry>,
    pub thresholds: ThresholdReport,
    pub history: Vec<TestPlanHistory>,
}

impl StructuredReport {
    /// Build the report from a snapshot, using the snapshot's own accessors for every
    /// value.
    pub fn build(
        snapshot: &MetricsSnapshot,
        thresholds: &ThresholdReport,
        history: &[TestPlanHistory],
    ) -> StructuredReport {
        let metrics = snapshot
            .metrics
            .keys()
            .sorted_by_key(|name| {
                PRIMARY_METRICS
                    .iter()
                    .position(|primary| *primary == name.as_str())
                    .unwrap_or(PRIMARY_METRICS.len())
            })
            .map(|name| MetricEntry::build(snapshot, name))
            .collect();

        StructuredReport {
            started: snapshot.started,
            duration: snapshot.duration,
            passed: thresholds.passed(),
            metrics,
            thresholds: thresholds.clone(),
            history: history.to_vec(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricEntry> {
        self.metrics.iter().find(|entry| entry.name == name)
    }

    pub fn to_json(&self) -> Result<String, LoadTestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl MetricEntry {
    fn build(snapshot: &MetricsSnapshot, name: &str) -> MetricEntry {
        let kind = snapshot
            .get(name)
            .map(|metric| metric.kind())
            .unwrap_or(MetricKind::Counter);
        let [p50, p90, p95, p99] = PERCENTILES.map(|percent| snapshot.percentile(name, percent));
        MetricEntry {
            name: name.to_string(),
            kind,
            count: snapshot.count(name).unwrap_or(0),
            rate: snapshot.rate(name),
            avg: snapshot.avg(name),
            min: snapshot.min(name),
            max: snapshot.max(name),
            p50,
            p90,
            p95,
            p99,
            per_second: match kind {
                MetricKind::Trend => None,
                MetricKind::Counter | MetricKind::Rate => snapshot.per_second(name),
            },
        }
    }
}

/// Write the structured report, as JSON if the file name ends in `.json` and otherwise
/// as HTML.
pub async fn write_report_file(path: &str, report: &StructuredReport) -> Result<(), LoadTestError> {
    let is_json = Path::new(path)
        .extension()
        .map(|extension| extension.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let contents = if is_json {
        report.to_json()?
    } else {
        html::render(report)
    };
    tokio::fs::write(path, contents).await?;
    info!("wrote report file to: {}", path);
    Ok(())
}

/// Write the raw metrics snapshot as JSON.
pub async fn write_export_file(path: &str, snapshot: &MetricsSnapshot) -> Result<(), LoadTestError> {
    let contents = serde_json::to_string_pretty(snapshot)?;
    tokio::fs::write(path, contents).await?;
    info!("wrote metrics export to: {}", path);
    Ok(())
}
