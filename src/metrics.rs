//! Metrics collected and aggregated during load tests.
//!
//! Every [`VirtualUser`](../user/struct.VirtualUser.html) records its observations into
//! one shared [`MetricRegistry`], owned by the running
//! [`LoadTest`](../struct.LoadTest.html) and handed to each user through an
//! [`Arc`]. The registry never keeps individual observations, only the aggregates
//! needed to answer count, rate, average and percentile queries:
//!  - a [`MetricKind::Counter`] is a monotonic sum,
//!  - a [`MetricKind::Rate`] counts true and false observations,
//!  - a [`MetricKind::Trend`] tracks count, min, max, sum and a bucketed histogram.
//!
//! Each metric is synchronized on its own: counters are atomics, rates and trends are
//! guarded by their own mutex. There is no lock spanning more than one metric.
//!
//! When the load test completes, [`MetricRegistry::snapshot`] produces an immutable
//! [`MetricsSnapshot`] which is what thresholds are evaluated against and what reports
//! are rendered from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time;
use strum_macros::{AsRefStr, Display};

use crate::LoadTestError;

/// Total HTTP requests issued.
pub const HTTP_REQS: &str = "http_reqs";
/// Time until a response was fully received, in milliseconds.
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// True when a request got no response or a non-success status code.
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
/// True when any check of an iteration failed.
pub const ERRORS: &str = "errors";
/// One observation per check, tagged with the check name.
pub const CHECKS: &str = "checks";
/// Client-measured wall time of the payment intent creation call, in milliseconds.
pub const CREATION_TIME: &str = "payment_intent_creation_time";
/// Completed iterations.
pub const ITERATIONS: &str = "iterations";
/// Wall time of a complete iteration including think-time, in milliseconds.
pub const ITERATION_DURATION: &str = "iteration_duration";

/// The kind of aggregate a metric maintains.
#[derive(AsRefStr, Display, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// A monotonic sum.
    Counter,
    /// The fraction of true observations.
    Rate,
    /// Running statistics over numeric samples.
    Trend,
}

/// The value of a single observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ObservedValue {
    /// Added to a [`MetricKind::Counter`].
    Count(u64),
    /// Counted by a [`MetricKind::Rate`].
    Flag(bool),
    /// Sampled by a [`MetricKind::Trend`].
    Sample(f64),
}
impl ObservedValue {
    /// The kind of metric this value is recorded into.
    pub fn kind(&self) -> MetricKind {
        match self {
            ObservedValue::Count(_) => MetricKind::Counter,
            ObservedValue::Flag(_) => MetricKind::Rate,
            ObservedValue::Sample(_) => MetricKind::Trend,
        }
    }
}
impl From<u64> for ObservedValue {
    fn from(value: u64) -> Self {
        ObservedValue::Count(value)
    }
}
impl From<bool> for ObservedValue {
    fn from(value: bool) -> Self {
        ObservedValue::Flag(value)
    }
}
impl From<f64> for ObservedValue {
    fn from(value: f64) -> Self {
        ObservedValue::Sample(value)
    }
}

/// One observation emitted by a virtual user.
///
/// Tags additionally record the value into a sub-metric named `metric{key:value}`,
/// for example `checks{check:status is 200}`.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub metric: String,
    pub value: ObservedValue,
    pub tags: Vec<(String, String)>,
}
impl Observation {
    pub fn new<V: Into<ObservedValue>>(metric: &str, value: V) -> Self {
        Observation {
            metric: metric.to_string(),
            value: value.into(),
            tags: Vec::new(),
        }
    }

    /// Add a tag to the observation.
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }
}

/// Build the name of a tagged sub-metric.
///
/// # Example
/// ```rust
/// use stampede::metrics::sub_metric_name;
///
/// assert_eq!(sub_metric_name("checks", "check", "has next"), "checks{check:has next}");
/// ```
pub fn sub_metric_name(metric: &str, key: &str, value: &str) -> String {
    format!("{}{{{}:{}}}", metric, key, value)
}

/// Round a sample so similar values share a histogram bucket, bounding memory.
///
/// Values up to 100 are kept to the nearest 1, up to 500 to the nearest 10, and up to
/// 1000 to the nearest 100. Larger values keep their three leading digits, so the
/// rounding error stays under 0.5%.
pub(crate) fn bucket_for(value: f64) -> u64 {
    let value = if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    };
    let step = if value <= 100.0 {
        1.0
    } else if value <= 500.0 {
        10.0
    } else if value <= 1000.0 {
        100.0
    } else {
        10f64.powi(value.log10().floor() as i32 - 2)
    };
    ((value / step).round() * step) as u64
}

/// Aggregated state of a trend, also used as its snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendData {
    /// Number of samples recorded.
    pub count: u64,
    /// Smallest sample, exact.
    pub min: f64,
    /// Largest sample, exact.
    pub max: f64,
    /// Sum of all samples, exact.
    pub total: f64,
    /// Rounded sample → number of samples in that bucket.
    pub buckets: BTreeMap<u64, u64>,
}
impl TrendData {
    fn add(&mut self, value: f64) {
        if self.count == 0 || value < self.min {
            self.min = value;
        }
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.total += value;
        self.count += 1;
        *self.buckets.entry(bucket_for(value)).or_insert(0) += 1;
    }

    /// Average of all samples, None until something was recorded.
    pub fn avg(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.total / self.count as f64)
        }
    }

    /// The value that `percent` (0.0 to 1.0) of the samples are at or below.
    ///
    /// Works on the rounded buckets, then clamps the answer to the exact min and max.
    pub fn percentile(&self, percent: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let percent = percent.clamp(0.0, 1.0);
        let wanted = ((self.count as f64 * percent).round() as u64).max(1);
        let mut seen: u64 = 0;
        for (bucket, counter) in &self.buckets {
            seen += counter;
            if seen >= wanted {
                return Some((*bucket as f64).clamp(self.min, self.max));
            }
        }
        Some(self.max)
    }
}

/// Aggregated state of a rate, also used as its snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateData {
    /// Number of true observations.
    pub trues: u64,
    /// Number of false observations.
    pub falses: u64,
}
impl RateData {
    fn add(&mut self, value: bool) {
        if value {
            self.trues += 1;
        } else {
            self.falses += 1;
        }
    }

    /// Total observations.
    pub fn total(&self) -> u64 {
        self.trues + self.falses
    }

    /// Fraction of true observations, None until something was recorded.
    pub fn rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.trues as f64 / total as f64),
        }
    }
}

/// A single named aggregate.
#[derive(Debug)]
pub(crate) enum Metric {
    Counter(AtomicU64),
    Rate(Mutex<RateData>),
    Trend(Mutex<TrendData>),
}
impl Metric {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Metric::Counter(AtomicU64::new(0)),
            MetricKind::Rate => Metric::Rate(Mutex::new(RateData::default())),
            MetricKind::Trend => Metric::Trend(Mutex::new(TrendData::default())),
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Rate(_) => MetricKind::Rate,
            Metric::Trend(_) => MetricKind::Trend,
        }
    }

    fn add(&self, name: &str, value: ObservedValue) -> Result<(), LoadTestError> {
        match (self, value) {
            (Metric::Counter(counter), ObservedValue::Count(increment)) => {
                counter.fetch_add(increment, Ordering::Relaxed);
            }
            (Metric::Rate(rate), ObservedValue::Flag(flag)) => {
                rate.lock()
                    .map_err(|_| LoadTestError::RegistryPoisoned {
                        metric: name.to_string(),
                    })?
                    .add(flag);
            }
            (Metric::Trend(trend), ObservedValue::Sample(sample)) => {
                trend
                    .lock()
                    .map_err(|_| LoadTestError::RegistryPoisoned {
                        metric: name.to_string(),
                    })?
                    .add(sample);
            }
            (metric, value) => {
                return Err(LoadTestError::MetricKind {
                    metric: name.to_string(),
                    expected: metric.kind(),
                    found: value.kind(),
                })
            }
        }
        Ok(())
    }

    fn snapshot(&self, name: &str) -> Result<MetricSnapshot, LoadTestError> {
        let poisoned = || LoadTestError::RegistryPoisoned {
            metric: name.to_string(),
        };
        Ok(match self {
            Metric::Counter(counter) => MetricSnapshot::Counter {
                count: counter.load(Ordering::Relaxed),
            },
            Metric::Rate(rate) => MetricSnapshot::Rate(*rate.lock().map_err(|_| poisoned())?),
            Metric::Trend(trend) => {
                MetricSnapshot::Trend(trend.lock().map_err(|_| poisoned())?.clone())
            }
        })
    }
}

/// Thread-safe collection of all metrics recorded during one load test.
///
/// # Example
/// ```rust
/// use stampede::metrics::{MetricRegistry, HTTP_REQS, HTTP_REQ_DURATION};
///
/// let registry = MetricRegistry::new();
/// registry.record(HTTP_REQS, 1u64).unwrap();
/// registry.record(HTTP_REQ_DURATION, 12.5).unwrap();
///
/// let snapshot = registry.snapshot().unwrap();
/// assert_eq!(snapshot.count(HTTP_REQS), Some(1));
/// assert_eq!(snapshot.avg(HTTP_REQ_DURATION), Some(12.5));
/// ```
#[derive(Debug)]
pub struct MetricRegistry {
    metrics: RwLock<HashMap<String, Arc<Metric>>>,
    started: time::Instant,
    started_at: DateTime<Utc>,
}
impl Default for MetricRegistry {
    fn default() -> Self {
        MetricRegistry::new()
    }
}
impl MetricRegistry {
    /// Create an empty registry, starting the clock used for per-second rates.
    pub fn new() -> Self {
        MetricRegistry {
            metrics: RwLock::new(HashMap::new()),
            started: time::Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Declare a metric so it shows up in snapshots before it is first observed.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<(), LoadTestError> {
        self.get_or_create(name, kind).map(|_| ())
    }

    /// Record one value into the named metric, creating it if needed.
    pub fn record<V: Into<ObservedValue>>(&self, name: &str, value: V) -> Result<(), LoadTestError> {
        let value = value.into();
        self.get_or_create(name, value.kind())?.add(name, value)
    }

    /// Record an [`Observation`] into its metric and into one sub-metric per tag.
    pub fn observe(&self, observation: &Observation) -> Result<(), LoadTestError> {
        self.record(&observation.metric, observation.value)?;
        for (key, value) in &observation.tags {
            self.record(
                &sub_metric_name(&observation.metric, key, value),
                observation.value,
            )?;
        }
        Ok(())
    }

    fn get_or_create(&self, name: &str, kind: MetricKind) -> Result<Arc<Metric>, LoadTestError> {
        let poisoned = || LoadTestError::RegistryPoisoned {
            metric: name.to_string(),
        };
        let existing = self
            .metrics
            .read()
            .map_err(|_| poisoned())?
            .get(name)
            .cloned();
        let metric = match existing {
            Some(metric) => metric,
            None => {
                let mut metrics = self.metrics.write().map_err(|_| poisoned())?;
                // Another user may have created it while waiting for the write lock.
                metrics
                    .entry(name.to_string())
                    .or_insert_with(|| {
                        debug!("registering {} metric {}", kind, name);
                        Arc::new(Metric::new(kind))
                    })
                    .clone()
            }
        };
        if metric.kind() != kind {
            return Err(LoadTestError::MetricKind {
                metric: name.to_string(),
                expected: metric.kind(),
                found: kind,
            });
        }
        Ok(metric)
    }

    /// Capture an immutable view of every metric.
    ///
    /// Each metric is consistent as of the moment it is copied; metrics are not
    /// captured atomically with respect to each other.
    pub fn snapshot(&self) -> Result<MetricsSnapshot, LoadTestError> {
        let metrics: Vec<(String, Arc<Metric>)> = self
            .metrics
            .read()
            .map_err(|_| LoadTestError::RegistryPoisoned {
                metric: "registry".to_string(),
            })?
            .iter()
            .map(|(name, metric)| (name.clone(), metric.clone()))
            .collect();

        let mut snapshot = MetricsSnapshot {
            started: self.started_at,
            duration: self.started.elapsed().as_secs_f64(),
            metrics: BTreeMap::new(),
        };
        for (name, metric) in metrics {
            let metric_snapshot = metric.snapshot(&name)?;
            snapshot.metrics.insert(name, metric_snapshot);
        }
        Ok(snapshot)
    }
}

/// Immutable copy of a single metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSnapshot {
    Counter { count: u64 },
    Rate(RateData),
    Trend(TrendData),
}
impl MetricSnapshot {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSnapshot::Counter { .. } => MetricKind::Counter,
            MetricSnapshot::Rate(_) => MetricKind::Rate,
            MetricSnapshot::Trend(_) => MetricKind::Trend,
        }
    }

    /// Number of observations (for counters, the accumulated sum).
    pub fn count(&self) -> u64 {
        match self {
            MetricSnapshot::Counter { count } => *count,
            MetricSnapshot::Rate(rate) => rate.total(),
            MetricSnapshot::Trend(trend) => trend.count,
        }
    }

    /// Fraction of true observations, only meaningful for rates.
    pub fn rate(&self) -> Option<f64> {
        match self {
            MetricSnapshot::Rate(rate) => rate.rate(),
            _ => None,
        }
    }

    pub fn avg(&self) -> Option<f64> {
        match self {
            MetricSnapshot::Trend(trend) => trend.avg(),
            _ => None,
        }
    }

    pub fn min(&self) -> Option<f64> {
        match self {
            MetricSnapshot::Trend(trend) if trend.count > 0 => Some(trend.min),
            _ => None,
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self {
            MetricSnapshot::Trend(trend) if trend.count > 0 => Some(trend.max),
            _ => None,
        }
    }

    /// Percentile of a trend, `percent` from 0.0 to 1.0.
    pub fn percentile(&self, percent: f64) -> Option<f64> {
        match self {
            MetricSnapshot::Trend(trend) => trend.percentile(percent),
            _ => None,
        }
    }
}

/// Immutable view of every metric at one instant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the registry was created.
    pub started: DateTime<Utc>,
    /// Seconds elapsed between registry creation and the snapshot.
    pub duration: f64,
    /// All metrics by name, sorted.
    pub metrics: BTreeMap<String, MetricSnapshot>,
}
impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.get(name)
    }

    pub fn count(&self, name: &str) -> Option<u64> {
        self.get(name).map(|metric| metric.count())
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|metric| metric.rate())
    }

    pub fn avg(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|metric| metric.avg())
    }

    pub fn min(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|metric| metric.min())
    }

    pub fn max(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|metric| metric.max())
    }

    pub fn percentile(&self, name: &str, percent: f64) -> Option<f64> {
        self.get(name).and_then(|metric| metric.percentile(percent))
    }

    /// Observations per second over the snapshot duration.
    pub fn per_second(&self, name: &str) -> Option<f64> {
        let count = self.count(name)?;
        if self.duration > 0.0 {
            Some(count as f64 / self.duration)
        } else {
            None
        }
    }
}
