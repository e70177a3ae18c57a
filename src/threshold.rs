//! Pass/fail thresholds evaluated against aggregated metrics.
//!
//! Thresholds are declared as `"metric:predicate;metric:predicate"`, for example
//! `http_req_duration:p(95)<500;errors:rate<0.1`. Several predicates for the same
//! metric can also be separated by commas: `http_req_duration:p(95)<500,avg<200`.
//!
//! A predicate compares one statistic of a metric against a limit:
//!  - `p(N)`: the Nth percentile of a trend, N from 0 to 100,
//!  - `rate`: the fraction of true observations of a rate,
//!  - `avg`: the average of a trend.
//!
//! A threshold whose metric is missing, was never observed, or doesn't support the
//! statistic has no data, and a threshold with no data is failing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum_macros::{AsRefStr, Display};

use crate::metrics::MetricsSnapshot;
use crate::LoadTestError;

/// The thresholds applied when none are configured.
pub const DEFAULT_THRESHOLDS: &str = "http_req_duration:p(95)<500;http_req_failed:rate<0.1;errors:rate<0.1;payment_intent_creation_time:p(95)<200";

lazy_static! {
    static ref PREDICATE: Regex = Regex::new(
        r"^\s*(?:p\(\s*(?P<percentile>\d+(?:\.\d+)?)\s*\)|(?P<named>rate|avg))\s*(?P<comparison><|>)\s*(?P<limit>-?\d+(?:\.\d+)?)\s*$"
    )
    .expect("predicate pattern is valid");
}

/// The statistic of a metric a predicate looks at.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Statistic {
    /// Percentile of a trend, from 0 to 100.
    Percentile(f64),
    /// Fraction of true observations.
    Rate,
    /// Average of a trend.
    Avg,
}
impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Statistic::Percentile(percentile) => write!(f, "p({})", percentile),
            Statistic::Rate => write!(f, "rate"),
            Statistic::Avg => write!(f, "avg"),
        }
    }
}

#[derive(AsRefStr, Display, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = ">")]
    GreaterThan,
}

/// `statistic comparison limit`, for example `p(95)<500`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub statistic: Statistic,
    pub comparison: Comparison,
    pub limit: f64,
}
impl Predicate {
    /// Returns true if the observed value satisfies the predicate.
    pub fn holds(&self, observed: f64) -> bool {
        match self.comparison {
            Comparison::LessThan => observed < self.limit,
            Comparison::GreaterThan => observed > self.limit,
        }
    }

    /// Read the predicate's statistic for `metric` out of a snapshot.
    pub fn observe(&self, metric: &str, snapshot: &MetricsSnapshot) -> Option<f64> {
        match self.statistic {
            Statistic::Percentile(percentile) => snapshot.percentile(metric, percentile / 100.0),
            Statistic::Rate => snapshot.rate(metric),
            Statistic::Avg => snapshot.avg(metric),
        }
    }
}
impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.statistic, self.comparison, self.limit)
    }
}
impl FromStr for Predicate {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |detail: &str| LoadTestError::InvalidOption {
            option: "`configuration.thresholds`".to_string(),
            value: s.to_string(),
            detail: detail.to_string(),
        };
        let cap = PREDICATE.captures(s).ok_or_else(|| {
            invalid("Expected a predicate like \"p(95)<500\", \"rate<0.1\" or \"avg>10\".")
        })?;

        let statistic = if let Some(percentile) = cap.name("percentile") {
            let percentile = percentile
                .as_str()
                .parse::<f64>()
                .map_err(|_| invalid("Invalid percentile."))?;
            if percentile > 100.0 {
                return Err(invalid("Percentiles must be between 0 and 100."));
            }
            Statistic::Percentile(percentile)
        } else if cap.name("named").map(|m| m.as_str()) == Some("rate") {
            Statistic::Rate
        } else {
            Statistic::Avg
        };
        let comparison = if &cap["comparison"] == "<" {
            Comparison::LessThan
        } else {
            Comparison::GreaterThan
        };
        let limit = cap["limit"]
            .parse::<f64>()
            .map_err(|_| invalid("Invalid limit."))?;

        Ok(Predicate {
            statistic,
            comparison,
            limit,
        })
    }
}

/// A pass/fail predicate over one metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: String,
    pub predicate: Predicate,
}
impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.metric, self.predicate)
    }
}

/// All thresholds of a load test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub thresholds: Vec<Threshold>,
}
impl Default for Thresholds {
    fn default() -> Self {
        DEFAULT_THRESHOLDS.parse().unwrap_or(Thresholds {
            thresholds: Vec::new(),
        })
    }
}
impl fmt::Display for Thresholds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let thresholds: Vec<String> = self.thresholds.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", thresholds.join(";"))
    }
}

/// Implement [`FromStr`] to convert `"metric:predicate;metric:predicate"` formatted
/// thresholds into [`Thresholds`].
///
/// The metric name is everything before the last colon, so thresholds can target tagged
/// sub-metrics such as `checks{check:has next}:rate>0.99`.
impl FromStr for Thresholds {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut thresholds = Vec::new();
        for line in s.trim().trim_end_matches(';').split(';') {
            let invalid = || LoadTestError::InvalidOption {
                option: "`configuration.thresholds`".to_string(),
                value: line.to_string(),
                detail: "Expected format: --thresholds \"{metric}:{predicate};{metric}:{predicate}\", for example \"http_req_duration:p(95)<500;errors:rate<0.1\".".to_string(),
            };
            let (metric, predicates) = line.rsplit_once(':').ok_or_else(invalid)?;
            let metric = metric.trim();
            if metric.is_empty() {
                return Err(invalid());
            }
            for predicate in predicates.split(',') {
                thresholds.push(Threshold {
                    metric: metric.to_string(),
                    predicate: predicate.parse()?,
                });
            }
        }
        Ok(Thresholds { thresholds })
    }
}

/// The outcome of one threshold.
#[derive(AsRefStr, Display, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
    /// The metric or statistic was unavailable; counts as failing.
    NoData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub metric: String,
    /// The predicate as declared, for example `p(95)<500`.
    pub predicate: String,
    /// The statistic the predicate was checked against, if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<f64>,
    pub verdict: Verdict,
}

/// Results of evaluating every threshold against one snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub results: Vec<ThresholdResult>,
}
impl ThresholdReport {
    /// True only if every threshold passed.
    pub fn passed(&self) -> bool {
        self.results
            .iter()
            .all(|result| result.verdict == Verdict::Pass)
    }

    /// Thresholds that failed or had no data.
    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results
            .iter()
            .filter(|result| result.verdict != Verdict::Pass)
    }

    /// Thresholds whose observed value breached the limit, ignoring those without data.
    pub fn breached(&self) -> bool {
        self.results
            .iter()
            .any(|result| result.verdict == Verdict::Fail)
    }
}

/// Evaluate every threshold against a snapshot.
///
/// # Example
/// ```rust
/// use stampede::metrics::{MetricRegistry, ERRORS};
/// use stampede::threshold::{evaluate, Thresholds, Verdict};
///
/// let thresholds: Thresholds = "errors:rate<0.1;http_req_duration:p(95)<500".parse().unwrap();
/// let registry = MetricRegistry::new();
/// registry.record(ERRORS, false).unwrap();
///
/// let report = evaluate(&thresholds, &registry.snapshot().unwrap());
/// assert_eq!(report.results[0].verdict, Verdict::Pass);
/// assert_eq!(report.results[1].verdict, Verdict::NoData);
/// assert!(!report.passed());
/// ```
pub fn evaluate(thresholds: &Thresholds, snapshot: &MetricsSnapshot) -> ThresholdReport {
    let results = thresholds
        .thresholds
        .iter()
        .map(|threshold| {
            let observed = threshold.predicate.observe(&threshold.metric, snapshot);
            let verdict = match observed {
                None => Verdict::NoData,
                Some(value) if threshold.predicate.holds(value) => Verdict::Pass,
                Some(_) => Verdict::Fail,
            };
            trace!("threshold {}: {:?} {}", threshold, observed, verdict);
            ThresholdResult {
                metric: threshold.metric.clone(),
                predicate: threshold.predicate.to_string(),
                observed,
                verdict,
            }
        })
        .collect();
    ThresholdReport { results }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metrics::{MetricKind, MetricRegistry, ERRORS, HTTP_REQS, HTTP_REQ_DURATION};

    #[test]
    fn parse_predicates() {
        let predicate: Predicate = "p(95)<500".parse().unwrap();
        assert_eq!(predicate.statistic, Statistic::Percentile(95.0));
        assert_eq!(predicate.comparison, Comparison::LessThan);
        assert_eq!(predicate.limit, 500.0);
        assert_eq!(predicate.to_string(), "p(95)<500");

        let predicate: Predicate = " rate > 0.99 ".parse().unwrap();
        assert_eq!(predicate.statistic, Statistic::Rate);
        assert_eq!(predicate.comparison, Comparison::GreaterThan);
        assert_eq!(predicate.to_string(), "rate>0.99");

        let predicate: Predicate = "p(99.9)<1500".parse().unwrap();
        assert_eq!(predicate.statistic, Statistic::Percentile(99.9));
        assert_eq!("avg<200".parse::<Predicate>().unwrap().statistic, Statistic::Avg);

        assert!("p(101)<5".parse::<Predicate>().is_err());
        assert!("p95<500".parse::<Predicate>().is_err());
        assert!("rate<=0.1".parse::<Predicate>().is_err());
        assert!("median<10".parse::<Predicate>().is_err());
        assert!("rate<".parse::<Predicate>().is_err());
    }

    #[test]
    fn parse_thresholds() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.thresholds.len(), 4);
        assert_eq!(thresholds.to_string(), DEFAULT_THRESHOLDS);

        let thresholds: Thresholds = "http_req_duration:p(95)<500,avg<200;checks{check:has next}:rate>0.99;"
            .parse()
            .unwrap();
        assert_eq!(thresholds.thresholds.len(), 3);
        assert_eq!(thresholds.thresholds[0].metric, "http_req_duration");
        assert_eq!(thresholds.thresholds[1].metric, "http_req_duration");
        assert_eq!(thresholds.thresholds[1].predicate.statistic, Statistic::Avg);
        assert_eq!(thresholds.thresholds[2].metric, "checks{check:has next}");

        assert!("errors".parse::<Thresholds>().is_err());
        assert!(":rate<0.1".parse::<Thresholds>().is_err());
        assert!("errors:rate<0.1;;http_reqs:rate<1".parse::<Thresholds>().is_err());
        assert!("errors:rate<0.1,".parse::<Thresholds>().is_err());
    }

    #[test]
    fn no_data_is_failing() {
        let thresholds: Thresholds = "errors:rate<0.1".parse().unwrap();
        let registry = MetricRegistry::new();
        registry.register(ERRORS, MetricKind::Rate).unwrap();
        let report = evaluate(&thresholds, &registry.snapshot().unwrap());
        assert_eq!(report.results[0].verdict, Verdict::NoData);
        assert_eq!(report.results[0].observed, None);
        assert!(!report.passed());
        assert!(!report.breached());
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn statistic_must_match_kind() {
        let thresholds: Thresholds = "http_reqs:rate<0.1;http_req_duration:rate<0.1"
            .parse()
            .unwrap();
        let registry = MetricRegistry::new();
        registry.record(HTTP_REQS, 1u64).unwrap();
        registry.record(HTTP_REQ_DURATION, 5.0).unwrap();
        let report = evaluate(&thresholds, &registry.snapshot().unwrap());
        assert!(report
            .results
            .iter()
            .all(|result| result.verdict == Verdict::NoData));
    }

    #[test]
    fn verdicts() {
        let thresholds: Thresholds =
            "errors:rate<0.1;errors:rate>0.2;http_req_duration:p(95)<500;http_req_duration:avg>100"
                .parse()
                .unwrap();
        let registry = MetricRegistry::new();
        for i in 0..10 {
            registry.record(ERRORS, i == 0).unwrap();
        }
        for ms in [20.0, 40.0, 60.0, 80.0] {
            registry.record(HTTP_REQ_DURATION, ms).unwrap();
        }
        let report = evaluate(&thresholds, &registry.snapshot().unwrap());
        let verdicts: Vec<Verdict> = report.results.iter().map(|r| r.verdict).collect();
        // 0.1 is not strictly below 0.1.
        assert_eq!(
            verdicts,
            vec![Verdict::Fail, Verdict::Fail, Verdict::Pass, Verdict::Fail]
        );
        assert_eq!(report.results[0].observed, Some(0.1));
        assert_eq!(report.results[2].observed, Some(80.0));
        assert_eq!(report.results[3].observed, Some(50.0));
        assert!(report.breached());
        assert!(!report.passed());
    }
}
