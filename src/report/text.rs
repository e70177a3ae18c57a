//! Human readable summary.

use std::io::Write;

use crate::metrics::{self, MetricsSnapshot};
use crate::report::common::{format_count, format_ms, format_percent};
use crate::threshold::{ThresholdReport, Verdict};
use crate::LoadTestError;

struct Summary<'s, 'w, W: Write> {
    w: &'w mut W,
    snapshot: &'s MetricsSnapshot,
    thresholds: Option<&'s ThresholdReport>,
}

/// Write the summary of a snapshot, with the threshold results when available.
///
/// Running metrics are written without thresholds.
pub fn write_summary<W: Write>(
    w: &mut W,
    snapshot: &MetricsSnapshot,
    thresholds: Option<&ThresholdReport>,
) -> Result<(), LoadTestError> {
    Summary {
        w,
        snapshot,
        thresholds,
    }
    .write()
}

/// Render the summary into a string.
pub fn summary(snapshot: &MetricsSnapshot, thresholds: Option<&ThresholdReport>) -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec can't fail.
    let _ = write_summary(&mut buffer, snapshot, thresholds);
    String::from_utf8_lossy(&buffer).into_owned()
}

impl<W: Write> Summary<'_, '_, W> {
    fn write(mut self) -> Result<(), LoadTestError> {
        self.write_header()?;
        self.write_trend("HTTP Request Duration", metrics::HTTP_REQ_DURATION)?;
        self.write_trend("Payment Intent Creation Time", metrics::CREATION_TIME)?;
        self.write_error_rates()?;
        self.write_throughput()?;
        self.write_checks()?;
        self.write_thresholds()?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), LoadTestError> {
        writeln!(
            self.w,
            "\nPayment Intent Load Test Summary\n================================\n"
        )?;
        writeln!(self.w, "Test Duration: {:.1}s", self.snapshot.duration)?;
        if let Some(average) = self.snapshot.avg(metrics::ITERATION_DURATION) {
            writeln!(self.w, "Average Iteration: {}", format_ms(average))?;
        }
        if let Some(iterations) = self.snapshot.count(metrics::ITERATIONS) {
            writeln!(self.w, "Iterations: {}", format_count(iterations))?;
        }
        if let Some(requests) = self.snapshot.count(metrics::HTTP_REQS) {
            writeln!(self.w, "Total Requests: {}", format_count(requests))?;
        }
        if let Some(failed) = self.snapshot.rate(metrics::HTTP_REQ_FAILED) {
            writeln!(self.w, "Failed Requests: {}", format_percent(failed))?;
        }
        Ok(())
    }

    fn write_trend(&mut self, title: &str, name: &str) -> Result<(), LoadTestError> {
        let lines: Vec<(&str, Option<f64>)> = vec![
            ("Average", self.snapshot.avg(name)),
            ("Minimum", self.snapshot.min(name)),
            ("Median", self.snapshot.percentile(name, 0.5)),
            ("90th percentile", self.snapshot.percentile(name, 0.9)),
            ("95th percentile", self.snapshot.percentile(name, 0.95)),
            ("99th percentile", self.snapshot.percentile(name, 0.99)),
            ("Maximum", self.snapshot.max(name)),
        ];
        if lines.iter().all(|(_, value)| value.is_none()) {
            return Ok(());
        }
        writeln!(self.w, "\n{}:", title)?;
        for (label, value) in lines {
            if let Some(value) = value {
                writeln!(self.w, "  - {}: {}", label, format_ms(value))?;
            }
        }
        Ok(())
    }

    fn write_error_rates(&mut self) -> Result<(), LoadTestError> {
        let http = self.snapshot.rate(metrics::HTTP_REQ_FAILED);
        let errors = self.snapshot.rate(metrics::ERRORS);
        if http.is_none() && errors.is_none() {
            return Ok(());
        }
        writeln!(self.w, "\nError Rates:")?;
        if let Some(http) = http {
            writeln!(self.w, "  - HTTP errors: {}", format_percent(http))?;
        }
        if let Some(errors) = errors {
            writeln!(self.w, "  - Check errors: {}", format_percent(errors))?;
        }
        Ok(())
    }

    fn write_throughput(&mut self) -> Result<(), LoadTestError> {
        if let Some(per_second) = self.snapshot.per_second(metrics::HTTP_REQS) {
            writeln!(self.w, "\nThroughput: {:.2} requests/second", per_second)?;
        }
        Ok(())
    }

    fn write_checks(&mut self) -> Result<(), LoadTestError> {
        let prefix = format!("{}{{check:", metrics::CHECKS);
        let checks: Vec<(&str, f64)> = self
            .snapshot
            .metrics
            .iter()
            .filter_map(|(name, metric)| {
                let check = name.strip_prefix(&prefix)?.strip_suffix('}')?;
                Some((check, metric.rate()?))
            })
            .collect();
        let overall = self.snapshot.rate(metrics::CHECKS);
        if checks.is_empty() && overall.is_none() {
            return Ok(());
        }

        writeln!(self.w, "\nChecks:")?;
        for (check, rate) in checks {
            writeln!(self.w, "  - {}: {}", check, format_percent(rate))?;
        }
        if let Some(overall) = overall {
            writeln!(self.w, "  - all checks: {}", format_percent(overall))?;
        }
        Ok(())
    }

    fn write_thresholds(&mut self) -> Result<(), LoadTestError> {
        let report = match self.thresholds {
            Some(report) if !report.results.is_empty() => report,
            _ => return Ok(()),
        };

        writeln!(self.w, "\nThresholds:")?;
        for result in &report.results {
            let observed = match result.observed {
                Some(observed) => format!("{:.4}", observed),
                None => "no data".to_string(),
            };
            let marker = match result.verdict {
                Verdict::Pass => "PASS",
                Verdict::Fail => "FAIL",
                Verdict::NoData => "FAIL (no data)",
            };
            writeln!(
                self.w,
                "  - {}: {} ({}) {}",
                result.metric, result.predicate, observed, marker
            )?;
        }
        writeln!(
            self.w,
            "\nResult: {}",
            if report.passed() { "PASSED" } else { "FAILED" }
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metrics::{MetricRegistry, Observation};
    use crate::threshold::{evaluate, Thresholds};

    #[test]
    fn summary_sections() {
        let registry = MetricRegistry::new();
        for (duration, failed) in [(120.0, false), (80.0, false), (900.0, true)] {
            registry.record(metrics::HTTP_REQS, 1u64).unwrap();
            registry.record(metrics::HTTP_REQ_DURATION, duration).unwrap();
            registry.record(metrics::HTTP_REQ_FAILED, failed).unwrap();
            registry.record(metrics::ERRORS, failed).unwrap();
            registry
                .observe(&Observation::new(metrics::CHECKS, !failed).tag("check", "status is 200"))
                .unwrap();
        }
        let snapshot = registry.snapshot().unwrap();
        let thresholds: Thresholds = "errors:rate<0.5;iterations:rate<1".parse().unwrap();
        let report = evaluate(&thresholds, &snapshot);

        let text = summary(&snapshot, Some(&report));
        assert!(text.contains("Total Requests: 3"));
        assert!(text.contains("Failed Requests: 33.33%"));
        assert!(text.contains("HTTP Request Duration:"));
        assert!(text.contains("  - Maximum: 900ms"));
        assert!(text.contains("  - status is 200: 66.67%"));
        assert!(text.contains("  - errors: rate<0.5 (0.3333) PASS"));
        assert!(text.contains("  - iterations: rate<1 (no data) FAIL (no data)"));
        assert!(text.contains("Result: FAILED"));
        // Never observed, so omitted.
        assert!(!text.contains("Payment Intent Creation Time"));
        assert!(!text.contains("Iterations:"));
    }

    #[test]
    fn empty_snapshot() {
        let text = summary(&MetricsSnapshot::default(), None);
        assert!(text.contains("Test Duration: 0.0s"));
        assert!(!text.contains("Checks:"));
        assert!(!text.contains("Thresholds:"));
    }
}
