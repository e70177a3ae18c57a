use httpmock::MockServer;
use serial_test::serial;

mod common;

use stampede::metrics::{
    MetricRegistry, MetricsSnapshot, Observation, CHECKS, CREATION_TIME, ERRORS, HTTP_REQS,
    HTTP_REQ_DURATION,
};
use stampede::report::{StructuredReport, PERCENTILES};
use stampede::threshold::{evaluate, Thresholds};

const REPORT_FILE: &str = "reports-test-report.json";
const HTML_FILE: &str = "reports-test-report.html";
const EXPORT_FILE: &str = "reports-test-export.json";

fn snapshot() -> MetricsSnapshot {
    let registry = MetricRegistry::new();
    // Values without a short decimal representation.
    for sample in 1..=250 {
        let value = sample as f64 / 3.0 + 0.1;
        registry.record(HTTP_REQ_DURATION, value).unwrap();
        registry.record(CREATION_TIME, value * 1.7).unwrap();
        registry.record(HTTP_REQS, 1u64).unwrap();
        registry.record(ERRORS, sample % 7 == 0).unwrap();
        registry
            .observe(&Observation::new(CHECKS, sample % 11 != 0).tag("check", "has next"))
            .unwrap();
    }
    registry.snapshot().unwrap()
}

// Statistics survive a trip through JSON bit-for-bit.
#[test]
fn test_structured_report_round_trip() {
    let snapshot = snapshot();
    let thresholds = evaluate(&Thresholds::default(), &snapshot);
    let report = StructuredReport::build(&snapshot, &thresholds, &[]);

    let parsed: StructuredReport = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(parsed, report);

    for name in [HTTP_REQ_DURATION, CREATION_TIME] {
        let entry = parsed.get(name).unwrap();
        assert_eq!(entry.avg.map(f64::to_bits), snapshot.avg(name).map(f64::to_bits));
        assert_eq!(entry.min.map(f64::to_bits), snapshot.min(name).map(f64::to_bits));
        assert_eq!(entry.max.map(f64::to_bits), snapshot.max(name).map(f64::to_bits));
        let percentiles = [entry.p50, entry.p90, entry.p95, entry.p99];
        for (value, percent) in percentiles.iter().zip(PERCENTILES) {
            assert_eq!(
                value.map(f64::to_bits),
                snapshot.percentile(name, percent).map(f64::to_bits)
            );
        }
    }
    for name in [ERRORS, CHECKS, "checks{check:has next}"] {
        let entry = parsed.get(name).unwrap();
        assert_eq!(entry.rate.map(f64::to_bits), snapshot.rate(name).map(f64::to_bits));
        assert_eq!(
            entry.per_second.map(f64::to_bits),
            snapshot.per_second(name).map(f64::to_bits)
        );
    }
    assert_eq!(parsed.get(HTTP_REQS).unwrap().count, 250);

    // The raw snapshot round trips as well.
    let export: MetricsSnapshot =
        serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();
    assert_eq!(export, snapshot);
}

#[test]
#[serial]
/// Report files are written once the load test completes.
fn test_report_files() {
    common::cleanup_files(vec![REPORT_FILE, HTML_FILE, EXPORT_FILE]);

    let server = MockServer::start();
    common::mock_health(&server, 200);
    common::mock_intent_success(&server);

    let configuration = common::build_configuration(
        &server,
        vec!["--report-file", REPORT_FILE, "--export-file", EXPORT_FILE],
    );
    let summary = common::run_load_test(configuration);

    let report: StructuredReport =
        serde_json::from_str(&std::fs::read_to_string(REPORT_FILE).unwrap()).unwrap();
    assert_eq!(report, summary.report());
    assert_eq!(report.passed, summary.passed());
    assert_eq!(report.history, summary.history);

    let export: MetricsSnapshot =
        serde_json::from_str(&std::fs::read_to_string(EXPORT_FILE).unwrap()).unwrap();
    assert_eq!(export, summary.snapshot);

    // Without a .json extension the report is HTML.
    let configuration =
        common::build_configuration(&server, vec!["--report-file", HTML_FILE, "--test-plan", "1,1s"]);
    common::run_load_test(configuration);
    let html = std::fs::read_to_string(HTML_FILE).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<td>http_req_duration</td>"));

    common::cleanup_files(vec![REPORT_FILE, HTML_FILE, EXPORT_FILE]);
}
