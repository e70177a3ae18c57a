use stampede::metrics::{
    MetricKind, MetricRegistry, Observation, CHECKS, ERRORS, HTTP_REQ_DURATION, HTTP_REQ_FAILED,
};
use stampede::threshold::{evaluate, Comparison, Statistic, Thresholds, Verdict, DEFAULT_THRESHOLDS};

#[test]
fn test_default_thresholds() {
    let thresholds = Thresholds::default();
    assert_eq!(thresholds.to_string(), DEFAULT_THRESHOLDS);
    assert_eq!(thresholds.thresholds.len(), 4);
    assert_eq!(thresholds.thresholds[0].metric, HTTP_REQ_DURATION);
    assert_eq!(
        thresholds.thresholds[0].predicate.statistic,
        Statistic::Percentile(95.0)
    );
    assert_eq!(
        thresholds.thresholds[0].predicate.comparison,
        Comparison::LessThan
    );
}

// A rate threshold over a metric that was never observed fails.
#[test]
fn test_no_observations_fail() {
    let registry = MetricRegistry::new();
    registry.register(ERRORS, MetricKind::Rate).unwrap();

    let thresholds: Thresholds = "errors:rate<0.1".parse().unwrap();
    let report = evaluate(&thresholds, &registry.snapshot().unwrap());
    assert_eq!(report.results[0].verdict, Verdict::NoData);
    assert_eq!(report.results[0].observed, None);
    assert!(!report.passed());
    assert!(!report.breached());
}

#[test]
fn test_threshold_verdicts() {
    let registry = MetricRegistry::new();
    for duration in 1..=100 {
        registry
            .record(HTTP_REQ_DURATION, duration as f64 * 5.0)
            .unwrap();
        registry.record(HTTP_REQ_FAILED, duration % 20 == 0).unwrap();
        registry
            .observe(&Observation::new(CHECKS, duration != 50).tag("check", "has next"))
            .unwrap();
    }
    let snapshot = registry.snapshot().unwrap();

    let thresholds: Thresholds = concat!(
        "http_req_duration:p(95)<500,avg<300;",
        "http_req_failed:rate<0.05;",
        "checks{check:has next}:rate>0.98;",
        "http_req_duration:p(99)<480"
    )
    .parse()
    .unwrap();
    let report = evaluate(&thresholds, &snapshot);
    let verdicts: Vec<(String, Verdict)> = report
        .results
        .iter()
        .map(|result| (format!("{}:{}", result.metric, result.predicate), result.verdict))
        .collect();
    assert_eq!(
        verdicts,
        vec![
            ("http_req_duration:p(95)<500".to_string(), Verdict::Pass),
            ("http_req_duration:avg<300".to_string(), Verdict::Pass),
            // Exactly 0.05 is not below 0.05.
            ("http_req_failed:rate<0.05".to_string(), Verdict::Fail),
            ("checks{check:has next}:rate>0.98".to_string(), Verdict::Pass),
            ("http_req_duration:p(99)<480".to_string(), Verdict::Fail),
        ]
    );
    assert!(report.breached());
    assert_eq!(report.failures().count(), 2);
}

// Slow responses are still told apart by percentile thresholds.
#[test]
fn test_slow_percentile_threshold() {
    let registry = MetricRegistry::new();
    for _ in 0..50 {
        registry.record(HTTP_REQ_DURATION, 1001.0).unwrap();
        registry.record(HTTP_REQ_DURATION, 1499.0).unwrap();
    }
    let thresholds: Thresholds = "http_req_duration:p(95)<1200,p(50)<1200".parse().unwrap();
    let report = evaluate(&thresholds, &registry.snapshot().unwrap());
    assert_eq!(report.results[0].verdict, Verdict::Fail);
    assert_eq!(report.results[0].observed, Some(1499.0));
    assert_eq!(report.results[1].verdict, Verdict::Pass);
}

#[test]
fn test_invalid_thresholds() {
    for invalid in ["", "errors", "errors:", ":rate<0.1", "errors:rate=0.1", "errors:p(95<1"] {
        assert!(
            invalid.parse::<Thresholds>().is_err(),
            "{:?} should not parse",
            invalid
        );
    }
}
