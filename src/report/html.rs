//! HTML rendering of the structured report.

use chrono::SecondsFormat;

use crate::metrics::MetricKind;
use crate::report::common::{format_count, OrEmpty};
use crate::report::{MetricEntry, StructuredReport};
use crate::test_plan::TestPlanHistory;
use crate::threshold::{ThresholdResult, Verdict};

const STYLE: &str = r#"
        body { font-family: Arial, Helvetica, sans-serif; font-size: 14px; margin: 20px; color: #333; }
        .container { width: 1000px; margin: 0 auto; }
        .info span { color: #666; }
        table { border-collapse: collapse; text-align: center; width: 100%; margin-bottom: 30px; }
        td, th { border: 1px solid #cad9ea; height: 30px; padding: 0 8px; }
        thead th { background-color: #cce8eb; }
        tr:nth-child(even) { background: #f5fafa; }
        .pass { color: green; }
        .fail { color: red; }
"#;

/// Render the report as a standalone HTML document.
pub fn render(report: &StructuredReport) -> String {
    let (result_class, result) = if report.passed {
        ("pass", "PASSED")
    } else {
        ("fail", "FAILED")
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Payment Intent Load Test Report</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <h1>Payment Intent Load Test Report</h1>

        <div class="info">
            <p>Started: <span>{started}</span></p>
            <p>Duration: <span>{duration:.1}s</span></p>
            <p>Result: <span class="{result_class}">{result}</span></p>
        </div>

        <h2>Trends</h2>
        <table>
            <thead>
                <tr>
                    <th>Metric</th>
                    <th># Samples</th>
                    <th>Average (ms)</th>
                    <th>Min (ms)</th>
                    <th>50%ile (ms)</th>
                    <th>90%ile (ms)</th>
                    <th>95%ile (ms)</th>
                    <th>99%ile (ms)</th>
                    <th>Max (ms)</th>
                </tr>
            </thead>
            <tbody>
{trends}            </tbody>
        </table>

        <h2>Counters and Rates</h2>
        <table>
            <thead>
                <tr>
                    <th>Metric</th>
                    <th># Observations</th>
                    <th>Rate</th>
                    <th>Per second</th>
                </tr>
            </thead>
            <tbody>
{counters}            </tbody>
        </table>

        <h2>Thresholds</h2>
        <table>
            <thead>
                <tr>
                    <th>Metric</th>
                    <th>Predicate</th>
                    <th>Observed</th>
                    <th>Verdict</th>
                </tr>
            </thead>
            <tbody>
{thresholds}            </tbody>
        </table>

        <h2>Stages</h2>
        <table>
            <thead>
                <tr>
                    <th>Action</th>
                    <th>Started</th>
                    <th>Users</th>
                </tr>
            </thead>
            <tbody>
{history}            </tbody>
        </table>
    </div>
</body>
</html>"#,
        style = STYLE,
        started = report.started.to_rfc3339_opts(SecondsFormat::Secs, true),
        duration = report.duration,
        result_class = result_class,
        result = result,
        trends = rows(report.metrics.iter().filter(|entry| entry.kind == MetricKind::Trend), trend_row),
        counters = rows(report.metrics.iter().filter(|entry| entry.kind != MetricKind::Trend), counter_row),
        thresholds = rows(report.thresholds.results.iter(), threshold_row),
        history = rows(report.history.iter(), history_row),
    )
}

fn rows<'a, T: 'a>(items: impl Iterator<Item = &'a T>, row: fn(&T) -> String) -> String {
    items.map(row).collect()
}

fn trend_row(entry: &MetricEntry) -> String {
    format!(
        r#"                <tr>
                    <td>{}</td>
                    <td>{}</td>
                    <td>{:.2}</td>
                    <td>{:.2}</td>
                    <td>{:.2}</td>
                    <td>{:.2}</td>
                    <td>{:.2}</td>
                    <td>{:.2}</td>
                    <td>{:.2}</td>
                </tr>
"#,
        escape(&entry.name),
        format_count(entry.count),
        OrEmpty(entry.avg),
        OrEmpty(entry.min),
        OrEmpty(entry.p50),
        OrEmpty(entry.p90),
        OrEmpty(entry.p95),
        OrEmpty(entry.p99),
        OrEmpty(entry.max),
    )
}

fn counter_row(entry: &MetricEntry) -> String {
    format!(
        r#"                <tr>
                    <td>{}</td>
                    <td>{}</td>
                    <td>{}</td>
                    <td>{:.2}</td>
                </tr>
"#,
        escape(&entry.name),
        format_count(entry.count),
        OrEmpty(entry.rate.map(|rate| format!("{:.2}%", rate * 100.0))),
        OrEmpty(entry.per_second),
    )
}

fn threshold_row(result: &ThresholdResult) -> String {
    let class = match result.verdict {
        Verdict::Pass => "pass",
        Verdict::Fail | Verdict::NoData => "fail",
    };
    format!(
        r#"                <tr>
                    <td>{}</td>
                    <td>{}</td>
                    <td>{:.4}</td>
                    <td class="{}">{}</td>
                </tr>
"#,
        escape(&result.metric),
        escape(&result.predicate),
        OrEmpty(result.observed),
        class,
        result.verdict,
    )
}

fn history_row(step: &TestPlanHistory) -> String {
    format!(
        r#"                <tr>
                    <td>{}</td>
                    <td>{}</td>
                    <td>{}</td>
                </tr>
"#,
        step.action,
        step.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        step.users,
    )
}

// Metric names and predicates may contain `<` and `>`.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
