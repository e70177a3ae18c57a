use gumdrop::Options;
use httpmock::{
    Method::{GET, POST},
    Mock, MockServer,
};
use serde_json::json;

use stampede::config::LoadTestConfiguration;
use stampede::{LoadTest, RunSummary};

/// Not all functions are used by all tests, so we enable allow(dead_code) to avoid
/// compiler warnings during testing.

/// The following options are configured by default, if not set to a custom value:
///  --host <mock-server>
///  --test-plan "2,1s;0,1s"
///  --think-time 0.05
///  --no-print-metrics
pub fn build_configuration(server: &MockServer, custom: Vec<&str>) -> LoadTestConfiguration {
    // Start with an empty configuration.
    let mut configuration: Vec<&str> = vec![];
    // Declare server_url here no matter what, so its lifetime is sufficient when needed.
    let server_url = server.base_url();

    // Merge in all custom options first.
    configuration.extend_from_slice(&custom);

    // Default to using mock server if not otherwise configured.
    if !configuration.contains(&"--host") {
        configuration.extend_from_slice(&["--host", &server_url]);
    }

    // Default to a two second profile if not otherwise configured.
    if !configuration.contains(&"--test-plan") {
        configuration.extend_from_slice(&["--test-plan", "2,1s;0,1s"]);
    }

    // Default to a short think-time if not otherwise configured.
    if !configuration.contains(&"--think-time") {
        configuration.extend_from_slice(&["--think-time", "0.05"]);
    }

    if !configuration.contains(&"--no-print-metrics") {
        configuration.push("--no-print-metrics");
    }

    // Parse these options to generate a LoadTestConfiguration.
    LoadTestConfiguration::parse_args_default(&configuration)
        .expect("failed to parse options and generate a configuration")
}

/// Mock a healthy `/healthz` endpoint.
#[allow(dead_code)]
pub fn mock_health(server: &MockServer, status: u16) -> Mock {
    server.mock(|when, then| {
        when.method(GET).path("/healthz");
        then.status(status).body("OK");
    })
}

/// Mock the payment intent endpoint answering as a healthy simulator would.
#[allow(dead_code)]
pub fn mock_intent_success(server: &MockServer) -> Mock {
    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/sim/intent")
            .header_exists("Idempotency-Key")
            .header("Content-Type", "application/json")
            .body_includes("\"reservation_id\":\"rsv_");
        then.status(200).json_body(json!({
            "payment_intent_id": "pi_123",
            "status": "requires_confirmation",
            "next": "webhook",
        }));
    })
}

/// Mock the payment intent endpoint failing every request.
#[allow(dead_code)]
pub fn mock_intent_failure(server: &MockServer, status: u16) -> Mock {
    server.mock(|when, then| {
        when.method(POST).path("/v1/sim/intent");
        then.status(status).json_body(json!({ "error": "simulated failure" }));
    })
}

/// Run the actual load test, returning the RunSummary.
#[allow(dead_code)]
pub fn run_load_test(configuration: LoadTestConfiguration) -> RunSummary {
    LoadTest::initialize_with_config(configuration)
        .unwrap()
        .execute()
        .unwrap()
}

/// Helper to delete test artifacts, if existing.
#[allow(dead_code)]
pub fn cleanup_files(files: Vec<&str>) {
    for file in files {
        if std::path::Path::new(file).exists() {
            std::fs::remove_file(file).expect("failed to remove file");
        }
    }
}
