//! Virtual users, each generating load independently.
//!
//! A [`VirtualUser`] loops until told to stop:
//!  1. build a [`RequestRecord`](../request/struct.RequestRecord.html),
//!  2. `POST` it to the payment intent endpoint,
//!  3. run the response checks and record observations,
//!  4. sleep the configured think-time.
//!
//! A [`UserCommand::Exit`] received while sleeping ends the sleep immediately, while one
//! received at any other point takes effect once the current iteration is observed. A
//! request in flight is never aborted.

use chrono::Utc;
use http::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time;
use strum_macros::Display;

use crate::metrics::{
    MetricRegistry, Observation, CHECKS, CREATION_TIME, ERRORS, HTTP_REQS, HTTP_REQ_DURATION,
    HTTP_REQ_FAILED, ITERATIONS, ITERATION_DURATION,
};
use crate::request::{RequestGenerator, RequestRecord};
use crate::util;
use crate::LoadTestError;

/// Path of the payment intent creation endpoint, relative to the host.
pub const INTENT_PATH: &str = "/v1/sim/intent";

/// Header carrying the per-request idempotency key.
pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Commands the scheduler can send to a running user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Stop after the current iteration.
    Exit,
}

/// Lifecycle of a [`VirtualUser`].
#[derive(Display, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserState {
    Idle,
    Running,
    BuildRequest,
    Calling,
    Observing,
    Sleeping,
    Draining,
    Stopped,
}

/// Settings shared by every user of a load test.
#[derive(Clone, Debug)]
pub struct UserSettings {
    /// Full url of the payment intent endpoint.
    pub endpoint: String,
    /// How long to pause between iterations.
    pub think_time: time::Duration,
    /// How long to wait for a response.
    pub timeout: time::Duration,
    /// Responses slower than this many milliseconds fail the latency check.
    pub latency_ceiling: usize,
    /// Optional seed, making request generation reproducible.
    pub seed: Option<u64>,
}

/// The result of one named response check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

/// What a single call to the endpoint produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallOutcome {
    /// The response status, None if no response was received.
    pub status: Option<StatusCode>,
    /// The response body, empty if none was received.
    pub body: String,
    /// Wall time of the complete call in milliseconds.
    pub elapsed: f64,
}
impl CallOutcome {
    /// A request is failed when no response arrived or the status is not 2xx or 3xx.
    pub fn failed(&self) -> bool {
        match self.status {
            Some(status) => !(status.is_success() || status.is_redirection()),
            None => true,
        }
    }

    /// Run every response check against the outcome.
    ///
    /// # Example
    /// ```rust
    /// use stampede::user::CallOutcome;
    ///
    /// let outcome = CallOutcome {
    ///     status: Some(http::StatusCode::OK),
    ///     body: r#"{"payment_intent_id":"pi_1","status":"pending","next":"webhook"}"#.to_string(),
    ///     elapsed: 12.0,
    /// };
    /// assert!(outcome.checks(500).iter().all(|check| check.passed));
    /// ```
    pub fn checks(&self, latency_ceiling: usize) -> Vec<CheckResult> {
        let json: Option<Value> = serde_json::from_str(&self.body).ok();
        let has = |field: &str| {
            json.as_ref()
                .and_then(|body| body.as_object())
                .map(|body| body.contains_key(field))
                .unwrap_or(false)
        };
        let check = |name: &str, passed: bool| CheckResult {
            name: name.to_string(),
            passed,
        };
        vec![
            check("status is 200", self.status == Some(StatusCode::OK)),
            check(
                &format!("response time < {}ms", latency_ceiling),
                self.status.is_some() && self.elapsed < latency_ceiling as f64,
            ),
            check("has payment_intent_id", has("payment_intent_id")),
            check("has status", has("status")),
            check("has next", has("next")),
            check(
                "next is webhook",
                json.as_ref().and_then(|body| body.get("next")) == Some(&Value::from("webhook")),
            ),
        ]
    }
}

/// One simulated client.
pub struct VirtualUser {
    /// Human visible index, starting at 1.
    pub index: usize,
    /// How many iterations this user has completed.
    pub iteration: usize,
    state: UserState,
    client: reqwest::Client,
    generator: RequestGenerator,
    registry: Arc<MetricRegistry>,
    settings: UserSettings,
}
impl VirtualUser {
    pub fn new(
        index: usize,
        client: reqwest::Client,
        registry: Arc<MetricRegistry>,
        settings: UserSettings,
    ) -> Self {
        VirtualUser {
            index,
            iteration: 0,
            state: UserState::Idle,
            client,
            generator: RequestGenerator::new(index, settings.seed),
            registry,
            settings,
        }
    }

    /// Where the user currently is in its lifecycle.
    pub fn state(&self) -> UserState {
        self.state
    }

    fn set_state(&mut self, state: UserState) {
        if self.state != state {
            trace!("user {}: {} -> {}", self.index, self.state, state);
            self.state = state;
        }
    }

    // Send the request, returning whatever came back. Network errors and timeouts
    // are outcomes, not errors.
    async fn call(&mut self, record: &RequestRecord) -> CallOutcome {
        self.set_state(UserState::Calling);
        let started = time::Instant::now();
        let response = self
            .client
            .post(&self.settings.endpoint)
            .header(IDEMPOTENCY_KEY, &record.idempotency_key)
            .json(record)
            .timeout(self.settings.timeout)
            .send()
            .await;

        let (status, body) = match response {
            Ok(response) => {
                let status = response.status();
                match response.text().await {
                    Ok(body) => (Some(status), body),
                    Err(e) => {
                        debug!("user {}: failed to read response body: {}", self.index, e);
                        (Some(status), String::new())
                    }
                }
            }
            Err(e) => {
                debug!("user {}: {}: {}", self.index, self.settings.endpoint, e);
                (None, e.to_string())
            }
        };
        CallOutcome {
            status,
            body,
            elapsed: started.elapsed().as_secs_f64() * 1_000.0,
        }
    }

    // Record everything learned from one call, returning true if all checks passed.
    fn observe(&mut self, outcome: &CallOutcome) -> Result<bool, LoadTestError> {
        self.set_state(UserState::Observing);
        self.registry.record(HTTP_REQS, 1u64)?;
        if outcome.status.is_some() {
            self.registry.record(HTTP_REQ_DURATION, outcome.elapsed)?;
        }
        self.registry.record(HTTP_REQ_FAILED, outcome.failed())?;
        self.registry.record(CREATION_TIME, outcome.elapsed)?;

        let checks = outcome.checks(self.settings.latency_ceiling);
        for check in &checks {
            self.registry
                .observe(&Observation::new(CHECKS, check.passed).tag("check", &check.name))?;
        }
        let success = checks.iter().all(|check| check.passed);
        self.registry.record(ERRORS, !success)?;

        if !success {
            let status = outcome
                .status
                .map(|status| status.as_u16().to_string())
                .unwrap_or_else(|| "no response".to_string());
            warn!(
                "user {}: request failed: {} - {}",
                self.index,
                status,
                util::truncate_string(&outcome.body, 200)
            );
        }
        Ok(success)
    }

    /// Build, send and observe one request, without sleeping afterwards.
    pub async fn run_iteration(&mut self) -> Result<bool, LoadTestError> {
        self.set_state(UserState::BuildRequest);
        let record = self.generator.generate(self.index, self.iteration, Utc::now());
        debug!(
            "user {}: iteration {} reservation {}",
            self.index, self.iteration, record.reservation_id
        );
        let outcome = self.call(&record).await;
        self.observe(&outcome)
    }

    // Count a completed iteration, including any think-time.
    fn complete_iteration(&mut self, started: time::Instant) -> Result<(), LoadTestError> {
        self.registry.record(ITERATIONS, 1u64)?;
        self.registry.record(
            ITERATION_DURATION,
            started.elapsed().as_secs_f64() * 1_000.0,
        )?;
        self.iteration += 1;
        Ok(())
    }
}

/// Run a user until it is told to exit, or until recording a metric fails.
pub(crate) async fn user_main(
    mut user: VirtualUser,
    receiver: flume::Receiver<UserCommand>,
) -> Result<(), LoadTestError> {
    info!("launching user {}...", user.index);
    user.set_state(UserState::Running);

    loop {
        let started = time::Instant::now();
        user.run_iteration().await?;

        let mut exit = received_exit(&receiver);
        if !exit && !user.settings.think_time.is_zero() {
            user.set_state(UserState::Sleeping);
            exit = tokio::select! {
                _ = tokio::time::sleep(user.settings.think_time) => false,
                command = receiver.recv_async() => match command {
                    Ok(UserCommand::Exit) => true,
                    // The scheduler went away, nothing left to run for.
                    Err(_) => true,
                },
            };
        }
        user.complete_iteration(started)?;

        if exit {
            break;
        }
        user.set_state(UserState::Running);
    }

    user.set_state(UserState::Draining);
    info!(
        "exiting user {} after {} iterations...",
        user.index, user.iteration
    );
    user.set_state(UserState::Stopped);
    Ok(())
}

// Determine if the scheduler has sent a UserCommand::Exit message.
fn received_exit(receiver: &flume::Receiver<UserCommand>) -> bool {
    match receiver.try_recv() {
        Ok(UserCommand::Exit) => true,
        Err(flume::TryRecvError::Disconnected) => true,
        Err(flume::TryRecvError::Empty) => false,
    }
}
