//! # Stampede
//!
//! Stampede is a load testing harness for a payment intent API. It ramps a population
//! of virtual users through a staged profile, has each of them repeatedly create payment
//! intents, aggregates every observation into a metric registry, and decides whether the
//! load test passed by evaluating thresholds against the aggregated metrics.
//!
//! ## Stages
//!
//! The load profile is a list of stages, each a target number of users and a timespan
//! over which the number of running users moves linearly from the previous target to the
//! new target. The default profile is:
//!
//! ```text
//! 10,30s;50,1m;100,2m;200,1m;0,30s
//! ```
//!
//! Every 100 milliseconds the scheduler compares the desired number of users with the
//! number of users running, launching new users or telling the most recently launched
//! users to stop. Once the last stage ends the load test drains: every user finishes its
//! current iteration and exits.
//!
//! ## Thresholds
//!
//! Thresholds are predicates over aggregated metrics, for example
//! `http_req_duration:p(95)<500;errors:rate<0.1`. They are evaluated once per second
//! while the load test runs, and authoritatively over the final metrics once it
//! completes. A threshold on a metric that was never observed fails.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stampede::prelude::*;
//!
//! fn main() -> Result<(), LoadTestError> {
//!     let summary = LoadTest::initialize()?
//!         .set_default(LoadTestDefault::Host, "http://localhost:8080")?
//!         .set_default(LoadTestDefault::TestPlan, "5,10s;5,20s;0,5s")?
//!         .execute()?;
//!
//!     if !summary.passed() {
//!         std::process::exit(1);
//!     }
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate log;

pub mod config;
mod logger;
pub mod metrics;
pub mod prelude;
pub mod report;
pub mod request;
pub mod test_plan;
pub mod threshold;
pub mod user;
pub mod util;

use gumdrop::Options;
use http::StatusCode;
use std::cmp::Ordering;
use std::sync::Arc;
use std::{fmt, io, time};
use tokio::runtime::Runtime;

use crate::config::{LoadTestConfiguration, LoadTestDefaults};
use crate::metrics::{MetricKind, MetricRegistry, MetricsSnapshot};
use crate::report::StructuredReport;
use crate::test_plan::{TestPlan, TestPlanHistory};
use crate::threshold::{ThresholdReport, Thresholds};
use crate::user::{UserCommand, UserSettings, VirtualUser};

/// Path checked before any load is generated.
pub const HEALTH_PATH: &str = "/healthz";

/// How often the scheduler reconciles the number of running users.
const TICK: time::Duration = time::Duration::from_millis(100);

/// How often thresholds are evaluated while the load test runs, in milliseconds.
const THRESHOLD_INTERVAL: usize = 1_000;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// An enumeration of all errors a [`LoadTest`](./struct.LoadTest.html) can return.
#[derive(Debug)]
pub enum LoadTestError {
    /// Wraps a [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    Io(io::Error),
    /// Wraps a [`reqwest::Error`](https://docs.rs/reqwest/*/reqwest/struct.Error.html).
    Reqwest(reqwest::Error),
    /// Wraps a ['tokio::task::JoinError'](https://tokio-rs.github.io/tokio/doc/tokio/task/struct.JoinError.html).
    TokioJoin(tokio::task::JoinError),
    /// Wraps a [`serde_json::Error`](https://docs.rs/serde_json/*/serde_json/struct.Error.html).
    Serde(serde_json::Error),
    /// Failed to parse a hostname.
    InvalidHost {
        /// The invalid hostname that caused this error.
        host: String,
        /// An optional explanation of the error.
        detail: String,
        /// Wraps a [`url::ParseError`](https://docs.rs/url/*/url/enum.ParseError.html).
        parse_error: url::ParseError,
    },
    /// Invalid option or value specified, may only be invalid in context.
    InvalidOption {
        /// The invalid option that caused this error, may be only invalid in context.
        option: String,
        /// The invalid value that caused this error, may be only invalid in context.
        value: String,
        /// An optional explanation of the error.
        detail: String,
    },
    /// The target failed its health check, no load was generated.
    HealthCheck {
        /// The url that was checked.
        url: String,
        /// What went wrong.
        detail: String,
    },
    /// A metric was recorded with a value of the wrong kind.
    MetricKind {
        metric: String,
        expected: MetricKind,
        found: MetricKind,
    },
    /// A metric lock was poisoned by a panicking user.
    RegistryPoisoned { metric: String },
}
/// Implement a helper to provide a text description of all possible types of errors.
impl LoadTestError {
    fn describe(&self) -> &str {
        match *self {
            LoadTestError::Io(_) => "io::Error",
            LoadTestError::Reqwest(_) => "reqwest::Error",
            LoadTestError::TokioJoin(_) => "tokio::task::JoinError",
            LoadTestError::Serde(_) => "serde_json::Error",
            LoadTestError::InvalidHost { .. } => "failed to parse hostname",
            LoadTestError::InvalidOption { .. } => "invalid option or value specified",
            LoadTestError::HealthCheck { .. } => "health check failed",
            LoadTestError::MetricKind { .. } => "metric recorded with the wrong kind",
            LoadTestError::RegistryPoisoned { .. } => "metric registry poisoned",
        }
    }
}

/// Implement format trait to allow displaying errors.
impl fmt::Display for LoadTestError {
    // Implement display of error with `{}` marker.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoadTestError::Io(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Reqwest(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::TokioJoin(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Serde(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::InvalidHost {
                ref host,
                ref parse_error,
                ..
            } => write!(
                f,
                "LoadTestError: {} {} ({})",
                self.describe(),
                host,
                parse_error
            ),
            LoadTestError::InvalidOption { ref detail, .. } => {
                write!(f, "LoadTestError: {}: {}", self.describe(), detail)
            }
            LoadTestError::HealthCheck {
                ref url,
                ref detail,
            } => write!(f, "LoadTestError: {} for {}: {}", self.describe(), url, detail),
            LoadTestError::MetricKind {
                ref metric,
                expected,
                found,
            } => write!(
                f,
                "LoadTestError: {}: {} is a {}, not a {}",
                self.describe(),
                metric,
                expected,
                found
            ),
            LoadTestError::RegistryPoisoned { ref metric } => {
                write!(f, "LoadTestError: {} ({})", self.describe(), metric)
            }
        }
    }
}

// Define the lower level source of this error, if any.
impl std::error::Error for LoadTestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            LoadTestError::Io(ref source) => Some(source),
            LoadTestError::Reqwest(ref source) => Some(source),
            LoadTestError::TokioJoin(ref source) => Some(source),
            LoadTestError::Serde(ref source) => Some(source),
            LoadTestError::InvalidHost {
                ref parse_error, ..
            } => Some(parse_error),
            _ => None,
        }
    }
}

/// Auto-convert Reqwest errors.
impl From<reqwest::Error> for LoadTestError {
    fn from(err: reqwest::Error) -> LoadTestError {
        LoadTestError::Reqwest(err)
    }
}

/// Auto-convert IO errors.
impl From<io::Error> for LoadTestError {
    fn from(err: io::Error) -> LoadTestError {
        LoadTestError::Io(err)
    }
}

/// Auto-convert TokioJoin errors.
impl From<tokio::task::JoinError> for LoadTestError {
    fn from(err: tokio::task::JoinError) -> LoadTestError {
        LoadTestError::TokioJoin(err)
    }
}

/// Auto-convert serde_json errors.
impl From<serde_json::Error> for LoadTestError {
    fn from(err: serde_json::Error) -> LoadTestError {
        LoadTestError::Serde(err)
    }
}

/// A [`LoadTest`](./struct.LoadTest.html) moves through each of the following phases
/// exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttackPhase {
    /// Configured but not yet generating load.
    Idle,
    /// Users are launched and stopped to follow the stage profile.
    Ramping,
    /// All users have been told to stop, waiting for their current iterations.
    Draining,
    /// Every user has exited.
    Complete,
}

// A launched user, newest last.
struct UserHandle {
    index: usize,
    sender: flume::Sender<UserCommand>,
    handle: tokio::task::JoinHandle<Result<(), LoadTestError>>,
}

/// Internal run state for a load test.
pub(crate) struct RunState {
    /// Running users, in launch order.
    users: Vec<UserHandle>,
    /// Users that were told to exit and may still be finishing an iteration.
    stopping: Vec<tokio::task::JoinHandle<Result<(), LoadTestError>>>,
    /// Index of the most recently launched user.
    last_user: usize,
    /// Shared by every user, so connections are pooled.
    client: reqwest::Client,
    settings: UserSettings,
    registry: Arc<MetricRegistry>,
    /// This variable accounts for time spent doing things which is then subtracted from
    /// the time sleeping to avoid an unintentional drift in events that are supposed to
    /// happen regularly.
    drift_timer: tokio::time::Instant,
    /// Timer tracking when to next evaluate thresholds.
    threshold_timer: time::Instant,
    /// Whether thresholds passed when last evaluated.
    thresholds_passing: Option<bool>,
    /// Timer tracking when to display running metrics, if enabled.
    running_metrics_timer: time::Instant,
}
impl RunState {
    fn new(client: reqwest::Client, settings: UserSettings, registry: Arc<MetricRegistry>) -> Self {
        let now = time::Instant::now();
        RunState {
            users: Vec::new(),
            stopping: Vec::new(),
            last_user: 0,
            client,
            settings,
            registry,
            drift_timer: tokio::time::Instant::now(),
            threshold_timer: now,
            thresholds_passing: None,
            running_metrics_timer: now,
        }
    }

    /// Number of users that have not been told to stop.
    pub(crate) fn active_users(&self) -> usize {
        self.users.len()
    }

    fn launch_users(&mut self, count: usize) {
        for _ in 0..count {
            self.last_user += 1;
            let index = self.last_user;
            let (sender, receiver) = flume::unbounded();
            let user = VirtualUser::new(
                index,
                self.client.clone(),
                self.registry.clone(),
                self.settings.clone(),
            );
            let handle = tokio::spawn(user::user_main(user, receiver));
            self.users.push(UserHandle {
                index,
                sender,
                handle,
            });
        }
    }

    /// Tell the `count` most recently launched users to exit.
    pub(crate) fn stop_users(&mut self, count: usize) {
        for _ in 0..count {
            let user = match self.users.pop() {
                Some(user) => user,
                None => break,
            };
            match user.sender.send(UserCommand::Exit) {
                Ok(_) => {
                    debug!("telling user {} to exit", user.index);
                }
                Err(e) => {
                    info!("failed to tell user {} to exit: {}", user.index, e);
                }
            }
            self.stopping.push(user.handle);
        }
    }

    /// Launch or stop users until `desired` are running.
    fn reconcile(&mut self, desired: usize) {
        let active = self.active_users();
        match desired.cmp(&active) {
            Ordering::Greater => {
                debug!("launching {} users", desired - active);
                self.launch_users(desired - active);
            }
            Ordering::Less => {
                debug!("stopping {} users", active - desired);
                self.stop_users(active - desired);
            }
            Ordering::Equal => (),
        }
    }

    // Users only exit on their own when recording a metric failed.
    fn user_exited(&self) -> Option<usize> {
        self.users
            .iter()
            .find(|user| user.handle.is_finished())
            .map(|user| user.index)
    }
}

/// The outcome of a completed load test.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// All metrics, as they were when the last user exited.
    pub snapshot: MetricsSnapshot,
    /// Thresholds evaluated over the final snapshot.
    pub thresholds: ThresholdReport,
    /// Each stage of the profile, as it began.
    pub history: Vec<TestPlanHistory>,
}
impl RunSummary {
    /// True only if every threshold passed.
    pub fn passed(&self) -> bool {
        self.thresholds.passed()
    }

    /// Build the structured report of this load test.
    pub fn report(&self) -> StructuredReport {
        StructuredReport::build(&self.snapshot, &self.thresholds, &self.history)
    }
}

/// Global internal state for the load test.
pub struct LoadTest {
    /// Optional default values for run-time options.
    defaults: LoadTestDefaults,
    /// Configuration object holding options set when launching the load test.
    configuration: LoadTestConfiguration,
    /// The stage profile users are ramped through.
    test_plan: TestPlan,
    /// Thresholds deciding whether the load test passed.
    thresholds: Thresholds,
    /// Which phase the load test is currently operating in.
    attack_phase: AttackPhase,
    /// Position of the stage currently running.
    current_stage: Option<usize>,
    /// Each stage, as it began.
    history: Vec<TestPlanHistory>,
    /// When the load test started ramping.
    started: Option<time::Instant>,
    /// Aggregates every observation made by every user.
    registry: Arc<MetricRegistry>,
}
impl LoadTest {
    /// Load configuration from the command line and initialize a
    /// [`LoadTest`](./struct.LoadTest.html).
    ///
    /// # Example
    /// ```rust,no_run
    /// use stampede::prelude::*;
    ///
    /// let load_test = LoadTest::initialize();
    /// ```
    pub fn initialize() -> Result<LoadTest, LoadTestError> {
        LoadTest::initialize_with_config(LoadTestConfiguration::parse_args_default_or_exit())
    }

    /// Initialize a [`LoadTest`](./struct.LoadTest.html) with an already loaded
    /// configuration.
    ///
    /// # Example
    /// ```rust
    /// use stampede::LoadTest;
    /// use stampede::config::LoadTestConfiguration;
    /// use gumdrop::Options;
    ///
    /// let configuration = LoadTestConfiguration::parse_args_default(&["--seed", "7"]).unwrap();
    /// let load_test = LoadTest::initialize_with_config(configuration);
    /// ```
    pub fn initialize_with_config(
        configuration: LoadTestConfiguration,
    ) -> Result<LoadTest, LoadTestError> {
        Ok(LoadTest {
            defaults: LoadTestDefaults::default(),
            configuration,
            test_plan: TestPlan::default(),
            thresholds: Thresholds::default(),
            attack_phase: AttackPhase::Idle,
            current_stage: None,
            history: Vec::new(),
            started: None,
            registry: Arc::new(MetricRegistry::new()),
        })
    }

    // Change from one attack_phase to another.
    fn set_attack_phase(&mut self, phase: AttackPhase) {
        // There's nothing to do if already in the specified phase.
        if self.attack_phase == phase {
            return;
        }
        info!("entering load test phase: {:?}", &phase);
        self.attack_phase = phase;
    }

    // How long the load test has been ramping.
    fn elapsed(&self) -> time::Duration {
        self.started
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    fn user_settings(&self) -> UserSettings {
        UserSettings {
            endpoint: format!(
                "{}{}",
                self.configuration.host.trim_end_matches('/'),
                user::INTENT_PATH
            ),
            think_time: self.configuration.think_time(),
            timeout: self.configuration.timeout(),
            latency_ceiling: self
                .configuration
                .latency_ceiling
                .unwrap_or(config::DEFAULT_LATENCY_CEILING),
            seed: self.configuration.seed,
        }
    }

    /// Execute the [`LoadTest`](./struct.LoadTest.html) load test.
    ///
    /// Returns once every user has exited. Threshold failures are reported through
    /// [`RunSummary::passed`], errors are reserved for invalid configuration, a failed
    /// health check and internal defects.
    ///
    /// # Example
    /// ```rust,no_run
    /// use stampede::prelude::*;
    ///
    /// fn main() -> Result<(), LoadTestError> {
    ///     let summary = LoadTest::initialize()?
    ///         .set_default(LoadTestDefault::TestPlan, "2,2s;0,1s")?
    ///         .set_default(LoadTestDefault::NoPrintMetrics, true)?
    ///         .execute()?;
    ///
    ///     println!("passed: {}", summary.passed());
    ///     Ok(())
    /// }
    /// ```
    pub fn execute(mut self) -> Result<RunSummary, LoadTestError> {
        // If version flag is set, display package name and version and exit.
        if self.configuration.version {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            std::process::exit(0);
        }

        // Configure LoadTestConfiguration.
        self.configuration.configure(&self.defaults);

        // Validate LoadTestConfiguration.
        self.configuration.validate()?;

        self.test_plan = self.configuration.test_plan.clone().unwrap_or_default();
        self.thresholds = self.configuration.thresholds.clone().unwrap_or_default();
        info!(
            "test plan: {} (up to {} users)",
            self.test_plan,
            self.test_plan.max_users()
        );
        info!("thresholds: {}", self.thresholds);

        let rt = Runtime::new()?;
        rt.block_on(self.start_attack())
    }

    // Confirm the target is up before generating any load.
    async fn health_check(&self, client: &reqwest::Client) -> Result<(), LoadTestError> {
        let url = format!(
            "{}{}",
            self.configuration.host.trim_end_matches('/'),
            HEALTH_PATH
        );
        info!("checking health of {}", url);
        let detail = match client
            .get(&url)
            .timeout(self.configuration.timeout())
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => return Ok(()),
            Ok(response) => format!("unexpected status {}", response.status()),
            Err(e) => e.to_string(),
        };
        error!("health check of {} failed: {}", url, detail);
        Err(LoadTestError::HealthCheck { url, detail })
    }

    // Declare every metric users record, so each appears in reports even if never
    // observed.
    fn register_metrics(&self) -> Result<(), LoadTestError> {
        for (name, kind) in [
            (metrics::HTTP_REQS, MetricKind::Counter),
            (metrics::HTTP_REQ_DURATION, MetricKind::Trend),
            (metrics::HTTP_REQ_FAILED, MetricKind::Rate),
            (metrics::CREATION_TIME, MetricKind::Trend),
            (metrics::ERRORS, MetricKind::Rate),
            (metrics::CHECKS, MetricKind::Rate),
            (metrics::ITERATIONS, MetricKind::Counter),
            (metrics::ITERATION_DURATION, MetricKind::Trend),
        ] {
            self.registry.register(name, kind)?;
        }
        Ok(())
    }

    // Prepare a new RunState and start ramping.
    async fn initialize_attack(&mut self) -> Result<RunState, LoadTestError> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .gzip(true)
            .build()?;

        if self.configuration.no_health_check {
            info!("skipping health check");
        } else {
            self.health_check(&client).await?;
        }

        for index in self.test_plan.skipped_stages() {
            warn!("skipping stage {}: it has no duration", index + 1);
        }

        util::setup_ctrlc_handler();

        // Metrics only cover the time spent generating load.
        self.registry = Arc::new(MetricRegistry::new());
        self.register_metrics()?;
        self.history = Vec::new();
        self.current_stage = None;

        let run_state = RunState::new(client, self.user_settings(), self.registry.clone());
        self.started = Some(time::Instant::now());
        Ok(run_state)
    }

    // Follow the stage profile for one tick.
    async fn ramp(&mut self, run_state: &mut RunState) -> Result<(), LoadTestError> {
        let elapsed = self.elapsed();
        match self.test_plan.desired_users(elapsed) {
            Some(desired) => {
                self.track_stage(run_state, elapsed);
                run_state.reconcile(desired);
            }
            None => {
                info!("completed test plan after {:.1}s", elapsed.as_secs_f64());
                self.begin_draining(run_state);
                return Ok(());
            }
        }

        if let Some(index) = run_state.user_exited() {
            error!("user {} exited unexpectedly, draining", index);
            self.begin_draining(run_state);
            return Ok(());
        }

        self.check_thresholds(run_state)?;
        self.display_running_metrics(run_state)?;

        run_state.drift_timer = util::sleep_minus_drift(TICK, run_state.drift_timer).await;
        Ok(())
    }

    // Evaluate thresholds once per interval, logging when their status changes.
    fn check_thresholds(&mut self, run_state: &mut RunState) -> Result<(), LoadTestError> {
        if !util::ms_timer_expired(run_state.threshold_timer, THRESHOLD_INTERVAL) {
            return Ok(());
        }
        run_state.threshold_timer = time::Instant::now();

        let report = threshold::evaluate(&self.thresholds, &self.registry.snapshot()?);
        let passing = report.passed();
        if run_state.thresholds_passing != Some(passing) {
            if passing {
                info!("all thresholds passing");
            } else {
                for failure in report.failures() {
                    info!(
                        "threshold {}:{} is failing ({})",
                        failure.metric, failure.predicate, failure.verdict
                    );
                }
            }
            run_state.thresholds_passing = Some(passing);
        }

        if self.configuration.abort_on_fail && report.breached() {
            warn!("threshold breached, draining early");
            self.begin_draining(run_state);
        }
        Ok(())
    }

    // Optionally print the summary of the live metrics.
    fn display_running_metrics(&self, run_state: &mut RunState) -> Result<(), LoadTestError> {
        let interval = match self.configuration.running_metrics {
            Some(interval) => interval,
            None => return Ok(()),
        };
        if util::timer_expired(run_state.running_metrics_timer, interval) {
            run_state.running_metrics_timer = time::Instant::now();
            let snapshot = self.registry.snapshot()?;
            println!("{}", report::text::summary(&snapshot, None));
        }
        Ok(())
    }

    // Wait for every user to finish its current iteration.
    async fn drain(&mut self, run_state: &mut RunState) -> Result<(), LoadTestError> {
        // Anything still running was launched after draining began.
        run_state.stop_users(run_state.active_users());
        info!("waiting for {} users to exit", run_state.stopping.len());

        // Take the handles out of the RunState so they can be consumed by
        // futures::future::join_all().
        let users = std::mem::take(&mut run_state.stopping);
        let results = futures::future::join_all(users).await;
        debug!("all users exited");

        for result in results {
            result??;
        }
        Ok(())
    }

    // Render the text summary and write any configured report files.
    async fn write_reports(&self, summary: &RunSummary) -> Result<(), LoadTestError> {
        if !self.configuration.no_print_metrics {
            println!(
                "{}",
                report::text::summary(&summary.snapshot, Some(&summary.thresholds))
            );
        }
        if !self.configuration.report_file.is_empty() {
            report::write_report_file(&self.configuration.report_file, &summary.report()).await?;
        }
        if !self.configuration.export_file.is_empty() {
            report::write_export_file(&self.configuration.export_file, &summary.snapshot).await?;
        }
        Ok(())
    }

    // Called by execute() inside the runtime.
    async fn start_attack(mut self) -> Result<RunSummary, LoadTestError> {
        let mut run_state = self.initialize_attack().await?;
        self.set_attack_phase(AttackPhase::Ramping);

        // The load test loop runs until every user has exited.
        loop {
            match self.attack_phase {
                AttackPhase::Ramping => {
                    self.ramp(&mut run_state).await?;
                    // Gracefully drain if ctrl-c is caught.
                    if self.attack_phase == AttackPhase::Ramping && util::canceled() {
                        self.begin_draining(&mut run_state);
                    }
                }
                AttackPhase::Draining => {
                    self.drain(&mut run_state).await?;
                    self.set_attack_phase(AttackPhase::Complete);
                }
                AttackPhase::Idle | AttackPhase::Complete => break,
            }
        }

        let snapshot = self.registry.snapshot()?;
        let thresholds = threshold::evaluate(&self.thresholds, &snapshot);
        let summary = RunSummary {
            snapshot,
            thresholds,
            history: std::mem::take(&mut self.history),
        };
        self.write_reports(&summary).await?;

        if summary.passed() {
            info!("load test passed");
        } else {
            warn!(
                "load test failed {} of {} thresholds",
                summary.thresholds.failures().count(),
                summary.thresholds.results.len()
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_display() {
        let error = LoadTestError::HealthCheck {
            url: "http://localhost:1/healthz".to_string(),
            detail: "unexpected status 503 Service Unavailable".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "LoadTestError: health check failed for http://localhost:1/healthz: unexpected status 503 Service Unavailable"
        );

        let error = LoadTestError::MetricKind {
            metric: "errors".to_string(),
            expected: MetricKind::Rate,
            found: MetricKind::Trend,
        };
        assert_eq!(
            error.to_string(),
            "LoadTestError: metric recorded with the wrong kind: errors is a rate, not a trend"
        );
        assert!(std::error::Error::source(&error).is_none());

        let error: LoadTestError = serde_json::from_str::<u64>("nope").unwrap_err().into();
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn user_settings() {
        let configuration =
            LoadTestConfiguration::parse_args_default(&["--host", "http://target:9000/"]).unwrap();
        let mut load_test = LoadTest::initialize_with_config(configuration).unwrap();
        load_test.configuration.configure(&LoadTestDefaults::default());
        let settings = load_test.user_settings();
        assert_eq!(settings.endpoint, "http://target:9000/v1/sim/intent");
        assert_eq!(settings.think_time, time::Duration::from_millis(100));
        assert_eq!(settings.timeout, time::Duration::from_secs(10));
        assert_eq!(settings.latency_ceiling, 500);
        assert_eq!(settings.seed, None);
    }

    #[tokio::test]
    async fn stop_newest_users_first() {
        let registry = Arc::new(MetricRegistry::new());
        let settings = UserSettings {
            // Nothing listens here, every request fails quickly.
            endpoint: "http://127.0.0.1:1/v1/sim/intent".to_string(),
            think_time: time::Duration::from_secs(60),
            timeout: time::Duration::from_millis(50),
            latency_ceiling: 500,
            seed: Some(1),
        };
        let mut run_state = RunState::new(reqwest::Client::new(), settings, registry);

        run_state.reconcile(3);
        assert_eq!(run_state.active_users(), 3);
        run_state.reconcile(1);
        assert_eq!(run_state.active_users(), 1);
        assert_eq!(run_state.users[0].index, 1);
        assert_eq!(run_state.stopping.len(), 2);

        run_state.reconcile(2);
        assert_eq!(run_state.users[1].index, 4);

        run_state.stop_users(run_state.active_users());
        let users = std::mem::take(&mut run_state.stopping);
        for result in futures::future::join_all(users).await {
            assert!(result.unwrap().is_ok());
        }
    }
}
