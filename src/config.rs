//! Functions and structures related to configuring a Stampede load test.
//!
//! Stampede can be configured at run time by passing in the options and flags defined by
//! the [`LoadTestConfiguration`] structure.
//!
//! Stampede can be configured programmatically with [`LoadTestDefaultType::set_default`].
//!
//! Values are chosen with the following precedence, highest first:
//!  1. run time options and flags,
//!  2. programmatic defaults,
//!  3. the environment (only `BASE_URL`, for the host),
//!  4. built-in defaults.

use gumdrop::Options;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time;

use crate::test_plan::TestPlan;
use crate::threshold::Thresholds;
use crate::util;
use crate::{LoadTest, LoadTestError};

/// Host used when none is configured anywhere.
pub const DEFAULT_HOST: &str = "http://localhost:8080";
/// Environment variable consulted for the host.
pub const HOST_ENV: &str = "BASE_URL";
/// Seconds each user pauses between iterations.
pub const DEFAULT_THINK_TIME: &str = "0.1";
/// Seconds to wait for a response.
pub const DEFAULT_TIMEOUT: &str = "10";
/// Milliseconds a response may take before failing the latency check.
pub const DEFAULT_LATENCY_CEILING: usize = 500;

/// Runtime options available when launching a Stampede load test.
///
/// Custom defaults can be programmatically set for most of these options using
/// [`LoadTestDefaultType::set_default`].
///
/// Stampede leverages [`gumdrop`](https://docs.rs/gumdrop/) to derive the help from
/// the below structure.
#[derive(Options, Debug, Clone, Default, Serialize, Deserialize)]
#[options(
    help = r#"Stampede ramps virtual users through a staged profile against a payment
intent API, then checks the collected metrics against pass/fail thresholds.

The following runtime options are available when launching a load test:"#
)]
pub struct LoadTestConfiguration {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Prints version information
    // Add a blank line after this option
    #[options(short = "V", help = "Prints version information\n")]
    pub version: bool,

    /// Defines host to load test (default: $BASE_URL or http://localhost:8080)
    #[options(short = "H")]
    pub host: String,
    /// Defines the stage profile, "target,timespan;target,timespan"
    #[options(short = "p", meta = "\"TESTPLAN\"")]
    pub test_plan: Option<TestPlan>,
    /// Defines pass/fail thresholds, "metric:predicate;metric:predicate"
    #[options(short = "T", meta = "\"THRESHOLDS\"")]
    pub thresholds: Option<Thresholds>,
    /// Seconds each user pauses between iterations (default: 0.1)
    #[options(no_short, meta = "VALUE")]
    pub think_time: Option<String>,
    /// Seconds to wait for each response (default: 10)
    #[options(no_short, meta = "VALUE")]
    pub timeout: Option<String>,
    /// Milliseconds a response may take to pass checks (default: 500)
    #[options(no_short, meta = "MS")]
    pub latency_ceiling: Option<usize>,
    /// Seeds request generation for reproducible runs
    #[options(no_short, meta = "SEED")]
    pub seed: Option<u64>,
    /// Drains early once a threshold fails
    #[options(no_short)]
    pub abort_on_fail: bool,
    /// Skips the health check before starting
    // Add a blank line and then a 'Metrics:' header after this option
    #[options(no_short, help = "Skips the health check before starting\n\nMetrics:")]
    pub no_health_check: bool,

    /// How often to optionally print running metrics
    #[options(no_short, meta = "TIME")]
    pub running_metrics: Option<usize>,
    /// Doesn't display metrics at end of load test
    #[options(no_short)]
    pub no_print_metrics: bool,
    /// Create a report file, JSON if NAME ends in .json otherwise HTML
    #[options(short = "R", meta = "NAME")]
    pub report_file: String,
    /// Export the raw metrics snapshot as JSON
    // Add a blank line and then a 'Logging:' header after this option
    #[options(
        short = "E",
        meta = "NAME",
        help = "Export the raw metrics snapshot as JSON\n\nLogging:"
    )]
    pub export_file: String,

    /// Enables log file and sets name
    #[options(short = "G", meta = "NAME")]
    pub log_file: String,
    /// Increases log file verbosity (-g, -gg, etc)
    #[options(short = "g", count)]
    pub log_level: u8,
    /// Decreases stdout verbosity (-q, -qq, etc)
    #[options(count, short = "q")]
    pub quiet: u8,
    /// Increases stdout verbosity (-v, -vv, etc)
    #[options(count, short = "v")]
    pub verbose: u8,
}

/// Optional default values for Stampede run-time options.
///
/// These custom defaults can be configured using [`LoadTestDefaultType::set_default()`].
#[derive(Clone, Debug, Default)]
pub(crate) struct LoadTestDefaults {
    /// An optional default host to run this load test against.
    pub host: Option<String>,
    /// An optional default stage profile.
    pub test_plan: Option<TestPlan>,
    /// Optional default thresholds.
    pub thresholds: Option<Thresholds>,
    /// An optional default think-time, in seconds.
    pub think_time: Option<String>,
    /// An optional default request timeout, in seconds.
    pub timeout: Option<String>,
    /// An optional default latency ceiling, in milliseconds.
    pub latency_ceiling: Option<usize>,
    /// An optional default seed.
    pub seed: Option<u64>,
    /// An optional default for draining once a threshold fails.
    pub abort_on_fail: Option<bool>,
    /// An optional default for skipping the health check.
    pub no_health_check: Option<bool>,
    /// An optional default for printing running metrics.
    pub running_metrics: Option<usize>,
    /// An optional default for not displaying metrics at the end of the load test.
    pub no_print_metrics: Option<bool>,
    /// An optional default for the report file name.
    pub report_file: Option<String>,
    /// An optional default for the raw export file name.
    pub export_file: Option<String>,
    /// An optional default for the log file name.
    pub log_file: Option<String>,
    /// An optional default log level.
    pub log_level: Option<u8>,
    /// An optional default value for quiet level.
    pub quiet: Option<u8>,
    /// An optional default value for verbosity level.
    pub verbose: Option<u8>,
}

/// Defines all [`LoadTestConfiguration`] options that can be programmatically configured
/// with a custom default.
///
/// These custom defaults can be configured using [`LoadTestDefaultType::set_default()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTestDefault {
    /// An optional default host to run this load test against.
    Host,
    /// An optional default stage profile.
    TestPlan,
    /// Optional default thresholds.
    Thresholds,
    /// An optional default think-time, in seconds.
    ThinkTime,
    /// An optional default timeout for all requests, in seconds.
    Timeout,
    /// An optional default latency ceiling, in milliseconds.
    LatencyCeiling,
    /// An optional default seed for request generation.
    Seed,
    /// An optional default for draining once a threshold fails.
    AbortOnFail,
    /// An optional default for skipping the health check.
    NoHealthCheck,
    /// An optional default for printing running metrics.
    RunningMetrics,
    /// An optional default for not displaying metrics at end of load test.
    NoPrintMetrics,
    /// An optional default for the report file name.
    ReportFile,
    /// An optional default for the raw export file name.
    ExportFile,
    /// An optional default for the log file name.
    LogFile,
    /// An optional default log level.
    LogLevel,
    /// An optional default value for quiet level.
    Quiet,
    /// An optional default value for verbosity level.
    Verbose,
}

/// Most run-time options can be programmatically configured with custom defaults.
///
/// For example, a load test can default to running against a staging environment, while
/// the [`--host`](./enum.LoadTestDefault.html#variant.Host) run time option can still
/// override it at start time.
///
/// # Example
/// ```rust
/// use stampede::prelude::*;
///
/// fn main() -> Result<(), LoadTestError> {
///     LoadTest::initialize_with_config(LoadTestConfiguration::default())?
///         .set_default(LoadTestDefault::Host, "http://staging.local:8080")?
///         .set_default(LoadTestDefault::LatencyCeiling, 250)?
///         .set_default(LoadTestDefault::AbortOnFail, true)?;
///
///     Ok(())
/// }
/// ```
///
/// The following run-time options can be configured with a custom default using a
/// borrowed string slice ([`&str`]):
///  - [`LoadTestDefault::Host`]
///  - [`LoadTestDefault::TestPlan`]
///  - [`LoadTestDefault::Thresholds`]
///  - [`LoadTestDefault::ThinkTime`]
///  - [`LoadTestDefault::Timeout`]
///  - [`LoadTestDefault::ReportFile`]
///  - [`LoadTestDefault::ExportFile`]
///  - [`LoadTestDefault::LogFile`]
///
/// The following run-time options can be configured with a custom default using a
/// [`usize`] integer:
///  - [`LoadTestDefault::LatencyCeiling`]
///  - [`LoadTestDefault::Seed`]
///  - [`LoadTestDefault::RunningMetrics`]
///  - [`LoadTestDefault::LogLevel`]
///  - [`LoadTestDefault::Quiet`]
///  - [`LoadTestDefault::Verbose`]
///
/// The following run-time flags can be configured with a custom default using a
/// [`bool`] (and otherwise default to [`false`]).
///  - [`LoadTestDefault::AbortOnFail`]
///  - [`LoadTestDefault::NoHealthCheck`]
///  - [`LoadTestDefault::NoPrintMetrics`]
pub trait LoadTestDefaultType<T> {
    /// Sets a [`LoadTestDefault`] to the provided value. The required type of each option
    /// is documented in [`LoadTestDefaultType`].
    fn set_default(self, key: LoadTestDefault, value: T) -> Result<Self, LoadTestError>
    where
        Self: Sized;
}

// Explain which type a default expected.
fn wrong_type<T: fmt::Display>(
    key: LoadTestDefault,
    value: T,
    expected: &str,
    received: &str,
) -> LoadTestError {
    LoadTestError::InvalidOption {
        option: format!("LoadTestDefault::{:?}", key),
        value: value.to_string(),
        detail: format!(
            "set_default(LoadTestDefault::{:?}, {}) expected {} value, received {}",
            key, value, expected, received
        ),
    }
}

impl LoadTestDefaultType<&str> for LoadTest {
    /// Sets [`LoadTestDefault`] to a [`&str`] value.
    fn set_default(mut self, key: LoadTestDefault, value: &str) -> Result<Self, LoadTestError> {
        match key {
            LoadTestDefault::Host => {
                self.defaults.host = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            LoadTestDefault::TestPlan => self.defaults.test_plan = Some(value.parse()?),
            LoadTestDefault::Thresholds => self.defaults.thresholds = Some(value.parse()?),
            LoadTestDefault::ThinkTime => self.defaults.think_time = Some(value.to_string()),
            LoadTestDefault::Timeout => self.defaults.timeout = Some(value.to_string()),
            LoadTestDefault::ReportFile => self.defaults.report_file = Some(value.to_string()),
            LoadTestDefault::ExportFile => self.defaults.export_file = Some(value.to_string()),
            LoadTestDefault::LogFile => self.defaults.log_file = Some(value.to_string()),
            // Otherwise display a helpful and explicit error.
            LoadTestDefault::LatencyCeiling
            | LoadTestDefault::Seed
            | LoadTestDefault::RunningMetrics
            | LoadTestDefault::LogLevel
            | LoadTestDefault::Quiet
            | LoadTestDefault::Verbose => return Err(wrong_type(key, value, "usize", "&str")),
            LoadTestDefault::AbortOnFail
            | LoadTestDefault::NoHealthCheck
            | LoadTestDefault::NoPrintMetrics => return Err(wrong_type(key, value, "bool", "&str")),
        }
        Ok(self)
    }
}
impl LoadTestDefaultType<usize> for LoadTest {
    /// Sets [`LoadTestDefault`] to a [`usize`] value.
    fn set_default(mut self, key: LoadTestDefault, value: usize) -> Result<Self, LoadTestError> {
        match key {
            LoadTestDefault::LatencyCeiling => self.defaults.latency_ceiling = Some(value),
            LoadTestDefault::Seed => self.defaults.seed = Some(value as u64),
            LoadTestDefault::RunningMetrics => self.defaults.running_metrics = Some(value),
            LoadTestDefault::LogLevel => self.defaults.log_level = Some(value as u8),
            LoadTestDefault::Quiet => self.defaults.quiet = Some(value as u8),
            LoadTestDefault::Verbose => self.defaults.verbose = Some(value as u8),
            // Otherwise display a helpful and explicit error.
            LoadTestDefault::Host
            | LoadTestDefault::TestPlan
            | LoadTestDefault::Thresholds
            | LoadTestDefault::ThinkTime
            | LoadTestDefault::Timeout
            | LoadTestDefault::ReportFile
            | LoadTestDefault::ExportFile
            | LoadTestDefault::LogFile => return Err(wrong_type(key, value, "&str", "usize")),
            LoadTestDefault::AbortOnFail
            | LoadTestDefault::NoHealthCheck
            | LoadTestDefault::NoPrintMetrics => return Err(wrong_type(key, value, "bool", "usize")),
        }
        Ok(self)
    }
}
impl LoadTestDefaultType<bool> for LoadTest {
    /// Sets [`LoadTestDefault`] to a [`bool`] value.
    fn set_default(mut self, key: LoadTestDefault, value: bool) -> Result<Self, LoadTestError> {
        match key {
            LoadTestDefault::AbortOnFail => self.defaults.abort_on_fail = Some(value),
            LoadTestDefault::NoHealthCheck => self.defaults.no_health_check = Some(value),
            LoadTestDefault::NoPrintMetrics => self.defaults.no_print_metrics = Some(value),
            // Otherwise display a helpful and explicit error.
            LoadTestDefault::Host
            | LoadTestDefault::TestPlan
            | LoadTestDefault::Thresholds
            | LoadTestDefault::ThinkTime
            | LoadTestDefault::Timeout
            | LoadTestDefault::ReportFile
            | LoadTestDefault::ExportFile
            | LoadTestDefault::LogFile => return Err(wrong_type(key, value, "&str", "bool")),
            LoadTestDefault::LatencyCeiling
            | LoadTestDefault::Seed
            | LoadTestDefault::RunningMetrics
            | LoadTestDefault::LogLevel
            | LoadTestDefault::Quiet
            | LoadTestDefault::Verbose => return Err(wrong_type(key, value, "usize", "bool")),
        }
        Ok(self)
    }
}

/// Used internally to configure [`LoadTestConfiguration`] values based on precedence rules.
#[derive(Debug, Clone)]
pub(crate) struct LoadTestValue<'a, T> {
    /// The optional value to set.
    pub(crate) value: Option<T>,
    /// Filter using this value if true.
    pub(crate) filter: bool,
    /// An optional INFO level log message.
    pub(crate) message: &'a str,
}

pub(crate) trait LoadTestConfigure<T> {
    /// Set [`LoadTestValue`] with supported type.
    fn get_value(&self, values: Vec<LoadTestValue<T>>) -> Option<T>;
}

impl<T: fmt::Display> LoadTestConfigure<T> for LoadTestConfiguration {
    /// Use [`LoadTestValue`] to pick the first unfiltered value.
    fn get_value(&self, values: Vec<LoadTestValue<T>>) -> Option<T> {
        for value in values {
            if let Some(v) = value.value {
                if value.filter {
                    continue;
                } else {
                    if !value.message.is_empty() {
                        info!("{} = {}", value.message, v)
                    }
                    return Some(v);
                }
            }
        }
        None
    }
}

impl LoadTestConfiguration {
    /// Implement precedence rules for all [`LoadTestConfiguration`] values.
    pub(crate) fn configure(&mut self, defaults: &LoadTestDefaults) {
        // Configure `quiet`.
        self.quiet = self
            .get_value(vec![
                // Use --quiet if set.
                LoadTestValue {
                    value: Some(self.quiet),
                    filter: self.quiet == 0,
                    message: "",
                },
                // Otherwise use LoadTestDefault if set.
                LoadTestValue {
                    value: defaults.quiet,
                    filter: defaults.quiet.is_none(),
                    message: "",
                },
            ])
            .unwrap_or(0);

        // Configure `verbose`.
        self.verbose = self
            .get_value(vec![
                LoadTestValue {
                    value: Some(self.verbose),
                    filter: self.verbose == 0,
                    message: "",
                },
                LoadTestValue {
                    value: defaults.verbose,
                    filter: defaults.verbose.is_none(),
                    message: "",
                },
            ])
            .unwrap_or(0);

        // Configure `log_level`.
        self.log_level = self
            .get_value(vec![
                LoadTestValue {
                    value: Some(self.log_level),
                    filter: self.log_level == 0,
                    message: "",
                },
                LoadTestValue {
                    value: defaults.log_level,
                    filter: defaults.log_level.is_none(),
                    message: "",
                },
            ])
            .unwrap_or(0);

        // Configure `log_file`.
        self.log_file = self
            .get_value(vec![
                LoadTestValue {
                    value: Some(self.log_file.to_string()),
                    filter: self.log_file.is_empty(),
                    message: "",
                },
                LoadTestValue {
                    value: defaults.log_file.clone(),
                    filter: defaults.log_file.is_none(),
                    message: "",
                },
            ])
            .unwrap_or_default();

        // Initialize the logger before anything else is logged.
        self.initialize_logger();

        // Configure `host`, falling back to the environment then to a local simulator.
        self.host = self
            .get_value(vec![
                LoadTestValue {
                    value: Some(self.host.to_string()),
                    filter: self.host.is_empty(),
                    message: "host",
                },
                LoadTestValue {
                    value: defaults.host.clone(),
                    filter: defaults.host.is_none(),
                    message: "host",
                },
                LoadTestValue {
                    value: std::env::var(HOST_ENV).ok(),
                    filter: std::env::var(HOST_ENV).map(|h| h.is_empty()).unwrap_or(true),
                    message: "host (from BASE_URL)",
                },
            ])
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        // Configure `test_plan`.
        self.test_plan = Some(
            self.get_value(vec![
                LoadTestValue {
                    value: self.test_plan.clone(),
                    filter: self.test_plan.is_none(),
                    message: "test_plan",
                },
                LoadTestValue {
                    value: defaults.test_plan.clone(),
                    filter: defaults.test_plan.is_none(),
                    message: "test_plan",
                },
            ])
            .unwrap_or_default(),
        );

        // Configure `thresholds`.
        self.thresholds = Some(
            self.get_value(vec![
                LoadTestValue {
                    value: self.thresholds.clone(),
                    filter: self.thresholds.is_none(),
                    message: "thresholds",
                },
                LoadTestValue {
                    value: defaults.thresholds.clone(),
                    filter: defaults.thresholds.is_none(),
                    message: "thresholds",
                },
            ])
            .unwrap_or_default(),
        );

        // Configure `think_time`.
        self.think_time = Some(
            self.get_value(vec![
                LoadTestValue {
                    value: self.think_time.clone(),
                    filter: self.think_time.is_none(),
                    message: "think_time",
                },
                LoadTestValue {
                    value: defaults.think_time.clone(),
                    filter: defaults.think_time.is_none(),
                    message: "think_time",
                },
            ])
            .unwrap_or_else(|| DEFAULT_THINK_TIME.to_string()),
        );

        // Configure `timeout`.
        self.timeout = Some(
            self.get_value(vec![
                LoadTestValue {
                    value: self.timeout.clone(),
                    filter: self.timeout.is_none(),
                    message: "timeout",
                },
                LoadTestValue {
                    value: defaults.timeout.clone(),
                    filter: defaults.timeout.is_none(),
                    message: "timeout",
                },
            ])
            .unwrap_or_else(|| DEFAULT_TIMEOUT.to_string()),
        );

        // Configure `latency_ceiling`.
        self.latency_ceiling = Some(
            self.get_value(vec![
                LoadTestValue {
                    value: self.latency_ceiling,
                    filter: self.latency_ceiling.is_none(),
                    message: "latency_ceiling",
                },
                LoadTestValue {
                    value: defaults.latency_ceiling,
                    filter: defaults.latency_ceiling.is_none(),
                    message: "latency_ceiling",
                },
            ])
            .unwrap_or(DEFAULT_LATENCY_CEILING),
        );

        // Configure `seed`.
        self.seed = self.get_value(vec![
            LoadTestValue {
                value: self.seed,
                filter: self.seed.is_none(),
                message: "seed",
            },
            LoadTestValue {
                value: defaults.seed,
                filter: defaults.seed.is_none(),
                message: "seed",
            },
        ]);

        // Configure `abort_on_fail`.
        self.abort_on_fail = self
            .get_value(vec![
                LoadTestValue {
                    value: Some(self.abort_on_fail),
                    filter: !self.abort_on_fail,
                    message: "abort_on_fail",
                },
                LoadTestValue {
                    value: defaults.abort_on_fail,
                    filter: defaults.abort_on_fail.is_none(),
                    message: "abort_on_fail",
                },
            ])
            .unwrap_or(false);

        // Configure `no_health_check`.
        self.no_health_check = self
            .get_value(vec![
                LoadTestValue {
                    value: Some(self.no_health_check),
                    filter: !self.no_health_check,
                    message: "no_health_check",
                },
                LoadTestValue {
                    value: defaults.no_health_check,
                    filter: defaults.no_health_check.is_none(),
                    message: "no_health_check",
                },
            ])
            .unwrap_or(false);

        // Configure `running_metrics`.
        self.running_metrics = self.get_value(vec![
            LoadTestValue {
                value: self.running_metrics,
                filter: self.running_metrics.is_none(),
                message: "running_metrics",
            },
            LoadTestValue {
                value: defaults.running_metrics,
                filter: defaults.running_metrics.is_none(),
                message: "running_metrics",
            },
        ]);

        // Configure `no_print_metrics`.
        self.no_print_metrics = self
            .get_value(vec![
                LoadTestValue {
                    value: Some(self.no_print_metrics),
                    filter: !self.no_print_metrics,
                    message: "no_print_metrics",
                },
                LoadTestValue {
                    value: defaults.no_print_metrics,
                    filter: defaults.no_print_metrics.is_none(),
                    message: "no_print_metrics",
                },
            ])
            .unwrap_or(false);

        // Configure `report_file`.
        self.report_file = self
            .get_value(vec![
                LoadTestValue {
                    value: Some(self.report_file.to_string()),
                    filter: self.report_file.is_empty(),
                    message: "report_file",
                },
                LoadTestValue {
                    value: defaults.report_file.clone(),
                    filter: defaults.report_file.is_none(),
                    message: "report_file",
                },
            ])
            .unwrap_or_default();

        // Configure `export_file`.
        self.export_file = self
            .get_value(vec![
                LoadTestValue {
                    value: Some(self.export_file.to_string()),
                    filter: self.export_file.is_empty(),
                    message: "export_file",
                },
                LoadTestValue {
                    value: defaults.export_file.clone(),
                    filter: defaults.export_file.is_none(),
                    message: "export_file",
                },
            ])
            .unwrap_or_default();
    }

    /// Validate that all options are sane, returning a [`LoadTestError::InvalidOption`]
    /// describing the first problem found.
    pub(crate) fn validate(&self) -> Result<(), LoadTestError> {
        // Can't set both --verbose and --quiet.
        if self.verbose > 0 && self.quiet > 0 {
            return Err(LoadTestError::InvalidOption {
                option: "`configuration.verbose`".to_string(),
                value: self.verbose.to_string(),
                detail: "`configuration.verbose` can not be set with `configuration.quiet`."
                    .to_string(),
            });
        }

        // The host must be a url.
        util::is_valid_host(&self.host)?;

        // Think-time may be zero but must be a number of seconds.
        if let Some(think_time) = self.think_time.as_ref() {
            if util::seconds_to_duration(think_time).is_none() {
                return Err(LoadTestError::InvalidOption {
                    option: "`configuration.think_time`".to_string(),
                    value: think_time.to_string(),
                    detail: "`configuration.think_time` must be a non-negative number of seconds."
                        .to_string(),
                });
            }
        }

        // If set, timeout must be greater than zero.
        if let Some(timeout) = self.timeout.as_ref() {
            match util::seconds_to_duration(timeout) {
                Some(duration) if !duration.is_zero() => (),
                _ => {
                    return Err(LoadTestError::InvalidOption {
                        option: "`configuration.timeout`".to_string(),
                        value: timeout.to_string(),
                        detail: "`configuration.timeout` must be greater than 0.".to_string(),
                    });
                }
            }
        }

        if self.latency_ceiling == Some(0) {
            return Err(LoadTestError::InvalidOption {
                option: "`configuration.latency_ceiling`".to_string(),
                value: "0".to_string(),
                detail: "`configuration.latency_ceiling` must be greater than 0.".to_string(),
            });
        }

        if self.running_metrics == Some(0) {
            return Err(LoadTestError::InvalidOption {
                option: "`configuration.running_metrics`".to_string(),
                value: "0".to_string(),
                detail: "`configuration.running_metrics` must be at least 1 second.".to_string(),
            });
        }

        // A profile that never ramps would end before generating any load.
        if let Some(test_plan) = self.test_plan.as_ref() {
            if test_plan.total_duration().is_zero() {
                return Err(LoadTestError::InvalidOption {
                    option: "`configuration.test_plan`".to_string(),
                    value: test_plan.to_string(),
                    detail: "`configuration.test_plan` must contain at least one stage with a duration.".to_string(),
                });
            }
        }

        Ok(())
    }

    /// The configured think-time.
    pub fn think_time(&self) -> time::Duration {
        self.think_time
            .as_deref()
            .and_then(util::seconds_to_duration)
            .unwrap_or(time::Duration::from_millis(100))
    }

    /// The configured request timeout.
    pub fn timeout(&self) -> time::Duration {
        self.timeout
            .as_deref()
            .and_then(util::seconds_to_duration)
            .unwrap_or(time::Duration::from_secs(10))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_defaults() {
        let host = "http://example.com/".to_string();
        let test_plan = "5,10s;0,5s".to_string();
        let thresholds = "errors:rate<0.05".to_string();
        let report_file = "custom-report.html".to_string();
        let export_file = "custom-export.json".to_string();
        let log_file = "custom-stampede.log".to_string();

        let load_test = LoadTest::initialize_with_config(LoadTestConfiguration::default())
            .unwrap()
            .set_default(LoadTestDefault::Host, host.as_str())
            .unwrap()
            .set_default(LoadTestDefault::TestPlan, test_plan.as_str())
            .unwrap()
            .set_default(LoadTestDefault::Thresholds, thresholds.as_str())
            .unwrap()
            .set_default(LoadTestDefault::ThinkTime, "0.5")
            .unwrap()
            .set_default(LoadTestDefault::Timeout, "3")
            .unwrap()
            .set_default(LoadTestDefault::LatencyCeiling, 250)
            .unwrap()
            .set_default(LoadTestDefault::Seed, 42)
            .unwrap()
            .set_default(LoadTestDefault::AbortOnFail, true)
            .unwrap()
            .set_default(LoadTestDefault::NoHealthCheck, true)
            .unwrap()
            .set_default(LoadTestDefault::RunningMetrics, 15)
            .unwrap()
            .set_default(LoadTestDefault::NoPrintMetrics, true)
            .unwrap()
            .set_default(LoadTestDefault::ReportFile, report_file.as_str())
            .unwrap()
            .set_default(LoadTestDefault::ExportFile, export_file.as_str())
            .unwrap()
            .set_default(LoadTestDefault::LogFile, log_file.as_str())
            .unwrap()
            .set_default(LoadTestDefault::LogLevel, 1)
            .unwrap()
            .set_default(LoadTestDefault::Quiet, 1)
            .unwrap()
            .set_default(LoadTestDefault::Verbose, 0)
            .unwrap();

        assert_eq!(load_test.defaults.host, Some(host));
        assert_eq!(load_test.defaults.test_plan, Some(test_plan.parse().unwrap()));
        assert_eq!(load_test.defaults.thresholds, Some(thresholds.parse().unwrap()));
        assert_eq!(load_test.defaults.think_time, Some("0.5".to_string()));
        assert_eq!(load_test.defaults.timeout, Some("3".to_string()));
        assert_eq!(load_test.defaults.latency_ceiling, Some(250));
        assert_eq!(load_test.defaults.seed, Some(42));
        assert_eq!(load_test.defaults.abort_on_fail, Some(true));
        assert_eq!(load_test.defaults.no_health_check, Some(true));
        assert_eq!(load_test.defaults.running_metrics, Some(15));
        assert_eq!(load_test.defaults.no_print_metrics, Some(true));
        assert_eq!(load_test.defaults.report_file, Some(report_file));
        assert_eq!(load_test.defaults.export_file, Some(export_file));
        assert_eq!(load_test.defaults.log_file, Some(log_file));
        assert_eq!(load_test.defaults.log_level, Some(1));
        assert_eq!(load_test.defaults.quiet, Some(1));
        assert_eq!(load_test.defaults.verbose, Some(0));
    }

    #[test]
    fn set_defaults_wrong_type() {
        let load_test = LoadTest::initialize_with_config(LoadTestConfiguration::default()).unwrap();
        assert!(load_test
            .set_default(LoadTestDefault::Host, true)
            .is_err());
        let load_test = LoadTest::initialize_with_config(LoadTestConfiguration::default()).unwrap();
        assert!(load_test.set_default(LoadTestDefault::Seed, "42").is_err());
        let load_test = LoadTest::initialize_with_config(LoadTestConfiguration::default()).unwrap();
        assert!(load_test
            .set_default(LoadTestDefault::TestPlan, "not a plan")
            .is_err());
    }

    #[test]
    fn precedence() {
        let mut defaults = LoadTestDefaults::default();
        defaults.think_time = Some("0.5".to_string());
        defaults.latency_ceiling = Some(250);
        defaults.host = Some("http://default.local".to_string());

        let mut configuration: LoadTestConfiguration =
            LoadTestConfiguration::parse_args_default(&["--host", "http://cli.local", "--latency-ceiling", "750"])
                .unwrap();
        configuration.configure(&defaults);
        assert_eq!(configuration.host, "http://cli.local");
        assert_eq!(configuration.latency_ceiling, Some(750));
        assert_eq!(configuration.think_time(), time::Duration::from_millis(500));
        assert_eq!(configuration.timeout(), time::Duration::from_secs(10));
        assert_eq!(configuration.test_plan, Some(TestPlan::default()));
        assert_eq!(configuration.thresholds, Some(Thresholds::default()));
        assert!(configuration.validate().is_ok());
    }

    #[test]
    fn validate() {
        let configure = |args: &[&str]| {
            let mut configuration = LoadTestConfiguration::parse_args_default(args).unwrap();
            configuration.configure(&LoadTestDefaults::default());
            configuration.validate()
        };
        let base = ["--host", "http://localhost:8080"];
        assert!(configure(&base).is_ok());
        assert!(configure(&[&base[..], &["--think-time", "0"]].concat()).is_ok());
        assert!(configure(&[&base[..], &["-v", "-q"]].concat()).is_err());
        assert!(configure(&[&base[..], &["--think-time", "soon"]].concat()).is_err());
        assert!(configure(&[&base[..], &["--timeout", "0"]].concat()).is_err());
        assert!(configure(&[&base[..], &["--latency-ceiling", "0"]].concat()).is_err());
        assert!(configure(&[&base[..], &["--running-metrics", "0"]].concat()).is_err());
        assert!(configure(&[&base[..], &["--test-plan", "10,0"]].concat()).is_err());
        assert!(configure(&["--host", "localhost"]).is_err());
    }
}
