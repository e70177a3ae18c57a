//! Commonly used items, for `use stampede::prelude::*`.

pub use crate::config::{LoadTestConfiguration, LoadTestDefault, LoadTestDefaultType};
pub use crate::metrics::{MetricKind, MetricRegistry, MetricsSnapshot, Observation};
pub use crate::report::StructuredReport;
pub use crate::test_plan::TestPlan;
pub use crate::threshold::{ThresholdReport, Thresholds, Verdict};
pub use crate::{LoadTest, LoadTestError, RunSummary};
