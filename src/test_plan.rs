//! Stage profile structures and functions.
//!
//! Internally, Stampede represents every load test as a series of stages, each ramping
//! linearly from the previous stage's target number of users to its own target over
//! its own duration.

use chrono::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time;
use strum_macros::Display;

use crate::util;
use crate::{AttackPhase, LoadTest, LoadTestError, RunState};

/// The stage profile used when none is configured.
pub const DEFAULT_TEST_PLAN: &str = "10,30s;50,1m;100,2m;200,1m;0,30s";

/// One step of a stage profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// How many users should be running once the stage completes.
    pub target: usize,
    /// How long it takes to ramp from the previous target to this one.
    pub duration: time::Duration,
}

/// An ordered series of [`Stage`]s.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    pub stages: Vec<Stage>,
}

impl Default for TestPlan {
    fn default() -> Self {
        DEFAULT_TEST_PLAN
            .parse()
            .unwrap_or(TestPlan { stages: Vec::new() })
    }
}

impl TestPlan {
    /// Stages that actually take part in the ramp, with their position in the plan.
    ///
    /// Zero-duration stages are skipped: they are neither ramped through nor used as
    /// the starting point of the following stage.
    fn active_stages(&self) -> impl Iterator<Item = (usize, &Stage)> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, stage)| !stage.duration.is_zero())
    }

    /// Positions of the stages that are skipped because they have no duration.
    pub fn skipped_stages(&self) -> Vec<usize> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, stage)| stage.duration.is_zero())
            .map(|(index, _)| index)
            .collect()
    }

    /// How long it takes to traverse the whole profile.
    pub fn total_duration(&self) -> time::Duration {
        self.stages.iter().map(|stage| stage.duration).sum()
    }

    /// The highest number of users the profile ever asks for.
    pub fn max_users(&self) -> usize {
        self.active_stages()
            .map(|(_, stage)| stage.target)
            .max()
            .unwrap_or(0)
    }

    /// Find the active stage at `elapsed`, returning its position in the plan, the
    /// target it ramps from, and how far into the stage `elapsed` is.
    ///
    /// Returns None once the profile is exhausted.
    pub(crate) fn stage_at(
        &self,
        elapsed: time::Duration,
    ) -> Option<(usize, usize, time::Duration)> {
        let mut anchor = 0;
        let mut stage_started = time::Duration::ZERO;
        for (index, stage) in self.active_stages() {
            let stage_ends = stage_started + stage.duration;
            if elapsed < stage_ends {
                return Some((index, anchor, elapsed - stage_started));
            }
            anchor = stage.target;
            stage_started = stage_ends;
        }
        None
    }

    /// How many users should be running `elapsed` time into the load test.
    ///
    /// Interpolates linearly between the previous stage's target (0 before the first
    /// stage) and the current stage's target, rounding to the nearest user. Returns None
    /// once every stage has completed.
    ///
    /// # Example
    /// ```rust
    /// use stampede::test_plan::TestPlan;
    /// use std::time::Duration;
    ///
    /// let test_plan: TestPlan = "10,30s;50,60s".parse().unwrap();
    ///
    /// assert_eq!(test_plan.desired_users(Duration::from_secs(15)), Some(5));
    /// assert_eq!(test_plan.desired_users(Duration::from_secs(45)), Some(20));
    /// assert_eq!(test_plan.desired_users(Duration::from_secs(90)), None);
    /// ```
    pub fn desired_users(&self, elapsed: time::Duration) -> Option<usize> {
        let (index, anchor, into_stage) = self.stage_at(elapsed)?;
        let stage = &self.stages[index];
        let progress = into_stage.as_secs_f64() / stage.duration.as_secs_f64();
        let desired = anchor as f64 + (stage.target as f64 - anchor as f64) * progress;
        Some(desired.round().max(0.0) as usize)
    }
}

impl fmt::Display for TestPlan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let stages: Vec<String> = self
            .stages
            .iter()
            .map(|stage| format!("{},{}s", stage.target, stage.duration.as_secs()))
            .collect();
        write!(f, "{}", stages.join(";"))
    }
}

/// Implement [`FromStr`] to convert `"target,timespan"` string formatted stage profiles
/// to a [`TestPlan`].
///
/// Targets are represented simply as an integer.
///
/// Time span can be specified as an integer, indicating seconds. Or can use integers together
/// with one or more of "h", "m", and "s", in that order, indicating "hours", "minutes", and
/// "seconds". Valid formats include: 20, 20s, 3m, 2h, 1h20m, 3h30m10s, etc.
impl FromStr for TestPlan {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |line: &str| LoadTestError::InvalidOption {
            option: "`configuration.test_plan`".to_string(),
            value: line.to_string(),
            detail: "Expected format: --test-plan \"{target},{timespan};{target},{timespan}\", where {target} is an integer and {timespan} is integer seconds or \"30s\", \"20m\", \"3h\", \"1h30m\", etc.".to_string(),
        };

        // Each stage must be in the format "{target},{timespan}", white space is ignored
        let re = Regex::new(r"^\s*(\d+)\s*,\s*(\d+|((\d+?)h)?((\d+?)m)?((\d+?)s)?)\s*$")
            .map_err(|_| invalid(s))?;
        let mut stages = Vec::new();
        let mut total = time::Duration::ZERO;
        // Stages are split by the semicolon ";", a trailing semicolon is tolerated.
        for line in s.trim().trim_end_matches(';').split(';') {
            let cap = re.captures(line).ok_or_else(|| invalid(line))?;
            let target = cap[1].parse::<usize>().map_err(|_| invalid(line))?;
            // A timespan must contain at least one digit, "1,h" is meaningless.
            if !cap[2].chars().any(|c| c.is_ascii_digit()) {
                return Err(invalid(line));
            }
            let seconds = util::try_parse_timespan(&cap[2]).ok_or_else(|| invalid(line))?;
            let duration = time::Duration::from_secs(seconds as u64);
            // The whole profile must fit in a Duration.
            total = total.checked_add(duration).ok_or_else(|| invalid(line))?;
            stages.push(Stage { target, duration });
        }
        Ok(TestPlan { stages })
    }
}

/// A stage profile is a series of steps performing one of the following actions.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestPlanStepAction {
    /// A stage that is increasing the number of users.
    Increasing,
    /// A stage that is maintaining the number of users.
    Maintaining,
    /// A stage that is decreasing the number of users.
    Decreasing,
    /// The final step indicating that the load test is finished.
    Finished,
}

/// A historical record of a single stage, used to generate reports from the metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestPlanHistory {
    /// What action happened in this step.
    pub action: TestPlanStepAction,
    /// A timestamp of when the step started.
    pub timestamp: DateTime<Utc>,
    /// The number of users when the step started.
    pub users: usize,
}
impl TestPlanHistory {
    /// A helper to record a new step in the historical record.
    pub(crate) fn step(action: TestPlanStepAction, users: usize) -> TestPlanHistory {
        TestPlanHistory {
            action,
            timestamp: Utc::now(),
            users,
        }
    }
}

impl LoadTest {
    // Record a history entry each time the scheduler crosses into a new stage.
    pub(crate) fn track_stage(&mut self, run_state: &RunState, elapsed: time::Duration) {
        let (index, anchor, _) = match self.test_plan.stage_at(elapsed) {
            Some(stage) => stage,
            None => return,
        };
        if Some(index) == self.current_stage {
            return;
        }
        self.current_stage = Some(index);

        let stage = self.test_plan.stages[index];
        info!(
            "entering stage {} of {}: {} -> {} users over {}s",
            index + 1,
            self.test_plan.stages.len(),
            anchor,
            stage.target,
            stage.duration.as_secs()
        );
        let action = match anchor.cmp(&stage.target) {
            Ordering::Less => TestPlanStepAction::Increasing,
            Ordering::Greater => TestPlanStepAction::Decreasing,
            Ordering::Equal => TestPlanStepAction::Maintaining,
        };
        self.history
            .push(TestPlanHistory::step(action, run_state.active_users()));
    }

    // Move the load test into the draining phase, stopping every running user.
    pub(crate) fn begin_draining(&mut self, run_state: &mut RunState) {
        if self.attack_phase != AttackPhase::Ramping {
            return;
        }
        self.set_attack_phase(AttackPhase::Draining);
        self.history.push(TestPlanHistory::step(
            TestPlanStepAction::Finished,
            run_state.active_users(),
        ));
        run_state.stop_users(run_state.active_users());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stage(target: usize, seconds: u64) -> Stage {
        Stage {
            target,
            duration: time::Duration::from_secs(seconds),
        }
    }

    #[test]
    fn parse() {
        let test_plan: TestPlan = "10,30s;50,1m;100,2m;200,1m;0,30s".parse().unwrap();
        assert_eq!(
            test_plan.stages,
            vec![
                stage(10, 30),
                stage(50, 60),
                stage(100, 120),
                stage(200, 60),
                stage(0, 30)
            ]
        );
        assert_eq!(test_plan, TestPlan::default());
        assert_eq!(test_plan.total_duration(), time::Duration::from_secs(300));
        assert_eq!(test_plan.max_users(), 200);

        // White space and a trailing semicolon are ignored.
        let test_plan: TestPlan = " 5 , 1h2m3s ; 0,10 ;".parse().unwrap();
        assert_eq!(test_plan.stages, vec![stage(5, 3723), stage(0, 10)]);
        assert_eq!(test_plan.to_string(), "5,3723s;0,10s");

        assert!("".parse::<TestPlan>().is_err());
        assert!("10".parse::<TestPlan>().is_err());
        assert!("10,".parse::<TestPlan>().is_err());
        assert!("ten,30s".parse::<TestPlan>().is_err());
        assert!("-1,30s".parse::<TestPlan>().is_err());
        assert!("10,30s;;20,1m".parse::<TestPlan>().is_err());
        assert!("10,1x".parse::<TestPlan>().is_err());

        // Timespans too large to represent are rejected, not wrapped.
        assert!("1,99999999999999999h".parse::<TestPlan>().is_err());
        assert!("1,99999999999999999999".parse::<TestPlan>().is_err());
        assert!("1,18446744073709551615;1,1".parse::<TestPlan>().is_err());
    }

    #[test]
    fn interpolation() {
        let test_plan = TestPlan {
            stages: vec![stage(10, 30), stage(50, 60)],
        };
        let at = |seconds: f64| test_plan.desired_users(time::Duration::from_secs_f64(seconds));

        assert_eq!(at(0.0), Some(0));
        assert_eq!(at(1.4), Some(0));
        assert_eq!(at(1.5), Some(1));
        assert_eq!(at(15.0), Some(5));
        assert_eq!(at(30.0), Some(10));
        assert_eq!(at(45.0), Some(20));
        assert_eq!(at(89.9), Some(50));
        assert_eq!(at(90.0), None);
        assert_eq!(at(1000.0), None);
    }

    #[test]
    fn interpolation_is_bounded() {
        let test_plan: TestPlan = "10,30s;50,1m;100,2m;200,1m;0,30s".parse().unwrap();
        let mut previous_target = 0;
        let mut stage_started = 0;
        for stage in &test_plan.stages {
            let low = previous_target.min(stage.target);
            let high = previous_target.max(stage.target);
            let stage_ends = stage_started + stage.duration.as_millis() as u64;
            for ms in (stage_started..stage_ends).step_by(250) {
                let desired = test_plan
                    .desired_users(time::Duration::from_millis(ms))
                    .unwrap();
                assert!(
                    desired >= low && desired <= high,
                    "{} users at {}ms outside of {}..={}",
                    desired,
                    ms,
                    low,
                    high
                );
            }
            previous_target = stage.target;
            stage_started = stage_ends;
        }
    }

    #[test]
    fn ramp_down() {
        let test_plan: TestPlan = "4,4;0,4".parse().unwrap();
        assert_eq!(test_plan.desired_users(time::Duration::from_secs(4)), Some(4));
        assert_eq!(test_plan.desired_users(time::Duration::from_secs(6)), Some(2));
        assert_eq!(
            test_plan.desired_users(time::Duration::from_millis(7_999)),
            Some(0)
        );
        assert_eq!(test_plan.desired_users(time::Duration::from_secs(8)), None);
    }

    #[test]
    fn zero_duration_stages() {
        // The zero-duration stage neither ramps nor anchors the following stage.
        let test_plan: TestPlan = "10,10;100,0;20,10".parse().unwrap();
        assert_eq!(test_plan.skipped_stages(), vec![1]);
        assert_eq!(test_plan.max_users(), 20);
        assert_eq!(test_plan.total_duration(), time::Duration::from_secs(20));
        assert_eq!(test_plan.desired_users(time::Duration::from_secs(10)), Some(10));
        assert_eq!(test_plan.desired_users(time::Duration::from_secs(15)), Some(15));
        assert_eq!(
            test_plan.stage_at(time::Duration::from_secs(15)),
            Some((2, 10, time::Duration::from_secs(5)))
        );

        let test_plan: TestPlan = "10,0".parse().unwrap();
        assert_eq!(test_plan.desired_users(time::Duration::ZERO), None);
    }
}
