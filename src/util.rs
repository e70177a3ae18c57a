//! Utility functions used by Stampede, and available when writing custom load tests.

use lazy_static::lazy_static;
use regex::Regex;
use std::str::FromStr;
use std::sync::RwLock;
use std::time;
use url::Url;

use crate::LoadTestError;

lazy_static! {
    static ref TIMESPAN: Regex =
        Regex::new(r"((?P<hours>\d+?)h)?((?P<minutes>\d+?)m)?((?P<seconds>\d+?)s)?")
            .expect("timespan pattern is valid");
    /// Set when ctrl-c is caught, checked by the scheduler loop.
    pub(crate) static ref CANCELED: RwLock<bool> = RwLock::new(false);
}

/// Parse a string representing a time span and return the number of seconds.
///
/// Can be specified as an integer, indicating seconds. Or can use integers
/// together with one or more of "h", "m", and "s", in that order, indicating
/// "hours", "minutes", and "seconds".
///
/// Valid formats include: 20, 20s, 3m, 2h, 1h20m, 3h30m10s, etc.
///
/// # Example
/// ```rust
/// use stampede::util;
///
/// // 1 hour 2 minutes and 3 seconds is 3,723 seconds.
/// assert_eq!(util::parse_timespan("1h2m3s"), 3_723);
///
/// // 45 seconds is 45 seconds.
/// assert_eq!(util::parse_timespan("45"), 45);
///
/// // Invalid value is 0 seconds.
/// assert_eq!(util::parse_timespan("foo"), 0);
/// ```
pub fn parse_timespan(time_str: &str) -> usize {
    match try_parse_timespan(time_str) {
        Some(seconds) => seconds,
        None => {
            warn!("timespan {} is too large", time_str);
            0
        }
    }
}

/// Parse a time span like [`parse_timespan`], returning None if the number of seconds
/// doesn't fit in a `usize`.
///
/// # Example
/// ```rust
/// use stampede::util;
///
/// assert_eq!(util::try_parse_timespan("1h2m3s"), Some(3_723));
/// assert_eq!(util::try_parse_timespan("99999999999999999h"), None);
/// ```
pub fn try_parse_timespan(time_str: &str) -> Option<usize> {
    // If an integer is passed in, assume it's seconds
    if let Ok(t) = usize::from_str(time_str) {
        trace!("{} is integer: {} seconds", time_str, t);
        return Some(t);
    }
    // Only digits, but too many of them.
    if !time_str.is_empty() && time_str.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    // Otherwise use a regex to extract hours, minutes and seconds from string.
    let time_matches = TIMESPAN.captures(time_str)?;
    let component = |name: &str, unit: usize| -> Option<usize> {
        match time_matches.name(name) {
            Some(m) => usize::from_str(m.as_str()).ok()?.checked_mul(unit),
            None => Some(0),
        }
    };
    let hours = component("hours", 60 * 60)?;
    let minutes = component("minutes", 60)?;
    let seconds = component("seconds", 1)?;
    let total = hours.checked_add(minutes)?.checked_add(seconds)?;
    trace!("{} is {} seconds", time_str, total);
    Some(total)
}

/// Sleep for a specified duration, minus the time spent doing other things.
///
/// Returns a fresh drift timer to pass in on the next call.
pub async fn sleep_minus_drift(
    duration: time::Duration,
    drift: tokio::time::Instant,
) -> tokio::time::Instant {
    match duration.checked_sub(drift.elapsed()) {
        Some(delay) if delay.as_nanos() > 0 => tokio::time::sleep(delay).await,
        _ => debug!("sleep_minus_drift: drift was greater than or equal to duration, not sleeping"),
    };
    tokio::time::Instant::now()
}

/// Truncate strings when they're too long to display.
///
/// If a string is longer than the specified max length, the string is truncated and ".."
/// is appended to the end.
///
/// # Example
/// ```rust
/// use stampede::util;
///
/// // All but 7 characters are truncated, with ".." appended.
/// assert_eq!(util::truncate_string("this is a long string", 9), "this is..");
///
/// // All characters are returned as the string is less than 15 characters long.
/// assert_eq!(util::truncate_string("shorter string", 15), "shorter string");
/// ```
pub fn truncate_string(str_to_truncate: &str, max_length: usize) -> String {
    if str_to_truncate.char_indices().count() > max_length {
        match str_to_truncate.char_indices().nth(max_length.saturating_sub(2)) {
            None => str_to_truncate.to_string(),
            Some((idx, _)) => format!("{}..", &str_to_truncate[..idx]),
        }
    } else {
        str_to_truncate.to_string()
    }
}

/// Determine if a timer expired, with second granularity.
///
/// If the timer was started more than `run_time` seconds ago return `true`, otherwise
/// return `false`. A `run_time` of 0 never expires.
pub fn timer_expired(started: time::Instant, run_time: usize) -> bool {
    run_time > 0 && started.elapsed().as_secs() >= run_time as u64
}

/// Determine if a timer expired, with millisecond granularity.
///
/// # Example
/// ```rust
/// use stampede::util;
///
/// let started = std::time::Instant::now();
/// std::thread::sleep(std::time::Duration::from_millis(20));
/// assert!(util::ms_timer_expired(started, 10));
/// assert!(!util::ms_timer_expired(started, 60_000));
/// ```
pub fn ms_timer_expired(started: time::Instant, elapsed: usize) -> bool {
    elapsed > 0 && started.elapsed().as_millis() >= elapsed as u128
}

/// Convert optional string to f64, otherwise return None.
///
/// # Example
/// ```rust
/// use stampede::util;
///
/// // No decimal returns a proper float.
/// assert_eq!(util::get_float_from_string(Some("1".to_string())), Some(1.0));
///
/// // Leading decimal returns a proper float.
/// assert_eq!(util::get_float_from_string(Some(".1".to_string())), Some(0.1));
///
/// // Invalid number with too many decimals returns None.
/// assert_eq!(util::get_float_from_string(Some("1.1.1".to_string())), None);
///
/// // No number returns None.
/// assert_eq!(util::get_float_from_string(None), None);
/// ```
pub fn get_float_from_string(string: Option<String>) -> Option<f64> {
    match string {
        Some(s) => match s.trim().parse::<f64>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("failed to convert {} to float: {}", s, e);
                None
            }
        },
        None => None,
    }
}

/// Convert a string of (possibly fractional) seconds into a [`std::time::Duration`].
///
/// Negative, non-finite and unparseable values return None.
///
/// # Example
/// ```rust
/// use stampede::util;
/// use std::time::Duration;
///
/// assert_eq!(util::seconds_to_duration("0.1"), Some(Duration::from_millis(100)));
/// assert_eq!(util::seconds_to_duration("10"), Some(Duration::from_secs(10)));
/// assert_eq!(util::seconds_to_duration("-1"), None);
/// ```
pub fn seconds_to_duration(seconds: &str) -> Option<time::Duration> {
    match get_float_from_string(Some(seconds.to_string())) {
        Some(value) if value.is_finite() && value >= 0.0 => {
            Some(time::Duration::from_secs_f64(value))
        }
        _ => None,
    }
}

/// Helper function to determine if a host can be parsed.
///
/// # Example
/// ```rust
/// use stampede::util;
///
/// // Hostname is a valid URL.
/// assert_eq!(util::is_valid_host("http://localhost/").is_ok(), true);
///
/// // IP is a valid URL.
/// assert_eq!(util::is_valid_host("http://127.0.0.1:8080").is_ok(), true);
///
/// // Protocol is required
/// assert_eq!(util::is_valid_host("example.com/").is_ok(), false);
/// ```
pub fn is_valid_host(host: &str) -> Result<Url, LoadTestError> {
    Url::parse(host).map_err(|parse_error| LoadTestError::InvalidHost {
        host: host.to_string(),
        detail: "Invalid host.".to_string(),
        parse_error,
    })
}

/// Returns true if ctrl-c has been caught since the current load test started.
pub(crate) fn canceled() -> bool {
    match CANCELED.read() {
        Ok(canceled) => *canceled,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn set_canceled(value: bool) {
    match CANCELED.write() {
        Ok(mut canceled) => *canceled = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

// Internal helper to configure the control-c handler. Drain cleanly on the first
// ctrl-c. Exit abruptly on the second ctrl-c.
pub(crate) fn setup_ctrlc_handler() {
    match ctrlc::set_handler(move || {
        // We've caught a ctrl-c, determine if it's the first time or an additional time.
        if canceled() {
            warn!("caught another ctrl-c, exiting immediately...");
            std::process::exit(1);
        } else {
            warn!("caught ctrl-c, draining...");
            set_canceled(true);
        }
    }) {
        Ok(_) => (),
        Err(e) => {
            // The handler can only be installed once per process, reset the flag so
            // each new load test starts uncanceled.
            set_canceled(false);
            debug!("reset ctrl-c handler: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timespan() {
        assert_eq!(parse_timespan("0"), 0);
        assert_eq!(parse_timespan("foo"), 0);
        assert_eq!(parse_timespan("1"), 1);
        assert_eq!(parse_timespan("1s"), 1);
        assert_eq!(parse_timespan("1m"), 60);
        assert_eq!(parse_timespan("61"), 61);
        assert_eq!(parse_timespan("1m1s"), 61);
        assert_eq!(parse_timespan("10m5s"), 605);
        assert_eq!(parse_timespan("30s"), 30);
        assert_eq!(parse_timespan("1h"), 3600);
        assert_eq!(parse_timespan("1h5m13s"), 3913);
        assert_eq!(parse_timespan("88h88m88s"), 322168);

        // Overflowing spans are rejected rather than wrapped.
        assert_eq!(try_parse_timespan("99999999999999999h"), None);
        assert_eq!(try_parse_timespan("9999999999999999999999"), None);
        assert_eq!(try_parse_timespan("1h99999999999999999999m"), None);
        assert_eq!(parse_timespan("99999999999999999h"), 0);
        assert_eq!(try_parse_timespan("2h"), Some(7200));
    }

    #[test]
    fn truncate() {
        assert_eq!(
            truncate_string("the quick brown fox", 25),
            "the quick brown fox"
        );
        assert_eq!(truncate_string("the quick brown fox", 10), "the quic..");
        assert_eq!(truncate_string("abcde", 5), "abcde");
        assert_eq!(truncate_string("abcde", 4), "ab..");
        assert_eq!(truncate_string("abcde", 2), "..");
        assert_eq!(truncate_string("これはテストだ", 3), "こ..");
    }

    #[test]
    fn seconds() {
        assert_eq!(
            seconds_to_duration("0.25"),
            Some(time::Duration::from_millis(250))
        );
        assert_eq!(seconds_to_duration(" 2 "), Some(time::Duration::from_secs(2)));
        assert_eq!(seconds_to_duration("0"), Some(time::Duration::ZERO));
        assert_eq!(seconds_to_duration("abc"), None);
        assert_eq!(seconds_to_duration("-0.5"), None);
        assert_eq!(seconds_to_duration("inf"), None);
    }

    #[test]
    fn valid_host() {
        assert!(is_valid_host("http://localhost:8080").is_ok());
        assert!(is_valid_host("https://example.com/api").is_ok());
        assert!(is_valid_host("localhost").is_err());
    }
}
