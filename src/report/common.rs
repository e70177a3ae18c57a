use num_format::{Locale, ToFormattedString};
use std::fmt::{Display, Formatter};

/// Displays the inner value, or nothing when it is missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrEmpty<T>(pub Option<T>);

impl<T: Display> Display for OrEmpty<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(value) => value.fmt(f),
            None => f.write_str(""),
        }
    }
}

/// A count with thousands separators.
pub(crate) fn format_count(count: u64) -> String {
    count.to_formatted_string(&Locale::en)
}

/// A fraction from 0.0 to 1.0 as a percentage.
pub(crate) fn format_percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

/// Milliseconds, with decimals only below 10 ms.
pub(crate) fn format_ms(value: f64) -> String {
    if value < 10.0 {
        format!("{:.2}ms", value)
    } else {
        format!("{}ms", (value.round() as u64).to_formatted_string(&Locale::en))
    }
}
