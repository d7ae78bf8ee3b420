//! Human-scale display of numeric readings
//!
//! A reading is shifted by powers of 1000 until it lies in `[1, 1000]`, and
//! the SI prefix of its unit is adjusted accordingly. Readings arriving
//! faster than the configured minimum interval are rejected.

use std::collections::HashMap;
use std::time::Duration;

use crate::model::WatchedIdentifier;

/// Supported SI prefixes and their decimal exponents
pub const SI_PREFIXES: [(&str, i32); 9] = [
    ("T", 12),
    ("G", 9),
    ("M", 6),
    ("k", 3),
    ("", 0),
    ("m", -3),
    ("µ", -6),
    ("n", -9),
    ("p", -12),
];

/// A reading ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayValue {
    pub value: f64,
    pub unit: String,
    /// `value` with one fractional digit, followed by the unit
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalization {
    Accepted(DisplayValue),
    Rejected,
}

impl Normalization {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn display(&self) -> Option<&DisplayValue> {
        match self {
            Self::Accepted(display) => Some(display),
            Self::Rejected => None,
        }
    }
}

fn prefix_exponent(symbol: char) -> Option<i32> {
    // U+03BC is accepted as an alias of the micro sign
    let symbol = if symbol == 'μ' { 'µ' } else { symbol };
    SI_PREFIXES
        .iter()
        .find(|(p, _)| p.chars().eq(std::iter::once(symbol)))
        .map(|(_, exp)| *exp)
}

fn prefix_symbol(exponent: i32) -> Option<&'static str> {
    SI_PREFIXES
        .iter()
        .find(|(_, exp)| *exp == exponent)
        .map(|(p, _)| *p)
}

/// Split `unit` into its prefix exponent and base unit
///
/// The first character is only treated as a prefix when a base unit remains,
/// so `"m"` is metres rather than milli-nothing.
pub fn split_unit(unit: &str) -> (i32, &str) {
    let mut chars = unit.chars();
    if let Some(first) = chars.next() {
        let base = chars.as_str();
        if !base.is_empty() {
            if let Some(exponent) = prefix_exponent(first) {
                return (exponent, base);
            }
        }
    }
    (0, unit)
}

/// Rescale `raw` to the display range of its unit
pub fn rescale(raw: f64, unit: &str) -> (f64, String) {
    if unit.is_empty() {
        return (raw, String::new());
    }

    let (mut exponent, base) = split_unit(unit);
    let mut value = raw;

    while value > 1000.0 {
        value /= 1000.0;
        exponent += 3;
        if prefix_symbol(exponent).is_none() {
            return (raw, unit.to_string());
        }
    }
    while value > 0.0 && value < 1.0 {
        value *= 1000.0;
        exponent -= 3;
        if prefix_symbol(exponent).is_none() {
            return (raw, unit.to_string());
        }
    }

    match prefix_symbol(exponent) {
        Some(prefix) => (value, format!("{}{}", prefix, base)),
        None => (raw, unit.to_string()),
    }
}

/// Build the display form without any interval check
pub fn display(raw: f64, unit: &str) -> DisplayValue {
    let (value, unit) = rescale(raw, unit);
    let text = if unit.is_empty() {
        format!("{:.1}", value)
    } else {
        format!("{:.1} {}", value, unit)
    };
    DisplayValue { value, unit, text }
}

/// Whether a reading at `now` may replace one accepted at `last_accepted_at`
///
/// The boundary is inclusive: exactly `min_interval` after the last accepted
/// reading counts as elapsed. A `now` earlier than the last acceptance means the
/// clock stepped back, which also counts as elapsed.
pub fn interval_elapsed(last_accepted_at: Option<i64>, min_interval: Duration, now: i64) -> bool {
    match last_accepted_at {
        None => true,
        Some(last) if now < last => true,
        Some(last) => {
            let min_ms = i64::try_from(min_interval.as_millis()).unwrap_or(i64::MAX);
            now.saturating_sub(last) >= min_ms
        },
    }
}

/// Accept and rescale a reading, or reject it when it arrives too early
pub fn normalize(
    raw: f64,
    unit: &str,
    last_accepted_at: Option<i64>,
    min_interval: Duration,
    now: i64,
) -> Normalization {
    if !interval_elapsed(last_accepted_at, min_interval, now) {
        return Normalization::Rejected;
    }
    Normalization::Accepted(display(raw, unit))
}

/// Remembers when each identifier was last accepted
#[derive(Debug, Clone, Default)]
pub struct RefreshTracker {
    last_accepted: HashMap<String, i64>,
}

impl RefreshTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `value` for `watched`, recording the time on acceptance
    pub fn offer(&mut self, watched: &WatchedIdentifier, value: f64, now: i64) -> Normalization {
        let last = self.last_accepted.get(&watched.identifier).copied();
        let result = normalize(value, &watched.unit, last, watched.min_interval, now);
        if result.is_accepted() {
            self.last_accepted.insert(watched.identifier.clone(), now);
        }
        result
    }

    pub fn last_accepted(&self, identifier: &str) -> Option<i64> {
        self.last_accepted.get(identifier).copied()
    }

    pub fn invalidate(&mut self, identifier: &str) {
        self.last_accepted.remove(identifier);
    }

    pub fn invalidate_all(&mut self) {
        self.last_accepted.clear();
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn text(raw: f64, unit: &str) -> String {
        display(raw, unit).text
    }

    #[test]
    fn test_scale_up_and_down() {
        assert_eq!(text(2_500_000.0, "Wh"), "2.5 MWh");
        assert_eq!(text(0.5, "mW"), "500.0 µW");
        assert_eq!(text(0.0005, "mW"), "500.0 nW");
        assert_eq!(text(1234.0, "kWh"), "1.2 MWh");
        assert_eq!(text(230.04, "V"), "230.0 V");
    }

    #[test]
    fn test_boundaries_stay_put() {
        assert_eq!(text(1000.0, "W"), "1000.0 W");
        assert_eq!(text(1.0, "W"), "1.0 W");
        assert_eq!(text(0.0, "W"), "0.0 W");
        assert_eq!(text(-5000.0, "W"), "-5000.0 W");
    }

    #[test]
    fn test_out_of_table_reverts() {
        let result = display(5.0e16, "W");
        assert_eq!(result.value, 5.0e16);
        assert_eq!(result.unit, "W");

        let result = display(0.000_000_5, "pW");
        assert_eq!(result.unit, "pW");
    }

    #[test]
    fn test_split_unit() {
        assert_eq!(split_unit("kWh"), (3, "Wh"));
        assert_eq!(split_unit("µA"), (-6, "A"));
        assert_eq!(split_unit("μA"), (-6, "A"));
        assert_eq!(split_unit("m"), (0, "m"));
        assert_eq!(split_unit("Hz"), (0, "Hz"));
        assert_eq!(split_unit(""), (0, ""));
        assert_eq!(text(1500.0, "m"), "1.5 km");
    }

    #[test]
    fn test_empty_unit_disables_rescaling() {
        let result = display(2_500_000.0, "");
        assert_eq!(result.value, 2_500_000.0);
        assert_eq!(result.text, "2500000.0");
    }

    #[test]
    fn test_interval() {
        let interval = Duration::from_secs(10);
        assert!(normalize(1.0, "W", None, interval, 0).is_accepted());
        assert!(!normalize(1.0, "W", Some(0), interval, 9_999).is_accepted());
        assert!(normalize(1.0, "W", Some(0), interval, 10_000).is_accepted());
        assert!(normalize(1.0, "W", Some(5), Duration::ZERO, 5).is_accepted());
    }

    #[test]
    fn test_clock_stepped_back_accepts() {
        let watched = WatchedIdentifier::new("1-0:16.7.0*255")
            .with_unit("W")
            .with_interval(Duration::from_secs(1));
        let mut tracker = RefreshTracker::new();

        assert!(tracker.offer(&watched, 100.0, 3_600_000).is_accepted());
        assert!(tracker.offer(&watched, 101.0, 3_540_000).is_accepted());
        assert_eq!(tracker.last_accepted("1-0:16.7.0*255"), Some(3_540_000));
        assert!(!tracker.offer(&watched, 102.0, 3_540_500).is_accepted());
    }

    #[test]
    fn test_normalize_is_pure() {
        let a = normalize(42.0, "kW", Some(0), Duration::from_secs(1), 2_000);
        let b = normalize(42.0, "kW", Some(0), Duration::from_secs(1), 2_000);
        assert_eq!(a, b);
        assert_eq!(a.display().unwrap().text, "42.0 kW");
    }

    #[test]
    fn test_refresh_tracker() {
        let watched = WatchedIdentifier::new("1-0:16.7.0*255")
            .with_unit("W")
            .with_interval(Duration::from_secs(5));
        let mut tracker = RefreshTracker::new();

        assert!(tracker.offer(&watched, 100.0, 1_000).is_accepted());
        assert_eq!(tracker.offer(&watched, 101.0, 3_000), Normalization::Rejected);
        assert_eq!(tracker.last_accepted("1-0:16.7.0*255"), Some(1_000));
        assert!(tracker.offer(&watched, 102.0, 6_000).is_accepted());

        assert!(!tracker.offer(&watched, 103.0, 7_000).is_accepted());
        tracker.invalidate("1-0:16.7.0*255");
        assert!(tracker.offer(&watched, 103.0, 7_000).is_accepted());

        tracker.invalidate_all();
        assert_eq!(tracker.last_accepted("1-0:16.7.0*255"), None);
    }
}
