//! Core types for xel-miner.
//!
//! This module provides a unified location for small value types used
//! throughout the miner.

mod target;

pub use target::{Target, TargetError, DIFF_1};

use std::fmt;
use std::time::Duration;

/// Job evaluation rate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EvalRate(pub u64); // evaluations per second

impl EvalRate {
    /// Rate from a number of evaluations over an elapsed period.
    pub fn from_count(evaluations: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Self(0);
        }
        Self((evaluations as f64 / secs) as u64)
    }

    /// Get value as thousands of evaluations per second
    pub fn as_kilo(&self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    /// Get value as millions of evaluations per second
    pub fn as_mega(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Format as human-readable string with appropriate units
    pub fn to_human_readable(&self) -> String {
        if self.0 >= 1_000_000 {
            format!("{:.2} MEval/s", self.as_mega())
        } else if self.0 >= 1_000 {
            format!("{:.2} kEval/s", self.as_kilo())
        } else {
            format!("{} Eval/s", self.0)
        }
    }
}

impl std::ops::Add for EvalRate {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl std::iter::Sum for EvalRate {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, r| acc + r)
    }
}

impl fmt::Display for EvalRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human_readable())
    }
}

/// Format a duration as `DD days HH:MM:SS`.
pub fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total / 3_600) % 24;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;
    format!(
        "{:02} days {:02}:{:02}:{:02}",
        days, hours, minutes, seconds
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_rate_from_count() {
        let rate = EvalRate::from_count(10_000, Duration::from_secs(5));
        assert_eq!(rate, EvalRate(2_000));

        assert_eq!(EvalRate::from_count(10, Duration::ZERO), EvalRate(0));
    }

    #[test]
    fn test_eval_rate_display() {
        assert_eq!(EvalRate(999).to_string(), "999 Eval/s");
        assert_eq!(EvalRate(2_500).to_string(), "2.50 kEval/s");
        assert_eq!(EvalRate(3_250_000).to_string(), "3.25 MEval/s");
    }

    #[test]
    fn test_eval_rate_sum() {
        let total: EvalRate = [EvalRate(1), EvalRate(2), EvalRate(3)].into_iter().sum();
        assert_eq!(total, EvalRate(6));
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(59)), "00 days 00:00:59");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5)),
            "02 days 03:04:05"
        );
    }
}
