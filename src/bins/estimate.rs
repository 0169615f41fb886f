// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Time-to-full prediction

use serde::{Deserialize, Serialize};

use super::state::DEFAULT_MIN_FILL_RATE;

/// Estimated time until a bin is full, already tiered for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum TimeToFull {
    AlreadyFull,
    Minutes(u64),
    Hours(u64),
    Days(u64),
}

impl TimeToFull {
    /// Estimate from the current fill level and fill rate (% per hour).
    ///
    /// Under one hour renders in minutes, under a day in hours, otherwise in
    /// days, each rounded to the nearest integer. Exactly one hour is hours.
    /// The tier is picked after rounding, so 59.7 minutes reads "1 hour"
    /// and a bin that is not yet full never reads "0 minutes".
    pub fn estimate(fill_level: f64, fill_rate: f64) -> Self {
        let remaining = 100.0 - fill_level;
        if remaining <= 0.0 {
            return TimeToFull::AlreadyFull;
        }

        // Rate is floored upstream; guard anyway so this never divides by zero
        let rate = if fill_rate.is_finite() {
            fill_rate.max(DEFAULT_MIN_FILL_RATE)
        } else {
            DEFAULT_MIN_FILL_RATE
        };
        let hours = remaining / rate;

        let minutes = (hours * 60.0).round();
        if minutes < 60.0 {
            return TimeToFull::Minutes((minutes as u64).max(1));
        }

        let whole_hours = hours.round();
        if whole_hours < 24.0 {
            TimeToFull::Hours(whole_hours as u64)
        } else {
            TimeToFull::Days((hours / 24.0).round().max(1.0) as u64)
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, TimeToFull::AlreadyFull)
    }
}

impl std::fmt::Display for TimeToFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn plural(n: u64, unit: &str) -> String {
            if n == 1 {
                format!("{} {}", n, unit)
            } else {
                format!("{} {}s", n, unit)
            }
        }

        match *self {
            TimeToFull::AlreadyFull => f.write_str("already full"),
            TimeToFull::Minutes(m) => f.write_str(&plural(m, "minute")),
            TimeToFull::Hours(h) => f.write_str(&plural(h, "hour")),
            TimeToFull::Days(d) => f.write_str(&plural(d, "day")),
        }
    }
}

/// Free-function form of [`TimeToFull::estimate`]
pub fn estimate(fill_level: f64, fill_rate: f64) -> TimeToFull {
    TimeToFull::estimate(fill_level, fill_rate)
}
