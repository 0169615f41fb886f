// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Fill level severity classification

use serde::{Deserialize, Serialize};

/// Fill level at which a bin enters the Warning tier
pub const WARNING_LEVEL: f64 = 60.0;

/// Fill level at which a bin enters the Alert tier
pub const ALERT_LEVEL: f64 = 90.0;

/// Severity tier derived from a bin's fill level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BinStatus {
    Safe,
    Warning,
    Alert,
}

impl BinStatus {
    /// Classify a fill level. Each tier includes its lower bound.
    pub fn classify(fill_level: f64) -> Self {
        if fill_level >= ALERT_LEVEL {
            BinStatus::Alert
        } else if fill_level >= WARNING_LEVEL {
            BinStatus::Warning
        } else {
            BinStatus::Safe
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BinStatus::Safe => "Safe",
            BinStatus::Warning => "Warning",
            BinStatus::Alert => "Alert",
        }
    }
}

impl std::fmt::Display for BinStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Free-function form of [`BinStatus::classify`]
pub fn classify(fill_level: f64) -> BinStatus {
    BinStatus::classify(fill_level)
}
