// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Telemetry error taxonomy

use thiserror::Error;

/// Errors raised while ingesting bin telemetry.
///
/// None of these are fatal: the monitoring loop logs them, keeps the previous
/// bin state and carries on. Clamping an out-of-range value is not an error at
/// all and is reported through [`crate::bins::ApplyReport`] instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    /// Malformed or out-of-domain reading; the update was discarded.
    #[error("invalid reading for bin '{bin_id}': {reason}")]
    InvalidReading {
        /// Bin the reading was addressed to (empty when it could not be determined)
        bin_id: String,
        /// Why the reading was rejected
        reason: String,
    },

    /// The live feed could not be established or dropped.
    #[error("live feed unavailable: {0}")]
    FeedUnavailable(String),

    /// The bin is not tracked by this session.
    #[error("unknown bin '{0}'")]
    UnknownBin(String),
}

impl TelemetryError {
    /// Shorthand for an [`TelemetryError::InvalidReading`]
    pub fn invalid(bin_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReading {
            bin_id: bin_id.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that mean "discard this reading"
    pub fn is_invalid_reading(&self) -> bool {
        matches!(self, Self::InvalidReading { .. })
    }
}

/// Result alias for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;
