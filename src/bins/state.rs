// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Bin state record and update application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::estimate::TimeToFull;
use super::status::BinStatus;
use crate::error::{TelemetryError, TelemetryResult};

/// Fill rate floor (% per hour) keeping time-to-full well-defined
pub const DEFAULT_MIN_FILL_RATE: f64 = 0.1;

/// Fields of a bin that telemetry can change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinField {
    FillLevel,
    BatteryLevel,
    FillRate,
}

impl BinField {
    pub fn name(&self) -> &'static str {
        match self {
            BinField::FillLevel => "fill_level_percent",
            BinField::BatteryLevel => "battery_level_percent",
            BinField::FillRate => "fill_rate_percent_per_hour",
        }
    }
}

/// How a single field should change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldUpdate {
    /// Overwrite with an absolute value
    Set(f64),
    /// Add a delta to the current value
    Adjust(f64),
}

impl FieldUpdate {
    fn raw(&self) -> f64 {
        match *self {
            FieldUpdate::Set(v) | FieldUpdate::Adjust(v) => v,
        }
    }

    fn resolve(&self, current: f64) -> f64 {
        match *self {
            FieldUpdate::Set(v) => v,
            FieldUpdate::Adjust(d) => current + d,
        }
    }
}

/// A batch of field changes applied atomically to one bin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinUpdate {
    pub fill_level: Option<FieldUpdate>,
    pub battery_level: Option<FieldUpdate>,
    pub fill_rate: Option<FieldUpdate>,
}

impl BinUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill_level(mut self, update: FieldUpdate) -> Self {
        self.fill_level = Some(update);
        self
    }

    pub fn battery_level(mut self, update: FieldUpdate) -> Self {
        self.battery_level = Some(update);
        self
    }

    pub fn fill_rate(mut self, update: FieldUpdate) -> Self {
        self.fill_rate = Some(update);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fill_level.is_none() && self.battery_level.is_none() && self.fill_rate.is_none()
    }

    fn fields(&self) -> impl Iterator<Item = (BinField, FieldUpdate)> + '_ {
        [
            (BinField::FillLevel, self.fill_level),
            (BinField::BatteryLevel, self.battery_level),
            (BinField::FillRate, self.fill_rate),
        ]
        .into_iter()
        .filter_map(|(field, update)| update.map(|u| (field, u)))
    }
}

/// Outcome of a successful [`BinState::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Fields whose requested value fell outside the domain and were clamped
    pub clamped: Vec<BinField>,
    /// Fields whose stored value actually changed
    pub changed: Vec<BinField>,
}

impl ApplyReport {
    pub fn is_clamped(&self) -> bool {
        !self.clamped.is_empty()
    }

    pub fn was_clamped(&self, field: BinField) -> bool {
        self.clamped.contains(&field)
    }
}

/// Where the most recent update to a bin came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    Initial,
    Simulated,
    LiveFeed,
    Maintenance,
}

/// Initial values for a tracked bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinSpec {
    pub bin_id: String,
    pub fill_level_percent: f64,
    pub battery_level_percent: f64,
    pub fill_rate_percent_per_hour: f64,
}

impl BinSpec {
    pub fn new(bin_id: &str, fill_level: f64, battery_level: f64, fill_rate: f64) -> Self {
        Self {
            bin_id: bin_id.to_string(),
            fill_level_percent: fill_level,
            battery_level_percent: battery_level,
            fill_rate_percent_per_hour: fill_rate,
        }
    }
}

/// Authoritative, always-clamped values for one physical bin
#[derive(Debug, Clone)]
pub struct BinState {
    bin_id: String,
    fill_level_percent: f64,
    battery_level_percent: f64,
    fill_rate_percent_per_hour: f64,
    last_updated: DateTime<Utc>,
    last_maintenance: DateTime<Utc>,
    // Newest timestamp accepted from the live feed; ticks never move it
    last_reading_at: Option<DateTime<Utc>>,
    min_fill_rate: f64,
    sequence: u64,
    source: UpdateSource,
}

impl BinState {
    /// Create a bin from its spec. Initial values are clamped like any update.
    pub fn new(spec: &BinSpec, min_fill_rate: f64, now: DateTime<Utc>) -> Self {
        let min_fill_rate = if min_fill_rate.is_finite() && min_fill_rate > 0.0 {
            min_fill_rate
        } else {
            DEFAULT_MIN_FILL_RATE
        };

        let mut state = Self {
            bin_id: spec.bin_id.clone(),
            fill_level_percent: 0.0,
            battery_level_percent: 100.0,
            fill_rate_percent_per_hour: min_fill_rate,
            last_updated: now,
            last_maintenance: now,
            last_reading_at: None,
            min_fill_rate,
            sequence: 0,
            source: UpdateSource::Initial,
        };

        let initial = [
            (BinField::FillLevel, spec.fill_level_percent),
            (BinField::BatteryLevel, spec.battery_level_percent),
            (BinField::FillRate, spec.fill_rate_percent_per_hour),
        ];
        for (field, value) in initial {
            if value.is_finite() {
                let (bounded, _) = state.bound(field, value);
                state.store(field, bounded);
            }
        }

        state
    }

    /// Apply one or more field changes.
    ///
    /// Non-finite values reject the whole update and leave the state untouched.
    /// Out-of-range values are clamped to the nearest bound and reported in
    /// [`ApplyReport::clamped`]. `last_updated` advances to `at` but never
    /// moves backwards.
    pub fn apply(
        &mut self,
        update: &BinUpdate,
        source: UpdateSource,
        at: DateTime<Utc>,
    ) -> TelemetryResult<ApplyReport> {
        if let Some((field, _)) = update.fields().find(|(_, u)| !u.raw().is_finite()) {
            return Err(TelemetryError::invalid(
                &self.bin_id,
                format!("{} is not a number", field.name()),
            ));
        }

        let mut report = ApplyReport::default();
        if update.is_empty() {
            return Ok(report);
        }

        for (field, change) in update.fields() {
            let current = self.get(field);
            let (bounded, clamped) = self.bound(field, change.resolve(current));
            if clamped {
                debug!("{}: {} clamped to {}", self.bin_id, field.name(), bounded);
                report.clamped.push(field);
            }
            if bounded != current {
                report.changed.push(field);
            }
            self.store(field, bounded);
        }

        self.touch(source, at);
        Ok(report)
    }

    /// Record that the bin was emptied.
    pub fn record_maintenance(&mut self, at: DateTime<Utc>) {
        self.fill_level_percent = 0.0;
        self.touch(UpdateSource::Maintenance, at);
        if self.last_updated > self.last_maintenance {
            self.last_maintenance = self.last_updated;
        }
    }

    fn touch(&mut self, source: UpdateSource, at: DateTime<Utc>) {
        if at > self.last_updated {
            self.last_updated = at;
        }
        if source == UpdateSource::LiveFeed {
            self.last_reading_at = Some(self.last_reading_at.map_or(at, |t| t.max(at)));
        }
        self.sequence += 1;
        self.source = source;
    }

    fn bound(&self, field: BinField, value: f64) -> (f64, bool) {
        let bounded = match field {
            BinField::FillLevel | BinField::BatteryLevel => value.clamp(0.0, 100.0),
            BinField::FillRate => value.max(self.min_fill_rate),
        };
        (bounded, bounded != value)
    }

    fn get(&self, field: BinField) -> f64 {
        match field {
            BinField::FillLevel => self.fill_level_percent,
            BinField::BatteryLevel => self.battery_level_percent,
            BinField::FillRate => self.fill_rate_percent_per_hour,
        }
    }

    fn store(&mut self, field: BinField, value: f64) {
        match field {
            BinField::FillLevel => self.fill_level_percent = value,
            BinField::BatteryLevel => self.battery_level_percent = value,
            BinField::FillRate => self.fill_rate_percent_per_hour = value,
        }
    }

    pub fn bin_id(&self) -> &str {
        &self.bin_id
    }

    pub fn fill_level_percent(&self) -> f64 {
        self.fill_level_percent
    }

    pub fn battery_level_percent(&self) -> f64 {
        self.battery_level_percent
    }

    pub fn fill_rate_percent_per_hour(&self) -> f64 {
        self.fill_rate_percent_per_hour
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn last_maintenance(&self) -> DateTime<Utc> {
        self.last_maintenance
    }

    /// Timestamp of the newest accepted live reading
    pub fn last_reading_at(&self) -> Option<DateTime<Utc>> {
        self.last_reading_at
    }

    pub fn min_fill_rate(&self) -> f64 {
        self.min_fill_rate
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Derived on every call, never cached
    pub fn status(&self) -> BinStatus {
        BinStatus::classify(self.fill_level_percent)
    }

    pub fn time_to_full(&self) -> TimeToFull {
        TimeToFull::estimate(self.fill_level_percent, self.fill_rate_percent_per_hour)
    }

    pub fn snapshot(&self) -> BinSnapshot {
        BinSnapshot {
            bin_id: self.bin_id.clone(),
            fill_level_percent: self.fill_level_percent,
            battery_level_percent: self.battery_level_percent,
            fill_rate_percent_per_hour: self.fill_rate_percent_per_hour,
            last_updated: self.last_updated,
            last_maintenance: self.last_maintenance,
            sequence: self.sequence,
            source: self.source,
            status: self.status(),
            time_to_full: self.time_to_full(),
        }
    }
}

/// Read-only copy of a bin for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinSnapshot {
    pub bin_id: String,
    pub fill_level_percent: f64,
    pub battery_level_percent: f64,
    pub fill_rate_percent_per_hour: f64,
    pub last_updated: DateTime<Utc>,
    pub last_maintenance: DateTime<Utc>,
    /// Number of updates applied since the session started
    pub sequence: u64,
    pub source: UpdateSource,
    pub status: BinStatus,
    pub time_to_full: TimeToFull,
}
