// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Telemetry ingestion - simulated ticks and live readings funnelled into bin state

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::bins::{ApplyReport, BinSimulator, BinSnapshot, BinState, BinUpdate, UpdateSource};
use crate::config::Config;
use crate::error::{TelemetryError, TelemetryResult};
use crate::feed::{FeedStatus, LiveReading};

/// Result of one accepted update
#[derive(Debug, Clone)]
pub struct IngestOutcome<R> {
    pub snapshot: BinSnapshot,
    pub report: ApplyReport,
    /// Whatever the update hook returned
    pub hooked: R,
}

struct BinCell {
    state: BinState,
    simulator: BinSimulator,
}

/// Owns every tracked bin and serializes writes per bin.
///
/// The set of bins is fixed at construction. Each bin sits behind its own
/// lock, so the timer, the live feed and manual refreshes may call in
/// concurrently without losing or tearing updates.
pub struct TelemetryIngestor {
    bins: HashMap<String, Mutex<BinCell>>,
    order: Vec<String>,
    feed_status: RwLock<FeedStatus>,
    max_clock_skew: Duration,
}

impl TelemetryIngestor {
    pub fn new(config: &Config) -> Self {
        let now = Utc::now();
        let mut bins = HashMap::new();
        let mut order = Vec::new();

        for spec in &config.bins {
            let cell = BinCell {
                state: BinState::new(spec, config.simulation.min_fill_rate, now),
                simulator: BinSimulator::new(&spec.bin_id, &config.simulation),
            };
            if bins.insert(spec.bin_id.clone(), Mutex::new(cell)).is_none() {
                order.push(spec.bin_id.clone());
            }
        }

        Self {
            bins,
            order,
            feed_status: RwLock::new(FeedStatus::Disabled),
            // Capped at a year
            max_clock_skew: Duration::seconds(config.feed.max_clock_skew_secs.min(31_536_000) as i64),
        }
    }

    /// Bin ids in configuration order
    pub fn bin_ids(&self) -> &[String] {
        &self.order
    }

    pub fn feed_status(&self) -> FeedStatus {
        *self.feed_status.read()
    }

    /// Returns the previous status
    pub fn set_feed_status(&self, status: FeedStatus) -> FeedStatus {
        std::mem::replace(&mut *self.feed_status.write(), status)
    }

    pub fn snapshot(&self, bin_id: &str) -> Option<BinSnapshot> {
        self.bins.get(bin_id).map(|cell| cell.lock().state.snapshot())
    }

    pub fn snapshots(&self) -> Vec<BinSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    /// Advance one bin by a simulated tick.
    ///
    /// `hook` runs inside the bin's critical section with the new snapshot,
    /// so observers see updates in the order they were applied.
    pub fn tick<R>(
        &self,
        bin_id: &str,
        at: DateTime<Utc>,
        hook: impl FnOnce(&BinSnapshot) -> R,
    ) -> TelemetryResult<IngestOutcome<R>> {
        let perturb_fill = !self.feed_status().is_authoritative();
        self.with_cell(bin_id, |cell| {
            let update = cell.simulator.next_update(perturb_fill);
            Self::commit(cell, &update, UpdateSource::Simulated, at, hook)
        })
    }

    /// Apply a reading from the live feed.
    ///
    /// Readings older than the newest reading already accepted for the bin
    /// are rejected, as are readings stamped too far in the future. Simulated
    /// ticks do not take part in the staleness check. Fill rate is never
    /// touched here.
    pub fn apply_reading<R>(
        &self,
        reading: &LiveReading,
        hook: impl FnOnce(&BinSnapshot) -> R,
    ) -> TelemetryResult<IngestOutcome<R>> {
        let result = reading.validate().and_then(|(timestamp, update)| {
            let latest_allowed = Utc::now() + self.max_clock_skew;
            if timestamp > latest_allowed {
                return Err(TelemetryError::invalid(
                    &reading.bin_id,
                    format!("timestamp {} is in the future", timestamp),
                ));
            }

            self.with_cell(&reading.bin_id, |cell| {
                if let Some(last) = cell.state.last_reading_at() {
                    if timestamp < last {
                        return Err(TelemetryError::invalid(
                            &reading.bin_id,
                            format!("timestamp {} is older than last reading {}", timestamp, last),
                        ));
                    }
                }
                Self::commit(cell, &update, UpdateSource::LiveFeed, timestamp, hook)
            })
        });

        if let Err(e) = &result {
            warn!("Discarding reading: {}", e);
        }
        result
    }

    /// Record that a bin was emptied
    pub fn record_maintenance<R>(
        &self,
        bin_id: &str,
        at: DateTime<Utc>,
        hook: impl FnOnce(&BinSnapshot) -> R,
    ) -> TelemetryResult<IngestOutcome<R>> {
        self.with_cell(bin_id, |cell| {
            cell.state.record_maintenance(at);
            let snapshot = cell.state.snapshot();
            let hooked = hook(&snapshot);
            Ok(IngestOutcome {
                snapshot,
                report: ApplyReport::default(),
                hooked,
            })
        })
    }

    fn with_cell<T>(
        &self,
        bin_id: &str,
        f: impl FnOnce(&mut BinCell) -> TelemetryResult<T>,
    ) -> TelemetryResult<T> {
        let cell = self
            .bins
            .get(bin_id)
            .ok_or_else(|| TelemetryError::UnknownBin(bin_id.to_string()))?;
        let mut guard = cell.lock();
        f(&mut guard)
    }

    fn commit<R>(
        cell: &mut BinCell,
        update: &BinUpdate,
        source: UpdateSource,
        at: DateTime<Utc>,
        hook: impl FnOnce(&BinSnapshot) -> R,
    ) -> TelemetryResult<IngestOutcome<R>> {
        let report = cell.state.apply(update, source, at)?;
        let snapshot = cell.state.snapshot();
        if report.is_clamped() {
            debug!("{}: clamped {:?}", snapshot.bin_id, report.clamped);
        }
        let hooked = hook(&snapshot);

        Ok(IngestOutcome {
            snapshot,
            report,
            hooked,
        })
    }
}
