// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Per-bin alert state machine

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{AlertEvent, AlertKind};
use crate::bins::BinSnapshot;
use crate::config::AlertConfig;

/// Alert state for one (bin, kind) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlertState {
    #[default]
    Quiet,
    Firing,
}

/// Threshold policy shared by all bins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    pub fill_alert_percent: f64,
    pub battery_low_percent: f64,
    pub rearm_margin: f64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::from(&AlertConfig::default())
    }
}

impl From<&AlertConfig> for AlertPolicy {
    fn from(config: &AlertConfig) -> Self {
        Self {
            fill_alert_percent: config.fill_alert_percent,
            battery_low_percent: config.battery_low_percent,
            rearm_margin: config.rearm_margin.max(0.0),
        }
    }
}

impl AlertPolicy {
    /// State a metric should be in given its value and the current state.
    ///
    /// Entering Firing uses the exact threshold. Leaving it requires the value
    /// to retreat past the threshold by `rearm_margin`.
    pub fn next_state(&self, kind: AlertKind, value: f64, current: AlertState) -> AlertState {
        let firing = match (kind, current) {
            (AlertKind::Capacity, AlertState::Quiet) => value >= self.fill_alert_percent,
            (AlertKind::Capacity, AlertState::Firing) => {
                value >= self.fill_alert_percent - self.rearm_margin
            }
            (AlertKind::Battery, AlertState::Quiet) => value < self.battery_low_percent,
            (AlertKind::Battery, AlertState::Firing) => {
                value < self.battery_low_percent + self.rearm_margin
            }
        };

        if firing {
            AlertState::Firing
        } else {
            AlertState::Quiet
        }
    }

    fn metric(kind: AlertKind, snapshot: &BinSnapshot) -> f64 {
        match kind {
            AlertKind::Capacity => snapshot.fill_level_percent,
            AlertKind::Battery => snapshot.battery_level_percent,
        }
    }
}

/// Watches bin snapshots and emits an event only on Quiet -> Firing
pub struct AlertEvaluator {
    policy: AlertPolicy,
    states: Mutex<HashMap<(String, AlertKind), AlertState>>,
}

impl AlertEvaluator {
    pub fn new(policy: AlertPolicy) -> Self {
        Self {
            policy,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// Evaluate every alert kind for a bin.
    ///
    /// Transitions are tracked whether or not `emit` is set, so muting alerts
    /// never builds up a backlog that fires on unmute.
    pub fn evaluate(&self, snapshot: &BinSnapshot, emit: bool) -> Vec<AlertEvent> {
        AlertKind::ALL
            .iter()
            .filter_map(|&kind| {
                let value = AlertPolicy::metric(kind, snapshot);
                self.observe(&snapshot.bin_id, kind, value, snapshot.last_updated, emit)
            })
            .collect()
    }

    /// Feed one metric value through the state machine
    pub fn observe(
        &self,
        bin_id: &str,
        kind: AlertKind,
        value: f64,
        at: DateTime<Utc>,
        emit: bool,
    ) -> Option<AlertEvent> {
        let mut states = self.states.lock();
        let state = states.entry((bin_id.to_string(), kind)).or_default();
        let next = self.policy.next_state(kind, value, *state);
        let previous = std::mem::replace(state, next);

        match (previous, next) {
            (AlertState::Quiet, AlertState::Firing) if emit => {
                info!("{} raised for {} at {:.1}", kind, bin_id, value);
                Some(AlertEvent::new(bin_id, kind, value, at))
            }
            (AlertState::Quiet, AlertState::Firing) => {
                debug!("{} for {} suppressed (alerts disabled)", kind, bin_id);
                None
            }
            (AlertState::Firing, AlertState::Quiet) => {
                debug!("{} cleared for {} at {:.1}", kind, bin_id, value);
                None
            }
            _ => None,
        }
    }

    pub fn state(&self, bin_id: &str, kind: AlertKind) -> AlertState {
        self.states
            .lock()
            .get(&(bin_id.to_string(), kind))
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(evaluator: &AlertEvaluator, kind: AlertKind, values: &[f64], emit: bool) -> Vec<usize> {
        values
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| evaluator.observe("SB01", kind, v, Utc::now(), emit).map(|_| i))
            .collect()
    }

    #[test]
    fn test_fill_sequence_fires_twice() {
        let evaluator = AlertEvaluator::new(AlertPolicy::default());
        let fired = run(&evaluator, AlertKind::Capacity, &[50.0, 70.0, 95.0, 85.0, 95.0], true);
        // third and fifth readings
        assert_eq!(fired, vec![2, 4]);
        assert_eq!(evaluator.state("SB01", AlertKind::Capacity), AlertState::Firing);
    }

    #[test]
    fn test_no_repeat_while_above_threshold() {
        let evaluator = AlertEvaluator::new(AlertPolicy::default());
        let fired = run(&evaluator, AlertKind::Capacity, &[90.0, 90.0, 99.0, 100.0, 91.0], true);
        assert_eq!(fired, vec![0]);
    }

    #[test]
    fn test_oscillation_alternates_fire_and_clear() {
        let evaluator = AlertEvaluator::new(AlertPolicy::default());
        let fired = run(&evaluator, AlertKind::Capacity, &[89.99, 90.0, 89.99, 90.0, 90.01], true);
        assert_eq!(fired, vec![1, 3]);
    }

    #[test]
    fn test_battery_alert_fires_below_twenty() {
        let evaluator = AlertEvaluator::new(AlertPolicy::default());
        let fired = run(&evaluator, AlertKind::Battery, &[25.0, 20.0, 19.9, 10.0, 20.0, 19.0], true);
        assert_eq!(fired, vec![2, 5]);
    }

    #[test]
    fn test_disabled_tracks_state_without_backlog() {
        let evaluator = AlertEvaluator::new(AlertPolicy::default());

        // crossing while muted
        assert!(run(&evaluator, AlertKind::Capacity, &[50.0, 95.0], false).is_empty());
        assert_eq!(evaluator.state("SB01", AlertKind::Capacity), AlertState::Firing);

        // unmuted, still above: nothing retroactive
        assert!(run(&evaluator, AlertKind::Capacity, &[96.0, 97.0], true).is_empty());

        // a fresh crossing fires
        assert_eq!(run(&evaluator, AlertKind::Capacity, &[80.0, 92.0], true), vec![1]);
    }

    #[test]
    fn test_rearm_margin_adds_hysteresis() {
        let policy = AlertPolicy {
            rearm_margin: 5.0,
            ..AlertPolicy::default()
        };
        let evaluator = AlertEvaluator::new(policy);
        let fired = run(&evaluator, AlertKind::Capacity, &[91.0, 88.0, 91.0, 84.0, 91.0], true);
        assert_eq!(fired, vec![0, 4]);
    }

    #[test]
    fn test_bins_are_independent() {
        let evaluator = AlertEvaluator::new(AlertPolicy::default());
        let now = Utc::now();
        assert!(evaluator.observe("A", AlertKind::Capacity, 95.0, now, true).is_some());
        assert!(evaluator.observe("B", AlertKind::Capacity, 95.0, now, true).is_some());
        assert!(evaluator.observe("A", AlertKind::Capacity, 96.0, now, true).is_none());
    }

    #[test]
    fn test_event_carries_bin_and_kind() {
        let evaluator = AlertEvaluator::new(AlertPolicy::default());
        let event = evaluator
            .observe("SB01", AlertKind::Capacity, 93.4, Utc::now(), true)
            .unwrap();
        assert_eq!(event.bin_id, "SB01");
        assert_eq!(event.kind, AlertKind::Capacity);
        assert!(event.message.contains("93%"));
    }
}
