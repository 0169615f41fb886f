//! Alert module - edge-triggered threshold alerts and their delivery

mod evaluator;
mod sink;

pub use evaluator::{AlertEvaluator, AlertPolicy, AlertState};
pub use sink::{AlertSink, LogSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which threshold an alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Fill level reached the Alert tier
    Capacity,
    /// Sensor battery dropped below the low-battery threshold
    Battery,
}

impl AlertKind {
    pub const ALL: [AlertKind; 2] = [AlertKind::Capacity, AlertKind::Battery];
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Capacity => f.write_str("capacity-alert"),
            AlertKind::Battery => f.write_str("battery-alert"),
        }
    }
}

/// Notification produced on a Quiet -> Firing transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub bin_id: String,
    pub kind: AlertKind,
    pub triggered_at: DateTime<Utc>,
    /// Metric value that crossed the threshold
    pub value: f64,
    pub message: String,
}

impl AlertEvent {
    pub fn new(bin_id: &str, kind: AlertKind, value: f64, triggered_at: DateTime<Utc>) -> Self {
        let message = match kind {
            AlertKind::Capacity => format!("Bin {} is {:.0}% full and needs emptying", bin_id, value),
            AlertKind::Battery => format!("Bin {} sensor battery low ({:.0}%)", bin_id, value),
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            bin_id: bin_id.to_string(),
            kind,
            triggered_at,
            value,
            message,
        }
    }
}
