//! Core engine module - orchestrates the monitoring loop

mod activity;
mod engine;
mod scheduler;
mod event_bus;

pub use activity::{ActivityEntry, ActivityLevel, ActivityLog};
pub use engine::Engine;
pub use scheduler::Scheduler;
pub use event_bus::{Event, EventBus, EventPayload, EventType};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::feed::FeedStatus;

/// Engine-wide state for status displays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub auto_refresh: bool,
    pub alerts_enabled: bool,
    pub feed: FeedStatus,
    pub tick_interval: Duration,
    /// Scheduled ticks that ran an ingestion pass
    pub ticks: u64,
    pub bins: usize,
    pub uptime_seconds: u64,
}

impl EngineStatus {
    /// `"5s"` while auto-refresh runs, `"Manual"` otherwise
    pub fn update_interval_label(&self) -> String {
        if !self.auto_refresh {
            "Manual".to_string()
        } else if self.tick_interval.subsec_millis() == 0 {
            format!("{}s", self.tick_interval.as_secs())
        } else {
            format!("{}ms", self.tick_interval.as_millis())
        }
    }
}
