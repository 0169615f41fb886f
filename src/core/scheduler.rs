// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Periodic refresh scheduler

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Fixed-interval timer that can be paused without being torn down.
///
/// While disabled the timer keeps running but skips the task, so re-enabling
/// resumes on the next interval boundary.
pub struct Scheduler {
    interval: Duration,
    enabled: AtomicBool,
    ticks: AtomicU64,
}

impl Scheduler {
    pub fn new(interval: Duration, enabled: bool) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            enabled: AtomicBool::new(enabled),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            debug!("Scheduler {}", if enabled { "resumed" } else { "paused" });
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Number of ticks that actually ran the task
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Run `task` every interval until shutdown is signalled
    pub async fn run<F>(&self, mut task: F, mut shutdown: broadcast::Receiver<()>)
    where
        F: FnMut(),
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.is_enabled() {
                        self.ticks.fetch_add(1, Ordering::Relaxed);
                        task();
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Scheduler shutting down...");
                    break;
                }
            }
        }
    }
}
