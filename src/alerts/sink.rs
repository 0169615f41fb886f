// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Outbound alert delivery

use tracing::warn;

use super::AlertEvent;

/// Notification surface receiving alerts.
///
/// Delivery is fire-and-forget: the engine never waits for acknowledgement,
/// so implementations must not block.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &AlertEvent);
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, alert: &AlertEvent) {
        warn!(bin_id = %alert.bin_id, kind = %alert.kind, "🚨 {}", alert.message);
    }
}

impl<F> AlertSink for F
where
    F: Fn(&AlertEvent) + Send + Sync,
{
    fn deliver(&self, alert: &AlertEvent) {
        self(alert)
    }
}
