//! Live feed module - external sensor readings pushed into the engine

mod channel;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use channel::{ChannelFeed, FeedHandle};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttFeed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bins::{BinUpdate, FieldUpdate};
use crate::error::{TelemetryError, TelemetryResult};

/// Live feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Subscribe to the MQTT feed on start
    pub enabled: bool,
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    /// Topic filter carrying per-bin telemetry
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect_interval_ms: u64,
    /// Readings stamped further than this ahead of the local clock are rejected
    pub max_clock_skew_secs: u64,
    /// Buffered readings between the feed and the engine
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "binwatch".to_string(),
            topic: "smartbin/bins/+/telemetry".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            reconnect_interval_ms: 5000,
            max_clock_skew_secs: 30,
            channel_capacity: 64,
        }
    }
}

/// Passive connection indicator for the live feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    /// No live feed configured; simulation drives every field
    Disabled,
    Connecting,
    /// Feed is authoritative for fill level
    Live,
    /// Feed dropped or never came up; simulation has taken over
    Unavailable,
}

impl FeedStatus {
    /// Whether the feed currently owns the fill level field
    pub fn is_authoritative(&self) -> bool {
        matches!(self, FeedStatus::Live)
    }
}

impl std::fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeedStatus::Disabled => "Simulated",
            FeedStatus::Connecting => "Connecting",
            FeedStatus::Live => "Online",
            FeedStatus::Unavailable => "Offline (simulated)",
        };
        f.write_str(s)
    }
}

/// A reading as pushed by the sensor backend.
///
/// Absent values mean "no update for this field". Required fields are
/// optional here so that a missing one becomes an [`TelemetryError::InvalidReading`]
/// rather than a parse failure with no bin attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveReading {
    #[serde(default)]
    pub bin_id: String,
    #[serde(default)]
    pub fill_level_percent: Option<f64>,
    #[serde(default)]
    pub battery_level_percent: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LiveReading {
    pub fn fill_level(bin_id: &str, fill_level: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            bin_id: bin_id.to_string(),
            fill_level_percent: Some(fill_level),
            battery_level_percent: None,
            timestamp: Some(timestamp),
        }
    }

    pub fn with_battery(mut self, battery_level: f64) -> Self {
        self.battery_level_percent = Some(battery_level);
        self
    }

    /// Parse a JSON payload. Anything malformed is an invalid reading.
    pub fn from_json(payload: &[u8]) -> TelemetryResult<Self> {
        serde_json::from_slice(payload).map_err(|e| {
            let bin_id = serde_json::from_slice::<serde_json::Value>(payload)
                .ok()
                .and_then(|v| v.get("bin_id").and_then(|b| b.as_str()).map(str::to_string))
                .unwrap_or_default();
            TelemetryError::invalid(bin_id, format!("malformed payload: {}", e))
        })
    }

    /// Check required fields and convert into an absolute update
    pub fn validate(&self) -> TelemetryResult<(DateTime<Utc>, BinUpdate)> {
        if self.bin_id.trim().is_empty() {
            return Err(TelemetryError::invalid("", "missing bin_id"));
        }
        let timestamp = self
            .timestamp
            .ok_or_else(|| TelemetryError::invalid(&self.bin_id, "missing timestamp"))?;

        let mut update = BinUpdate::new();
        if let Some(fill) = self.fill_level_percent {
            update = update.fill_level(FieldUpdate::Set(fill));
        }
        if let Some(battery) = self.battery_level_percent {
            update = update.battery_level(FieldUpdate::Set(battery));
        }

        Ok((timestamp, update))
    }
}

/// What a feed delivers to its subscriber
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Reading(LiveReading),
    /// A payload that could not be decoded
    Rejected(TelemetryError),
    /// Connection state changed
    Status(FeedStatus),
}

type CancelHook = Box<dyn FnOnce() + Send + 'static>;

/// An active subscription. Must be cancelled when monitoring stops.
pub struct FeedSubscription {
    messages: mpsc::Receiver<FeedMessage>,
    cancel: Option<CancelHook>,
}

impl FeedSubscription {
    pub fn new<F>(messages: mpsc::Receiver<FeedMessage>, cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            messages,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Next message, or `None` once the feed has closed
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.messages.recv().await
    }

    /// Release the subscription's resources. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(hook) = self.cancel.take() {
            hook();
        }
        self.messages.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Inbound source of real sensor readings
#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// Feed name for logs
    fn name(&self) -> &str;

    /// Start receiving readings.
    ///
    /// Fails with [`TelemetryError::FeedUnavailable`] when the feed cannot be
    /// established.
    async fn subscribe(&mut self) -> TelemetryResult<FeedSubscription>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reading_with_absent_fields() {
        let payload = br#"{"bin_id":"SB01","fill_level_percent":72.5,"timestamp":"2026-01-01T12:00:00Z"}"#;
        let reading = LiveReading::from_json(payload).unwrap();
        assert_eq!(reading.bin_id, "SB01");
        assert_eq!(reading.fill_level_percent, Some(72.5));
        assert_eq!(reading.battery_level_percent, None);

        let (_, update) = reading.validate().unwrap();
        assert_eq!(update.fill_level, Some(FieldUpdate::Set(72.5)));
        assert!(update.battery_level.is_none());
        assert!(update.fill_rate.is_none());
    }

    #[test]
    fn test_non_numeric_payload_is_invalid() {
        let payload = br#"{"bin_id":"SB01","fill_level_percent":"lots","timestamp":"2026-01-01T12:00:00Z"}"#;
        let err = LiveReading::from_json(payload).unwrap_err();
        match err {
            TelemetryError::InvalidReading { bin_id, .. } => assert_eq!(bin_id, "SB01"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_fields() {
        let no_ts = LiveReading {
            bin_id: "SB01".to_string(),
            fill_level_percent: Some(10.0),
            ..LiveReading::default()
        };
        assert!(no_ts.validate().unwrap_err().is_invalid_reading());

        let no_id = LiveReading {
            timestamp: Some(Utc::now()),
            ..LiveReading::default()
        };
        assert!(no_id.validate().unwrap_err().is_invalid_reading());
    }

    #[test]
    fn test_subscription_cancel_runs_hook_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::channel(1);
        let counter = calls.clone();
        let mut sub = FeedSubscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(format!("{:?}", sub), "FeedSubscription { cancelled: false, .. }");
        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_only_live_feed_is_authoritative() {
        assert!(FeedStatus::Live.is_authoritative());
        assert!(!FeedStatus::Unavailable.is_authoritative());
        assert!(!FeedStatus::Connecting.is_authoritative());
        assert!(!FeedStatus::Disabled.is_authoritative());
    }
}
