// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! BinWatch - Smart Waste-Bin Telemetry & Alerting Engine
//!
//! Tracks the fill level, battery and fill rate of networked waste bins:
//! - Per-bin state with range clamping and ordered, serialized updates
//! - Safe / Warning / Alert classification and time-to-full prediction
//! - Simulated ticks on a fixed interval, with a pause toggle and manual refresh
//! - Optional live feed (MQTT) that takes over the fill level when connected
//! - Edge-triggered capacity and battery alerts
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     BinWatch Engine                      │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐                           │
//! │  │ Scheduler │   │ Live Feed │                           │
//! │  │  (ticks)  │   │  (MQTT)   │                           │
//! │  └─────┬─────┘   └─────┬─────┘                           │
//! │        └───────┬───────┘                                 │
//! │          ┌─────▼──────┐   ┌─────────────┐                │
//! │          │  Ingestor  │ → │    Alert    │ → AlertSink    │
//! │          │ (per bin)  │   │  Evaluator  │                │
//! │          └─────┬──────┘   └──────┬──────┘                │
//! │  ┌─────────────▼─────────────────▼──────────────────┐    │
//! │  │                    Event Bus                     │    │
//! │  └──────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod alerts;
pub mod bins;
pub mod config;
pub mod core;
pub mod error;
pub mod feed;
pub mod ingest;

// Re-exports for convenience
pub use alerts::{AlertEvent, AlertKind, AlertSink};
pub use bins::{BinSnapshot, BinSpec, BinStatus, TimeToFull};
pub use config::Config;
pub use core::{Engine, EngineStatus, EventBus};
pub use error::{TelemetryError, TelemetryResult};
pub use feed::{FeedStatus, LiveFeed, LiveReading};

/// BinWatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// BinWatch name
pub const NAME: &str = "BinWatch";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
    /// Enabled features
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    let mut features = vec![];

    #[cfg(feature = "mqtt")]
    features.push("mqtt".to_string());

    features
}
