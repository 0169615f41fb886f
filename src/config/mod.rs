// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Configuration module

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::bins::{BinSpec, DEFAULT_MIN_FILL_RATE};
use crate::feed::FeedConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Monitoring loop configuration
    pub monitor: MonitorConfig,

    /// Simulated tick configuration
    pub simulation: SimulationConfig,

    /// Alert thresholds
    pub alerts: AlertConfig,

    /// Live feed configuration
    pub feed: FeedConfig,

    /// Tracked bins
    pub bins: Vec<BinSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "BinWatch".to_string(),
            log_level: "info".to_string(),
            monitor: MonitorConfig::default(),
            simulation: SimulationConfig::default(),
            alerts: AlertConfig::default(),
            feed: FeedConfig::default(),
            bins: vec![BinSpec::new("SB01", 67.0, 85.0, 2.5)],
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.bins.is_empty() {
            bail!("at least one bin must be configured");
        }

        let mut seen = HashSet::new();
        for bin in &self.bins {
            if bin.bin_id.trim().is_empty() {
                bail!("bin_id must not be empty");
            }
            if !seen.insert(bin.bin_id.as_str()) {
                bail!("duplicate bin_id '{}'", bin.bin_id);
            }
            for (name, value) in [
                ("fill_level_percent", bin.fill_level_percent),
                ("battery_level_percent", bin.battery_level_percent),
                ("fill_rate_percent_per_hour", bin.fill_rate_percent_per_hour),
            ] {
                if !value.is_finite() {
                    bail!("bin '{}': {} must be a finite number", bin.bin_id, name);
                }
            }
        }

        if self.monitor.tick_interval_ms == 0 {
            bail!("monitor.tick_interval_ms must be greater than zero");
        }

        let sim = &self.simulation;
        for (name, step) in [
            ("fill_step", sim.fill_step),
            ("battery_step", sim.battery_step),
            ("rate_step", sim.rate_step),
        ] {
            if !step.is_finite() || step < 0.0 {
                bail!("simulation.{} must be a non-negative number", name);
            }
        }
        if !sim.min_fill_rate.is_finite() || sim.min_fill_rate <= 0.0 {
            bail!("simulation.min_fill_rate must be positive");
        }

        for (name, value) in [
            ("fill_alert_percent", self.alerts.fill_alert_percent),
            ("battery_low_percent", self.alerts.battery_low_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                bail!("alerts.{} must be within 0-100", name);
            }
        }
        if !self.alerts.rearm_margin.is_finite() || self.alerts.rearm_margin < 0.0 {
            bail!("alerts.rearm_margin must be a non-negative number");
        }

        Ok(())
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("binwatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Monitoring loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Milliseconds between simulated ticks
    pub tick_interval_ms: u64,

    /// Start with auto-refresh on
    pub auto_refresh: bool,

    /// Start with alerts on
    pub alerts_enabled: bool,

    /// Entries kept in the activity log
    pub activity_log_capacity: usize,

    /// Event bus channel capacity
    pub event_capacity: usize,
}

impl MonitorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5000,
            auto_refresh: true,
            alerts_enabled: true,
            activity_log_capacity: 200,
            event_capacity: 256,
        }
    }
}

/// Simulated tick configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Max fill level change per tick (percentage points)
    pub fill_step: f64,

    /// Max battery change per tick (percentage points)
    pub battery_step: f64,

    /// Max fill rate change per tick (% per hour)
    pub rate_step: f64,

    /// Fill rate floor (% per hour)
    pub min_fill_rate: f64,

    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fill_step: 5.0,
            battery_step: 0.5,
            rate_step: 0.2,
            min_fill_rate: DEFAULT_MIN_FILL_RATE,
            seed: None,
        }
    }
}

/// Alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Capacity alert fires at or above this fill level
    pub fill_alert_percent: f64,

    /// Battery alert fires below this level
    pub battery_low_percent: f64,

    /// Extra distance a metric must retreat before the alert re-arms
    pub rearm_margin: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            fill_alert_percent: crate::bins::ALERT_LEVEL,
            battery_low_percent: 20.0,
            rearm_margin: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor.tick_interval(), Duration::from_secs(5));
        assert_eq!(config.bins[0].bin_id, "SB01");
    }

    #[test]
    fn test_toml_round_trip_with_partial_file() {
        let toml = r#"
            [monitor]
            tick_interval_ms = 2000

            [[bins]]
            bin_id = "A"
            fill_level_percent = 10.0
            battery_level_percent = 90.0
            fill_rate_percent_per_hour = 1.0

            [[bins]]
            bin_id = "B"
            fill_level_percent = 95.0
            battery_level_percent = 15.0
            fill_rate_percent_per_hour = 3.0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.monitor.tick_interval_ms, 2000);
        assert!(config.monitor.auto_refresh);
        assert_eq!(config.bins.len(), 2);
        assert_eq!(config.alerts.fill_alert_percent, 90.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_values() {
        let mut config = Config::default();
        config.bins.push(config.bins[0].clone());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.min_fill_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bins.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_bin_values() {
        let toml = r#"
            [[bins]]
            bin_id = "SB01"
            fill_level_percent = nan
            battery_level_percent = 80.0
            fill_rate_percent_per_hour = 1.0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fill_level_percent"));

        let mut config = Config::default();
        config.bins[0].fill_rate_percent_per_hour = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("binwatch-cfg-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.bins, created.bins);

        let _ = std::fs::remove_dir_all(dir);
    }
}
