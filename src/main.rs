// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! BinWatch - Smart Waste-Bin Telemetry & Alerting Engine
//!
//! Headless monitor: ticks every configured bin, listens to the live feed
//! when one is configured, and logs status changes and alerts.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use binwatch::{Config, Engine, NAME, VERSION};

/// BinWatch - Smart Waste-Bin Telemetry & Alerting Engine
#[derive(Parser, Debug)]
#[command(name = "binwatch")]
#[command(author = "BinWatch Project")]
#[command(version = VERSION)]
#[command(about = "Fill level monitoring, time-to-full prediction and capacity alerts for smart bins")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tick interval in milliseconds
    #[arg(long)]
    interval: Option<u64>,

    /// Start with auto-refresh paused
    #[arg(long)]
    no_auto_refresh: bool,

    /// Start with alerts muted
    #[arg(long)]
    mute_alerts: bool,

    /// MQTT broker address (enables the live feed)
    #[arg(long)]
    mqtt_broker: Option<String>,

    /// Fixed simulation seed
    #[arg(long)]
    seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    init_logging(&args, &config)?;
    info!("🗑️  {} v{} - Smart Bin Telemetry & Alerting", NAME, VERSION);

    // Override with command line args
    if let Some(interval) = args.interval {
        config.monitor.tick_interval_ms = interval;
    }
    if args.no_auto_refresh {
        config.monitor.auto_refresh = false;
    }
    if args.mute_alerts {
        config.monitor.alerts_enabled = false;
    }
    if let Some(broker) = args.mqtt_broker {
        config.feed.enabled = true;
        config.feed.broker = broker;
    }
    if args.seed.is_some() {
        config.simulation.seed = args.seed;
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Tracking {} bin(s)", config.bins.len());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_headless(config))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins, then `--trace`/`--debug`, then the configured `log_level`.
fn init_logging(args: &Args, config: &Config) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_directive(args, config))
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Level used when `RUST_LOG` is not set
fn log_directive(args: &Args, config: &Config) -> String {
    if args.trace {
        Level::TRACE.to_string().to_lowercase()
    } else if args.debug {
        Level::DEBUG.to_string().to_lowercase()
    } else {
        config.log_level.clone()
    }
}

/// Run the monitor until Ctrl+C
async fn run_headless(config: Config) -> Result<()> {
    let feed_enabled = config.feed.enabled;
    let feed_config = config.feed.clone();

    #[allow(unused_mut)]
    let mut engine = Engine::new(config)?;

    if feed_enabled {
        #[cfg(feature = "mqtt")]
        {
            engine = engine.with_feed(Box::new(binwatch::feed::MqttFeed::new(feed_config)));
        }

        #[cfg(not(feature = "mqtt"))]
        {
            let _ = feed_config;
            warn!("Live feed configured but the mqtt feature is disabled; using simulated readings");
        }
    }

    let engine = Arc::new(engine);
    engine.start().await?;

    let monitor = tokio::spawn(log_updates(engine.clone()));

    let status = engine.status();
    info!("🚀 BinWatch running (refresh: {})", status.update_interval_label());
    for snapshot in engine.snapshots() {
        info!(
            "   {} {:.0}% full [{}], battery {:.0}%, full in {}",
            snapshot.bin_id,
            snapshot.fill_level_percent,
            snapshot.status,
            snapshot.battery_level_percent,
            snapshot.time_to_full
        );
    }
    info!("   Press Ctrl+C to shutdown");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    engine.stop().await?;
    monitor.abort();

    info!("BinWatch shutdown complete");
    Ok(())
}

/// Log snapshots whose status changed, and every alert
async fn log_updates(engine: Arc<Engine>) {
    let mut snapshots = engine.subscribe_snapshots();
    let mut alerts = engine.subscribe_alerts();
    let mut last_status = std::collections::HashMap::new();

    loop {
        tokio::select! {
            snapshot = snapshots.recv() => match snapshot {
                Ok(snapshot) => {
                    let previous = last_status.insert(snapshot.bin_id.clone(), snapshot.status);
                    if previous != Some(snapshot.status) {
                        info!(
                            "{} is now {} ({:.0}% full, full in {})",
                            snapshot.bin_id,
                            snapshot.status,
                            snapshot.fill_level_percent,
                            snapshot.time_to_full
                        );
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Status log lagged by {} snapshots", n),
                Err(RecvError::Closed) => break,
            },
            alert = alerts.recv() => match alert {
                Ok(alert) => info!("Alert recorded: {} ({})", alert.message, alert.kind),
                Err(RecvError::Lagged(n)) => warn!("Alert log lagged by {} alerts", n),
                Err(RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_log_level_is_the_fallback() {
        let mut config = Config::default();
        config.log_level = "warn".to_string();

        let args = Args::parse_from(["binwatch"]);
        assert_eq!(log_directive(&args, &config), "warn");

        let args = Args::parse_from(["binwatch", "--debug"]);
        assert_eq!(log_directive(&args, &config), "debug");

        let args = Args::parse_from(["binwatch", "--trace", "--debug"]);
        assert_eq!(log_directive(&args, &config), "trace");
    }
}
