// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Monitoring engine - wires ticks, live feed, alerts and user toggles together

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn, debug};

use super::activity::{ActivityEntry, ActivityLevel, ActivityLog};
use super::event_bus::{Event, EventBus};
use super::scheduler::Scheduler;
use super::EngineStatus;
use crate::alerts::{AlertEvaluator, AlertEvent, AlertKind, AlertPolicy, AlertSink, AlertState, LogSink};
use crate::bins::BinSnapshot;
use crate::config::Config;
use crate::error::TelemetryResult;
use crate::feed::{FeedMessage, FeedStatus, FeedSubscription, LiveFeed, LiveReading};
use crate::ingest::TelemetryIngestor;

/// Everything an update path needs, cheap to clone into tasks
#[derive(Clone)]
struct Pipeline {
    ingestor: Arc<TelemetryIngestor>,
    evaluator: Arc<AlertEvaluator>,
    event_bus: Arc<EventBus>,
    activity: Arc<ActivityLog>,
    sink: Arc<dyn AlertSink>,
    alerts_enabled: Arc<AtomicBool>,
}

impl Pipeline {
    /// One ingestion pass over every bin
    fn refresh_all(&self) -> Vec<BinSnapshot> {
        let at = Utc::now();
        let emit = self.alerts_enabled();
        let mut snapshots = Vec::with_capacity(self.ingestor.bin_ids().len());

        for bin_id in self.ingestor.bin_ids() {
            match self
                .ingestor
                .tick(bin_id, at, |snap| self.evaluator.evaluate(snap, emit))
            {
                Ok(outcome) => {
                    self.dispatch(&outcome.snapshot, outcome.hooked);
                    snapshots.push(outcome.snapshot);
                }
                Err(e) => warn!("Tick failed for {}: {}", bin_id, e),
            }
        }

        snapshots
    }

    fn ingest_reading(&self, reading: &LiveReading) -> TelemetryResult<BinSnapshot> {
        let emit = self.alerts_enabled();
        match self
            .ingestor
            .apply_reading(reading, |snap| self.evaluator.evaluate(snap, emit))
        {
            Ok(outcome) => {
                self.dispatch(&outcome.snapshot, outcome.hooked);
                Ok(outcome.snapshot)
            }
            Err(e) => {
                self.log(ActivityLevel::Warning, format!("Discarded reading: {}", e));
                Err(e)
            }
        }
    }

    fn reset_bin(&self, bin_id: &str) -> TelemetryResult<BinSnapshot> {
        let emit = self.alerts_enabled();
        let outcome = self
            .ingestor
            .record_maintenance(bin_id, Utc::now(), |snap| self.evaluator.evaluate(snap, emit))?;

        info!("Bin {} reset after maintenance", bin_id);
        self.log(
            ActivityLevel::Info,
            format!("Bin {} fill level reset to 0%", bin_id),
        );
        self.dispatch(&outcome.snapshot, outcome.hooked);
        Ok(outcome.snapshot)
    }

    fn handle_feed_message(&self, message: FeedMessage) {
        match message {
            FeedMessage::Reading(reading) => {
                let _ = self.ingest_reading(&reading);
            }
            FeedMessage::Rejected(e) => {
                warn!("Discarding reading: {}", e);
                self.log(ActivityLevel::Warning, format!("Discarded reading: {}", e));
            }
            FeedMessage::Status(status) => self.set_feed_status(status),
        }
    }

    fn set_feed_status(&self, status: FeedStatus) {
        let previous = self.ingestor.set_feed_status(status);
        if previous == status {
            return;
        }

        debug!("Feed status {:?} -> {:?}", previous, status);
        self.event_bus.publish_feed_status(status);
        match status {
            FeedStatus::Live => self.log(ActivityLevel::Success, "Live feed connected"),
            FeedStatus::Unavailable => self.log(
                ActivityLevel::Warning,
                "Live feed unavailable, falling back to simulated readings",
            ),
            FeedStatus::Connecting => self.log(ActivityLevel::Info, "Connecting to live feed"),
            FeedStatus::Disabled => {}
        }
    }

    /// Deliver results of an update once the bin lock is released
    fn dispatch(&self, snapshot: &BinSnapshot, alerts: Vec<AlertEvent>) {
        for alert in alerts {
            self.sink.deliver(&alert);
            self.log(ActivityLevel::Warning, alert.message.clone());
            self.event_bus.publish_alert(alert);
        }
        self.event_bus.publish_snapshot(snapshot.clone());
    }

    fn log(&self, level: ActivityLevel, message: impl Into<String>) {
        let entry = self.activity.record(level, message);
        self.event_bus.publish_activity(entry);
    }

    fn alerts_enabled(&self) -> bool {
        self.alerts_enabled.load(Ordering::SeqCst)
    }
}

/// Main monitoring engine.
///
/// Owns the bins for the lifetime of the session. Toggles and read methods
/// take `&self`, so the engine can be shared behind an `Arc` with the UI.
pub struct Engine {
    pub config: Arc<Config>,
    pipeline: Pipeline,
    scheduler: Arc<Scheduler>,
    feed: tokio::sync::Mutex<Option<Box<dyn LiveFeed>>>,
    shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    start_time: Mutex<Option<Instant>>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let pipeline = Pipeline {
            ingestor: Arc::new(TelemetryIngestor::new(&config)),
            evaluator: Arc::new(AlertEvaluator::new(AlertPolicy::from(&config.alerts))),
            event_bus: Arc::new(EventBus::new(config.monitor.event_capacity)),
            activity: Arc::new(ActivityLog::new(config.monitor.activity_log_capacity)),
            sink: Arc::new(LogSink),
            alerts_enabled: Arc::new(AtomicBool::new(config.monitor.alerts_enabled)),
        };

        // Prime alert state so bins already past a threshold don't fire on the
        // first tick without having crossed it
        for snapshot in pipeline.ingestor.snapshots() {
            pipeline.evaluator.evaluate(&snapshot, false);
        }

        let scheduler = Arc::new(Scheduler::new(
            config.monitor.tick_interval(),
            config.monitor.auto_refresh,
        ));

        Ok(Self {
            config,
            pipeline,
            scheduler,
            feed: tokio::sync::Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            start_time: Mutex::new(None),
        })
    }

    /// Replace the default log sink
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.pipeline.sink = sink;
        self
    }

    /// Attach a live feed, subscribed on [`Engine::start`]
    pub fn with_feed(mut self, feed: Box<dyn LiveFeed>) -> Self {
        *self.feed.get_mut() = Some(feed);
        self
    }

    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            warn!("Engine already running");
            return Ok(());
        }

        info!("Starting BinWatch engine...");
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut tasks = Vec::new();

        if let Some(subscription) = self.subscribe_feed().await {
            let pipeline = self.pipeline.clone();
            let shutdown = shutdown_tx.subscribe();
            tasks.push(tokio::spawn(run_feed(pipeline, subscription, shutdown)));
        }

        let scheduler = self.scheduler.clone();
        let pipeline = self.pipeline.clone();
        let shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            scheduler
                .run(
                    || {
                        pipeline.refresh_all();
                    },
                    shutdown,
                )
                .await;
        }));

        *self.tasks.lock() = tasks;
        *self.shutdown_tx.lock() = Some(shutdown_tx);
        *self.start_time.lock() = Some(Instant::now());

        self.pipeline.log(ActivityLevel::Success, "Monitoring started");
        info!(
            "BinWatch engine started ({} bins, interval {:?})",
            self.pipeline.ingestor.bin_ids().len(),
            self.scheduler.interval()
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let Some(shutdown_tx) = self.shutdown_tx.lock().take() else {
            return Ok(());
        };

        info!("Stopping BinWatch engine...");
        let _ = shutdown_tx.send(());

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Engine task ended abnormally: {}", e);
            }
        }

        *self.start_time.lock() = None;
        self.pipeline.set_feed_status(FeedStatus::Disabled);
        self.pipeline.log(ActivityLevel::Info, "Monitoring stopped");
        info!("BinWatch engine stopped");
        Ok(())
    }

    async fn subscribe_feed(&self) -> Option<FeedSubscription> {
        let mut feed = self.feed.lock().await;
        let Some(feed) = feed.as_mut() else {
            self.pipeline.set_feed_status(FeedStatus::Disabled);
            return None;
        };

        self.pipeline.set_feed_status(FeedStatus::Connecting);
        match feed.subscribe().await {
            Ok(subscription) => {
                info!("Subscribed to {} feed", feed.name());
                Some(subscription)
            }
            Err(e) => {
                warn!("{}; using simulated readings", e);
                self.pipeline.set_feed_status(FeedStatus::Unavailable);
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.lock().is_some()
    }

    /// Toggle the periodic simulated tick
    pub fn set_auto_refresh(&self, enabled: bool) {
        self.scheduler.set_enabled(enabled);
        self.pipeline.log(
            ActivityLevel::Info,
            format!("Auto-refresh {}", if enabled { "on" } else { "off" }),
        );
    }

    pub fn auto_refresh(&self) -> bool {
        self.scheduler.is_enabled()
    }

    /// Toggle alert emission. State keeps being tracked while off.
    pub fn set_alerts_enabled(&self, enabled: bool) {
        self.pipeline.alerts_enabled.store(enabled, Ordering::SeqCst);
        self.pipeline.log(
            ActivityLevel::Info,
            format!("Alerts {}", if enabled { "enabled" } else { "disabled" }),
        );
    }

    pub fn alerts_enabled(&self) -> bool {
        self.pipeline.alerts_enabled()
    }

    /// Run exactly one ingestion pass now, regardless of auto-refresh
    pub fn manual_refresh(&self) -> Vec<BinSnapshot> {
        debug!("Manual refresh");
        self.pipeline.refresh_all()
    }

    /// Apply a live reading directly, bypassing any feed subscription
    pub fn ingest(&self, reading: &LiveReading) -> TelemetryResult<BinSnapshot> {
        self.pipeline.ingest_reading(reading)
    }

    /// Record that a bin was emptied
    pub fn reset_bin(&self, bin_id: &str) -> TelemetryResult<BinSnapshot> {
        self.pipeline.reset_bin(bin_id)
    }

    pub fn snapshot(&self, bin_id: &str) -> Option<BinSnapshot> {
        self.pipeline.ingestor.snapshot(bin_id)
    }

    pub fn snapshots(&self) -> Vec<BinSnapshot> {
        self.pipeline.ingestor.snapshots()
    }

    pub fn alert_state(&self, bin_id: &str, kind: AlertKind) -> AlertState {
        self.pipeline.evaluator.state(bin_id, kind)
    }

    pub fn feed_status(&self) -> FeedStatus {
        self.pipeline.ingestor.feed_status()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.is_running(),
            auto_refresh: self.auto_refresh(),
            alerts_enabled: self.alerts_enabled(),
            feed: self.feed_status(),
            tick_interval: self.scheduler.interval(),
            ticks: self.scheduler.ticks(),
            bins: self.pipeline.ingestor.bin_ids().len(),
            uptime_seconds: self.uptime(),
        }
    }

    pub fn uptime(&self) -> u64 {
        self.start_time
            .lock()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Recent activity, newest first
    pub fn activity(&self, limit: usize) -> Vec<ActivityEntry> {
        self.pipeline.activity.recent(limit)
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertEvent> {
        self.pipeline.event_bus.subscribe_alerts()
    }

    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<BinSnapshot> {
        self.pipeline.event_bus.subscribe_snapshots()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.pipeline.event_bus.subscribe_events()
    }
}

/// Apply feed messages as they arrive until shutdown, then cancel the subscription.
///
/// A feed that closes on its own leaves the status at `Unavailable` so the
/// indicator shows simulation has taken over.
async fn run_feed(
    pipeline: Pipeline,
    mut subscription: FeedSubscription,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            message = subscription.recv() => match message {
                Some(message) => pipeline.handle_feed_message(message),
                None => {
                    warn!("Live feed closed, falling back to simulated readings");
                    pipeline.set_feed_status(FeedStatus::Unavailable);
                    break;
                }
            },
            _ = shutdown.recv() => {
                debug!("Feed task shutting down...");
                pipeline.set_feed_status(FeedStatus::Disabled);
                break;
            }
        }
    }

    subscription.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::BinSpec;
    use crate::error::TelemetryError;
    use crate::feed::ChannelFeed;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn config() -> Config {
        let mut config = Config::default();
        config.monitor.tick_interval_ms = 10;
        config.simulation.seed = Some(3);
        config.bins = vec![BinSpec::new("SB01", 67.0, 85.0, 2.5)];
        config
    }

    fn collecting_engine(config: Config) -> (Engine, Arc<Mutex<Vec<AlertEvent>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink_fired = fired.clone();
        let engine = Engine::new(config)
            .unwrap()
            .with_alert_sink(Arc::new(move |alert: &AlertEvent| {
                sink_fired.lock().push(alert.clone());
            }));
        (engine, fired)
    }

    fn reading(fill: f64, offset_secs: i64) -> LiveReading {
        LiveReading::fill_level("SB01", fill, Utc::now() + ChronoDuration::seconds(offset_secs))
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    struct FailingFeed;

    #[async_trait]
    impl LiveFeed for FailingFeed {
        fn name(&self) -> &str {
            "failing"
        }

        async fn subscribe(&mut self) -> TelemetryResult<FeedSubscription> {
            Err(TelemetryError::FeedUnavailable("broker unreachable".into()))
        }
    }

    #[test]
    fn test_capacity_alert_fires_once_per_crossing() {
        let (engine, fired) = collecting_engine(config());

        for (i, fill) in [50.0, 70.0, 95.0, 85.0, 95.0].into_iter().enumerate() {
            engine.ingest(&reading(fill, i as i64 + 1)).unwrap();
        }

        let fired = fired.lock();
        assert_eq!(fired.len(), 2);
        assert!(fired.iter().all(|a| a.kind == AlertKind::Capacity && a.value == 95.0));
    }

    #[test]
    fn test_muted_crossing_is_not_replayed() {
        let (engine, fired) = collecting_engine(config());

        engine.set_alerts_enabled(false);
        engine.ingest(&reading(95.0, 1)).unwrap();
        assert_eq!(engine.alert_state("SB01", AlertKind::Capacity), AlertState::Firing);

        engine.set_alerts_enabled(true);
        engine.ingest(&reading(96.0, 2)).unwrap();
        assert!(fired.lock().is_empty());

        engine.ingest(&reading(50.0, 3)).unwrap();
        engine.ingest(&reading(92.0, 4)).unwrap();
        assert_eq!(fired.lock().len(), 1);
    }

    #[test]
    fn test_bin_starting_above_threshold_does_not_fire() {
        let mut config = config();
        config.bins = vec![BinSpec::new("SB01", 97.0, 85.0, 2.5)];
        let (engine, fired) = collecting_engine(config);

        engine.ingest(&reading(98.0, 1)).unwrap();
        assert!(fired.lock().is_empty());
        assert_eq!(engine.alert_state("SB01", AlertKind::Capacity), AlertState::Firing);
    }

    #[test]
    fn test_reset_bin_rearms_capacity_alert() {
        let (engine, fired) = collecting_engine(config());
        engine.ingest(&reading(95.0, 1)).unwrap();
        assert_eq!(fired.lock().len(), 1);

        let snapshot = engine.reset_bin("SB01").unwrap();
        assert_eq!(snapshot.fill_level_percent, 0.0);
        assert_eq!(engine.alert_state("SB01", AlertKind::Capacity), AlertState::Quiet);
        assert!(engine.reset_bin("NOPE").is_err());

        let latest = engine.activity(1);
        assert_eq!(latest[0].level, ActivityLevel::Info);
        assert!(latest[0].message.contains("SB01"));
    }

    #[test]
    fn test_rejected_reading_is_logged_and_state_kept() {
        let engine = Engine::new(config()).unwrap();
        let before = engine.snapshot("SB01").unwrap();

        let bad = reading(f64::NAN, 1);
        assert!(engine.ingest(&bad).unwrap_err().is_invalid_reading());
        assert_eq!(engine.snapshot("SB01").unwrap(), before);
        assert_eq!(engine.activity(1)[0].level, ActivityLevel::Warning);
    }

    #[test]
    fn test_status_label_follows_auto_refresh() {
        let mut config = config();
        config.monitor.tick_interval_ms = 5000;
        let engine = Engine::new(config).unwrap();

        assert_eq!(engine.status().update_interval_label(), "5s");
        engine.set_auto_refresh(false);
        assert_eq!(engine.status().update_interval_label(), "Manual");
        assert!(!engine.status().running);
    }

    #[tokio::test]
    async fn test_auto_refresh_off_freezes_bins_until_manual_refresh() {
        let mut config = config();
        config.monitor.auto_refresh = false;
        let engine = Engine::new(config).unwrap();
        engine.start().await.unwrap();

        let before = engine.snapshot("SB01").unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let idle = engine.snapshot("SB01").unwrap();
        assert_eq!(idle.sequence, before.sequence);
        assert_eq!(idle.last_updated, before.last_updated);

        let refreshed = engine.manual_refresh();
        assert_eq!(refreshed[0].sequence, before.sequence + 1);

        engine.stop().await.unwrap();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_auto_refresh_ticks_and_publishes_snapshots() {
        let engine = Engine::new(config()).unwrap();
        let mut snapshots = engine.subscribe_snapshots();
        engine.start().await.unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(1), snapshots.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.bin_id, "SB01");
        assert_eq!(snapshot.source, crate::bins::UpdateSource::Simulated);

        engine.stop().await.unwrap();
        assert!(engine.status().ticks > 0);
    }

    #[tokio::test]
    async fn test_channel_feed_drives_fill_level() {
        let (feed, handle) = ChannelFeed::new(16);
        let engine = Engine::new(config()).unwrap().with_feed(Box::new(feed));
        engine.start().await.unwrap();

        wait_for(|| engine.feed_status() == FeedStatus::Live).await;
        assert!(handle.push(reading(42.0, 1)).await);
        wait_for(|| engine.snapshot("SB01").map(|s| s.fill_level_percent) == Some(42.0)).await;

        engine.stop().await.unwrap();
        assert!(handle.is_cancelled());
        assert_eq!(engine.feed_status(), FeedStatus::Disabled);
    }

    #[tokio::test]
    async fn test_closed_feed_reports_unavailable_while_running() {
        let (feed, handle) = ChannelFeed::new(16);
        let engine = Engine::new(config()).unwrap().with_feed(Box::new(feed));
        engine.start().await.unwrap();
        wait_for(|| engine.feed_status() == FeedStatus::Live).await;

        drop(handle);
        wait_for(|| engine.feed_status() == FeedStatus::Unavailable).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.is_running());
        assert_eq!(engine.feed_status(), FeedStatus::Unavailable);
        assert_eq!(engine.status().feed.to_string(), "Offline (simulated)");

        // simulation owns the fill level again
        let before = engine.snapshot("SB01").unwrap();
        wait_for(|| {
            engine.snapshot("SB01").map(|s| s.fill_level_percent) != Some(before.fill_level_percent)
        })
        .await;

        engine.stop().await.unwrap();
        assert_eq!(engine.feed_status(), FeedStatus::Disabled);
    }

    #[test]
    fn test_reading_sampled_before_refresh_is_applied() {
        let engine = Engine::new(config()).unwrap();
        let t0 = Utc::now() - ChronoDuration::seconds(10);

        engine
            .ingest(&LiveReading::fill_level("SB01", 55.0, t0))
            .unwrap();
        engine.manual_refresh();

        let late = LiveReading::fill_level("SB01", 95.0, t0 + ChronoDuration::seconds(4));
        assert_eq!(engine.ingest(&late).unwrap().fill_level_percent, 95.0);
        assert_eq!(engine.alert_state("SB01", AlertKind::Capacity), AlertState::Firing);
    }

    #[test]
    fn test_future_dated_reading_is_discarded() {
        let engine = Engine::new(config()).unwrap();
        let before = engine.snapshot("SB01").unwrap();

        let future = reading(99.0, 3600);
        assert!(engine.ingest(&future).unwrap_err().is_invalid_reading());
        assert_eq!(engine.snapshot("SB01").unwrap(), before);

        assert_eq!(engine.ingest(&reading(70.0, 0)).unwrap().fill_level_percent, 70.0);
    }

    #[tokio::test]
    async fn test_failed_subscription_falls_back_to_simulation() {
        let engine = Engine::new(config()).unwrap().with_feed(Box::new(FailingFeed));
        engine.start().await.unwrap();

        assert_eq!(engine.feed_status(), FeedStatus::Unavailable);
        let before = engine.snapshot("SB01").unwrap();
        wait_for(|| engine.snapshot("SB01").map(|s| s.sequence) > Some(before.sequence + 2)).await;

        engine.stop().await.unwrap();
    }
}
