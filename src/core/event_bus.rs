// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Event bus for the presentation layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use super::activity::ActivityEntry;
use crate::alerts::AlertEvent;
use crate::bins::BinSnapshot;
use crate::feed::FeedStatus;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Snapshot,
    Alert,
    FeedStatus,
    Activity,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Snapshot(BinSnapshot),
    Alert(AlertEvent),
    FeedStatus(FeedStatus),
    Activity(ActivityEntry),
}

/// Central event bus for pub/sub communication.
///
/// Publishing never blocks; with no subscribers events are simply dropped.
pub struct EventBus {
    snapshot_tx: broadcast::Sender<BinSnapshot>,
    alert_tx: broadcast::Sender<AlertEvent>,
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (snapshot_tx, _) = broadcast::channel(capacity);
        let (alert_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            snapshot_tx,
            alert_tx,
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_snapshot(&self, snapshot: BinSnapshot) {
        let _ = self.snapshot_tx.send(snapshot.clone());
        self.publish_event(EventType::Snapshot, EventPayload::Snapshot(snapshot));
    }

    pub fn publish_alert(&self, alert: AlertEvent) {
        let _ = self.alert_tx.send(alert.clone());
        self.publish_event(EventType::Alert, EventPayload::Alert(alert));
    }

    pub fn publish_feed_status(&self, status: FeedStatus) {
        self.publish_event(EventType::FeedStatus, EventPayload::FeedStatus(status));
    }

    pub fn publish_activity(&self, entry: ActivityEntry) {
        self.publish_event(EventType::Activity, EventPayload::Activity(entry));
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<BinSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertEvent> {
        self.alert_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}
