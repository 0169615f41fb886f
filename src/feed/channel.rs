// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! In-process live feed backed by a tokio channel

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::{FeedMessage, FeedStatus, FeedSubscription, LiveFeed, LiveReading};
use crate::error::{TelemetryError, TelemetryResult};

/// Live feed whose readings are pushed from the same process.
///
/// Used by demos and tests, and by embedders that already have readings
/// in hand (e.g. a gateway receiving them over its own transport).
pub struct ChannelFeed {
    receiver: Option<mpsc::Receiver<FeedMessage>>,
    // Announces the feed as live on subscribe, then dropped
    announce: Option<mpsc::Sender<FeedMessage>>,
    cancelled: Arc<AtomicBool>,
}

/// Producer side of a [`ChannelFeed`]
#[derive(Clone)]
pub struct FeedHandle {
    sender: mpsc::Sender<FeedMessage>,
    cancelled: Arc<AtomicBool>,
}

impl ChannelFeed {
    pub fn new(capacity: usize) -> (Self, FeedHandle) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let cancelled = Arc::new(AtomicBool::new(false));

        (
            Self {
                receiver: Some(receiver),
                announce: Some(sender.clone()),
                cancelled: cancelled.clone(),
            },
            FeedHandle { sender, cancelled },
        )
    }
}

#[async_trait]
impl LiveFeed for ChannelFeed {
    fn name(&self) -> &str {
        "channel"
    }

    async fn subscribe(&mut self) -> TelemetryResult<FeedSubscription> {
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| TelemetryError::FeedUnavailable("channel feed already subscribed".into()))?;

        if let Some(announce) = self.announce.take() {
            let _ = announce.try_send(FeedMessage::Status(FeedStatus::Live));
        }

        let cancelled = self.cancelled.clone();
        Ok(FeedSubscription::new(receiver, move || {
            cancelled.store(true, Ordering::SeqCst);
            debug!("Channel feed subscription cancelled");
        }))
    }
}

impl FeedHandle {
    /// Push a reading. Returns false once the subscriber is gone.
    pub async fn push(&self, reading: LiveReading) -> bool {
        self.send(FeedMessage::Reading(reading)).await
    }

    /// Push a raw JSON payload, decoding it the way a network feed would
    pub async fn push_json(&self, payload: &[u8]) -> bool {
        let message = match LiveReading::from_json(payload) {
            Ok(reading) => FeedMessage::Reading(reading),
            Err(e) => FeedMessage::Rejected(e),
        };
        self.send(message).await
    }

    /// Report a connection state change
    pub async fn set_status(&self, status: FeedStatus) -> bool {
        self.send(FeedMessage::Status(status)).await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn send(&self, message: FeedMessage) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.sender.send(message).await.is_ok()
    }
}
