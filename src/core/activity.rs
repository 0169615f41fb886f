// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Operator-facing activity log

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub level: ActivityLevel,
    pub message: String,
}

/// Bounded log of recent engine activity, newest last
pub struct ActivityLog {
    capacity: usize,
    inner: Mutex<ActivityInner>,
}

struct ActivityInner {
    entries: VecDeque<ActivityEntry>,
    next_id: u64,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(ActivityInner {
                entries: VecDeque::with_capacity(capacity),
                next_id: 1,
            }),
        }
    }

    pub fn record(&self, level: ActivityLevel, message: impl Into<String>) -> ActivityEntry {
        let mut inner = self.inner.lock();
        let entry = ActivityEntry {
            id: inner.next_id,
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };
        inner.next_id += 1;

        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry.clone());
        entry
    }

    /// Most recent entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        self.inner.lock().entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
