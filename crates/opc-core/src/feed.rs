use crate::model::LogEntry;
use crate::protocol::{MessageKind, PushMessage};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

pub const DEFAULT_FEED_CAPACITY: usize = 50;
pub const DEFAULT_LOG_TAIL_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub kind: MessageKind,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

/// Newest-first dashboard activity feed.
#[derive(Debug, Clone)]
pub struct ActivityFeed {
    capacity: usize,
    items: VecDeque<FeedItem>,
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }
}

impl ActivityFeed {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: VecDeque::new(),
        }
    }

    /// Records `message`, stamping it with `received_at` when it carries no timestamp.
    pub fn push(&mut self, message: &PushMessage, received_at: DateTime<Utc>) {
        self.items.push_front(FeedItem {
            kind: message.kind(),
            summary: message.summary(),
            timestamp: message.timestamp().unwrap_or(received_at),
        });
        self.items.truncate(self.capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Snapshot logs followed by streamed `log_entry` frames, oldest first.
#[derive(Debug, Clone)]
pub struct LogTail {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl Default for LogTail {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_TAIL_CAPACITY)
    }
}

impl LogTail {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Installs a fetched snapshot. Streamed entries the snapshot does not
    /// contain are kept unless they are older than everything in it.
    pub fn merge_snapshot(&mut self, snapshot: Vec<LogEntry>) {
        let oldest = snapshot.iter().map(|entry| entry.timestamp).min();
        let streamed: Vec<LogEntry> = self
            .entries
            .drain(..)
            .filter(|entry| oldest.map_or(true, |oldest| entry.timestamp >= oldest))
            .filter(|entry| !snapshot.iter().any(|known| same_entry(known, entry)))
            .collect();
        let mut merged = snapshot;
        merged.extend(streamed);
        merged.sort_by_key(|entry| entry.timestamp);
        self.entries = merged.into();
        self.trim();
    }

    pub fn ingest(&mut self, message: &PushMessage) -> bool {
        let PushMessage::LogEntry(entry) = message else {
            return false;
        };
        if let Some(id) = &entry.id {
            if self.entries.iter().any(|e| e.id.as_ref() == Some(id)) {
                return false;
            }
        }
        self.entries.push_back(entry.clone());
        self.trim();
        true
    }

    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn trim(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

fn same_entry(a: &LogEntry, b: &LogEntry) -> bool {
    match (&a.id, &b.id) {
        (Some(left), Some(right)) => left == right,
        _ => a == b,
    }
}
