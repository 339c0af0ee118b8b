//! Live-update overlay merged onto REST snapshots at render time.
//!
//! An overlay is a sparse map of record key to partial fields received over
//! the push connection. Reads never mutate the base snapshot: a merged view is
//! produced by shallow-replacing the base fields covered by the latest entry.

use crate::protocol::PushMessage;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

pub trait LiveResource: Clone {
    type Key: Eq + Hash + Clone + Debug;
    type Patch: Clone + Debug;

    fn key(&self) -> Self::Key;

    /// Returns a copy of `self` with every field set in `patch` replaced.
    fn apply_patch(&self, patch: &Self::Patch) -> Self;

    /// Extracts the key and partial fields when `message` targets this resource.
    fn patch_from(message: &PushMessage) -> Option<(Self::Key, Self::Patch)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateOrdering {
    /// Apply in arrival order; the last write wins.
    #[default]
    Arrival,
    /// Drop an update older than the entry already stored for its key.
    /// Updates without a timestamp always apply.
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied,
    Stale,
    Ignored,
}

#[derive(Debug, Clone)]
struct OverlayEntry<P> {
    patch: P,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Overlay<R: LiveResource> {
    ordering: UpdateOrdering,
    entries: HashMap<R::Key, OverlayEntry<R::Patch>>,
}

impl<R: LiveResource> Default for Overlay<R> {
    fn default() -> Self {
        Self::new(UpdateOrdering::default())
    }
}

impl<R: LiveResource> Overlay<R> {
    pub fn new(ordering: UpdateOrdering) -> Self {
        Self {
            ordering,
            entries: HashMap::new(),
        }
    }

    pub fn ordering(&self) -> UpdateOrdering {
        self.ordering
    }

    pub fn ingest(&mut self, message: &PushMessage) -> IngestOutcome {
        match R::patch_from(message) {
            Some((key, patch)) => self.upsert(key, patch, message.timestamp()),
            None => IngestOutcome::Ignored,
        }
    }

    /// Stores `patch` for `key`, replacing any previous entry wholesale.
    pub fn upsert(
        &mut self,
        key: R::Key,
        patch: R::Patch,
        timestamp: Option<DateTime<Utc>>,
    ) -> IngestOutcome {
        if self.ordering == UpdateOrdering::Timestamp {
            let stored = self.entries.get(&key).and_then(|entry| entry.timestamp);
            if let (Some(stored), Some(incoming)) = (stored, timestamp) {
                if incoming < stored {
                    return IngestOutcome::Stale;
                }
            }
        }
        self.entries.insert(key, OverlayEntry { patch, timestamp });
        IngestOutcome::Applied
    }

    pub fn get(&self, key: &R::Key) -> Option<&R::Patch> {
        self.entries.get(key).map(|entry| &entry.patch)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn merged<'a>(&self, base: &'a R) -> Cow<'a, R> {
        match self.entries.get(&base.key()) {
            Some(entry) => Cow::Owned(base.apply_patch(&entry.patch)),
            None => Cow::Borrowed(base),
        }
    }

    pub fn merge_all(&self, base: &[R]) -> Vec<R> {
        base.iter()
            .map(|record| self.merged(record).into_owned())
            .collect()
    }
}
