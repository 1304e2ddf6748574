//! Request lineage tracking
//!
//! The lineage tracker is a process-scoped, in-memory index from request
//! fingerprint to the row id the request was assigned, with a secondary
//! URL index used to resolve a child request's parent. The crawler only
//! knows the *URL* it followed a link from; this index turns that URL into
//! the storage-level parent id without a database round trip.
//!
//! The index is rebuilt from scratch on every run and never persisted.
//! Retention is capped: once the configured capacity is reached, the oldest
//! registrations are evicted first, so memory stays bounded on very long
//! crawls at the cost of losing lineage for links pointing far back in time.

use std::collections::{HashMap, VecDeque};

/// One registered request: its assigned row id and its URL
#[derive(Debug, Clone)]
struct LineageEntry {
    id: i64,
    url: String,
}

/// In-memory fingerprint -> (assigned id, URL) index with capped retention
#[derive(Debug)]
pub struct LineageTracker {
    capacity: usize,
    /// Fingerprint -> latest registration
    entries: HashMap<String, LineageEntry>,
    /// URL -> most recently registered id for that URL (last write wins)
    by_url: HashMap<String, i64>,
    /// Registration order, used for oldest-first eviction. Entries whose id
    /// no longer matches the live registration are stale and skipped.
    order: VecDeque<(String, i64)>,
}

impl LineageTracker {
    /// Creates a tracker retaining at most `capacity` registrations
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            by_url: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Registers a request under its fingerprint
    ///
    /// Re-registering a fingerprint (a revisited page) overwrites the old
    /// entry; resolution is last-write-wins by registration order, not by
    /// timestamp.
    pub fn register(&mut self, fingerprint: &str, url: &str, id: i64) {
        self.entries.insert(
            fingerprint.to_string(),
            LineageEntry {
                id,
                url: url.to_string(),
            },
        );
        self.by_url.insert(url.to_string(), id);
        self.order.push_back((fingerprint.to_string(), id));
        self.evict_to_capacity();
        self.compact_order();
    }

    /// Resolves a child request's parent to an assigned row id
    ///
    /// Returns `None` when the parent URL is absent, unknown (e.g. a seed
    /// URL), or equal to the child's own URL (self-loops never resolve to
    /// the request itself). A missing parent is expected, not an error.
    pub fn resolve_parent(&self, child_url: &str, parent_url: Option<&str>) -> Option<i64> {
        let parent_url = parent_url.filter(|p| !p.is_empty() && *p != child_url)?;
        self.by_url.get(parent_url).copied()
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tracker holds no registrations
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_to_capacity(&mut self) {
        while self.entries.len() > self.capacity {
            let Some((fingerprint, id)) = self.order.pop_front() else {
                break;
            };

            // Stale order entry: the fingerprint was re-registered since.
            let live = match self.entries.get(&fingerprint) {
                Some(entry) if entry.id == id => entry.clone(),
                _ => continue,
            };

            self.entries.remove(&fingerprint);

            // Only drop the URL index entry if it still points at the
            // evicted registration.
            if self.by_url.get(&live.url) == Some(&live.id) {
                self.by_url.remove(&live.url);
            }
        }
    }

    /// Drops stale order slots once they outnumber live registrations
    ///
    /// Re-registering fingerprints leaves stale slots behind without
    /// growing `entries`, so eviction alone never reaches them. Compaction
    /// keeps the order queue at no more than twice the capacity.
    fn compact_order(&mut self) {
        if self.order.len() <= self.capacity.saturating_mul(2) {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(fingerprint, id)| matches!(entries.get(fingerprint), Some(e) if e.id == *id));
    }
}
