//! Lumen response caching layer
//!
//! In-memory cache for API responses with:
//! - TTL-based expiry with lazy deletion on read
//! - Tag-indexed invalidation for grouped removal
//! - Hit/miss statistics and approximate size accounting
//! - Bounded size with oldest-first eviction
//! - Snapshot export/import (malformed entries are skipped, not fatal)
//!
//! A separate strict-LRU primitive ([`LruMap`]) is exposed for callers that
//! want recency-based eviction. The response cache itself evicts by creation
//! age, not recency of access; the two policies are intentionally distinct.

mod lru_map;
mod stats;

pub use lru_map::LruMap;
pub use stats::CacheStats;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Reserved key prefix for tag index entries.
pub const TAG_KEY_PREFIX: &str = "tag:";

/// Tag index entries outlive any payload TTL so a live tag is never swept
/// out from under its keys. Dangling references the other way are tolerated.
const TAG_ENTRY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct Entry {
    payload: String,
    expires_at: Instant,
    /// Monotonic insertion sequence, used as the age order for eviction.
    seq: u64,
}

impl Entry {
    fn size(&self, key: &str) -> usize {
        key.len() + self.payload.len()
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
    total_size: usize,
    hit_count: u64,
    miss_count: u64,
}

/// TTL-keyed response cache with tag invalidation.
///
/// All operations are synchronous and infallible for normal use; every
/// mutating operation recomputes the aggregate stats. Shared access is
/// serialized through a single lock, so concurrent writes to the same key
/// are last-write-wins and never torn.
pub struct ResponseCache {
    inner: RwLock<Inner>,
    default_ttl: Duration,
    max_items: usize,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    key: String,
    payload: String,
    ttl_ms: u64,
}

impl ResponseCache {
    pub fn new(default_ttl: Duration, max_items: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
                total_size: 0,
                hit_count: 0,
                miss_count: 0,
            }),
            default_ttl,
            max_items: max_items.max(1),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a value from the cache.
    ///
    /// Returns `None` and counts a miss if the key is unknown or expired.
    /// Expired entries are lazily deleted on read.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.write();
        let now = Instant::now();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.miss_count += 1;
                debug!(key = %key, "cache miss");
                return None;
            }
        };

        if expired {
            Self::remove_entry(&mut inner, key);
            inner.miss_count += 1;
            debug!(key = %key, "cache entry expired");
            return None;
        }

        let payload = &inner.entries[key].payload;
        match serde_json::from_str::<T>(payload) {
            Ok(value) => {
                inner.hit_count += 1;
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache deserialization failed");
                // Corrupted entries are dropped rather than surfaced
                Self::remove_entry(&mut inner, key);
                inner.miss_count += 1;
                None
            }
        }
    }

    /// Set a value with an explicit TTL, overwriting any existing entry.
    ///
    /// Triggers a [`cleanup`](Self::cleanup) sweep if the item count exceeds
    /// the configured bound.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "cache serialization failed, entry skipped");
                return;
            }
        };

        let mut inner = self.inner.write();
        Self::insert_raw(&mut inner, key, payload, ttl);
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache set");

        if inner.entries.len() > self.max_items {
            self.cleanup_locked(&mut inner);
        }
    }

    /// Set a value with the default TTL.
    pub fn set_default<T: Serialize>(&self, key: &str, value: &T) {
        self.set(key, value, self.default_ttl);
    }

    /// Remove a key. Idempotent; returns whether an entry was deleted.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        let removed = Self::remove_entry(&mut inner, key);
        if removed {
            debug!(key = %key, "cache remove");
        }
        removed
    }

    /// Set a value and index it under the given tags.
    ///
    /// Each tag's key list is itself a cache entry under [`TAG_KEY_PREFIX`].
    /// Tag bookkeeping does not touch the hit/miss counters.
    pub fn set_with_tags<T: Serialize>(&self, key: &str, value: &T, tags: &[&str], ttl: Duration) {
        self.set(key, value, ttl);

        let mut inner = self.inner.write();
        let now = Instant::now();
        for tag in tags {
            let tag_key = format!("{TAG_KEY_PREFIX}{tag}");
            let mut keys: Vec<String> = inner
                .entries
                .get(&tag_key)
                .filter(|entry| !entry.is_expired(now))
                .and_then(|entry| serde_json::from_str(&entry.payload).ok())
                .unwrap_or_default();
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
            match serde_json::to_string(&keys) {
                Ok(payload) => Self::insert_raw(&mut inner, &tag_key, payload, TAG_ENTRY_TTL),
                Err(e) => warn!(tag = %tag, error = %e, "tag index serialization failed"),
            }
        }
    }

    /// Remove every key indexed under `tag`, then the tag entry itself.
    ///
    /// Keys that no longer exist are skipped; stale references are tolerated.
    pub fn invalidate_tag(&self, tag: &str) {
        let tag_key = format!("{TAG_KEY_PREFIX}{tag}");
        let mut inner = self.inner.write();

        // The key list must be read before the tag entry is deleted.
        let keys: Vec<String> = inner
            .entries
            .get(&tag_key)
            .and_then(|entry| serde_json::from_str(&entry.payload).ok())
            .unwrap_or_default();

        let mut removed = 0usize;
        for key in &keys {
            if Self::remove_entry(&mut inner, key) {
                removed += 1;
            }
        }
        Self::remove_entry(&mut inner, &tag_key);
        debug!(tag = %tag, removed, "cache tag invalidated");
    }

    /// Two-phase sweep: delete expired entries, then, if still above the
    /// item bound, delete the oldest-by-creation entries among the survivors.
    ///
    /// This is age-based removal, not LRU; callers wanting recency-based
    /// eviction should use [`LruMap`].
    pub fn cleanup(&self) {
        let mut inner = self.inner.write();
        self.cleanup_locked(&mut inner);
    }

    /// Drop all entries. The hit/miss counters stay monotonic.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.total_size = 0;
        debug!("cache cleared");
    }

    /// Current aggregate statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            total_items: inner.entries.len(),
            total_size: inner.total_size,
            hit_count: inner.hit_count,
            miss_count: inner.miss_count,
        }
    }

    /// Export all live entries as a JSON snapshot with remaining TTLs.
    pub fn export(&self) -> String {
        let inner = self.inner.read();
        let now = Instant::now();
        let snapshot: Vec<SnapshotEntry> = inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| SnapshotEntry {
                key: key.clone(),
                payload: entry.payload.clone(),
                ttl_ms: entry.expires_at.saturating_duration_since(now).as_millis() as u64,
            })
            .collect();
        // Serializing plain structs cannot fail
        serde_json::to_string(&snapshot).unwrap_or_else(|_| "[]".to_string())
    }

    /// Import a snapshot produced by [`export`](Self::export).
    ///
    /// Malformed entries are skipped per-entry rather than aborting the
    /// whole import. Returns the number of entries restored.
    pub fn import(&self, data: &str) -> usize {
        let items: Vec<serde_json::Value> = match serde_json::from_str(data) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "cache import rejected, not a JSON array");
                return 0;
            }
        };

        let mut imported = 0usize;
        let mut inner = self.inner.write();
        for item in items {
            match serde_json::from_value::<SnapshotEntry>(item) {
                Ok(entry) if entry.ttl_ms > 0 => {
                    Self::insert_raw(
                        &mut inner,
                        &entry.key,
                        entry.payload,
                        Duration::from_millis(entry.ttl_ms),
                    );
                    imported += 1;
                }
                Ok(entry) => {
                    debug!(key = %entry.key, "cache import skipped expired entry");
                }
                Err(e) => {
                    warn!(error = %e, "cache import skipped malformed entry");
                }
            }
        }
        if inner.entries.len() > self.max_items {
            self.cleanup_locked(&mut inner);
        }
        imported
    }

    fn insert_raw(inner: &mut Inner, key: &str, payload: String, ttl: Duration) {
        let now = Instant::now();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let entry = Entry {
            payload,
            expires_at: now + ttl.max(Duration::from_millis(1)),
            seq,
        };
        let added = entry.size(key);
        if let Some(previous) = inner.entries.insert(key.to_string(), entry) {
            inner.total_size -= previous.size(key);
        }
        inner.total_size += added;
    }

    fn remove_entry(inner: &mut Inner, key: &str) -> bool {
        match inner.entries.remove(key) {
            Some(entry) => {
                inner.total_size -= entry.size(key);
                true
            }
            None => false,
        }
    }

    fn cleanup_locked(&self, inner: &mut Inner) {
        let now = Instant::now();

        // Phase 1: drop everything past its TTL.
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            Self::remove_entry(inner, key);
        }

        // Phase 2: oldest-created entries go first until at the bound.
        if inner.entries.len() > self.max_items {
            let mut by_age: Vec<(u64, String)> = inner
                .entries
                .iter()
                .map(|(key, entry)| (entry.seq, key.clone()))
                .collect();
            by_age.sort_unstable_by_key(|(seq, _)| *seq);

            let excess = inner.entries.len() - self.max_items;
            for (_, key) in by_age.into_iter().take(excess) {
                Self::remove_entry(inner, &key);
            }
        }

        debug!(
            expired = expired.len(),
            remaining = inner.entries.len(),
            "cache cleanup"
        );
    }
}
