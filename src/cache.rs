//! Process-wide cache for rendered pages.
//!
//! Entries expire after a fixed TTL or when `clear` is called. Writes to the
//! store never touch the cache, so a page may be stale for up to one TTL.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

struct CachedPage {
    body: String,
    stored_at: Instant,
}

pub struct PageCache {
    entries: DashMap<String, CachedPage>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        PageCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) if now.duration_since(entry.stored_at) < self.ttl => {
                return Some(entry.body.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries
                .remove_if(key, |_, entry| now.duration_since(entry.stored_at) >= self.ttl);
            debug!(key, "cached page expired");
        }
        None
    }

    /// Stores `body` and drops every entry that has outlived the TTL.
    pub fn set<K: Into<String>>(&self, key: K, body: String) {
        self.set_at(key, body, Instant::now());
    }

    fn set_at<K: Into<String>>(&self, key: K, body: String, now: Instant) {
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.stored_at) < self.ttl);
        self.entries.insert(
            key.into(),
            CachedPage {
                body,
                stored_at: now,
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
        debug!("page cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
