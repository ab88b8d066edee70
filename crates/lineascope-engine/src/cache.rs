//! Bounded result cache for column traces
//!
//! Entries are never invalidated by a metadata rebuild. Callers that
//! rebuild and then query must call [`TraceCache::clear`] (or
//! `TraceEngine::clear_cache`) or they may read stale reports.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::report::TraceOutcome;

type CacheKey = (String, String);

struct CacheInner {
    map: HashMap<CacheKey, TraceOutcome>,
    /// Recency order, least recently used at the front
    order: VecDeque<CacheKey>,
}

/// Bounded least-recently-used cache keyed by `(target, column)`
///
/// One mutex guards both the map and the recency order, so lookup,
/// insert, and eviction are atomic with respect to concurrent callers.
pub struct TraceCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl TraceCache {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Look up a cached outcome, refreshing its recency
    pub fn get(&self, target: &str, column: &str) -> Option<TraceOutcome> {
        let key = (target.to_string(), column.to_string());
        let mut inner = self.inner.lock().ok()?;

        let outcome = inner.map.get(&key).cloned()?;
        if let Some(position) = inner.order.iter().position(|k| k == &key) {
            inner.order.remove(position);
        }
        inner.order.push_back(key);
        Some(outcome)
    }

    /// Insert an outcome, evicting the least recently used entry when full
    pub fn insert(&self, target: &str, column: &str, outcome: TraceOutcome) {
        let key = (target.to_string(), column.to_string());
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if inner.map.insert(key.clone(), outcome).is_some() {
            if let Some(position) = inner.order.iter().position(|k| k == &key) {
                inner.order.remove(position);
            }
        } else if inner.map.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.map.remove(&evicted);
            }
        }
        inner.order.push_back(key);
    }

    /// Drop every entry
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.map.clear();
            inner.order.clear();
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.map.len()).unwrap_or(0)
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TraceCache {
    /// Cache with the conventional capacity of 100 traces
    fn default() -> Self {
        Self::new(100)
    }
}
