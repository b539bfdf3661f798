//! Short-lived idempotency cache
//!
//! Fast path only: a miss falls through to the durable check under the
//! chain lease.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::traits::EventRecord;

struct CacheInner {
    entries: HashMap<String, (Instant, EventRecord)>,
    /// Insertion order for capacity eviction
    order: VecDeque<(Instant, String)>,
}

/// TTL and capacity bounded map from idempotency key to committed record
pub struct IdempotencyCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    capacity: usize,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl,
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<EventRecord> {
        let mut inner = self.inner.lock().ok()?;
        match inner.entries.get(key) {
            Some((at, record)) if at.elapsed() < self.ttl => Some(record.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, record: &EventRecord) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let now = Instant::now();
        let key = record.idempotency_key.clone();
        inner.order.push_back((now, key.clone()));
        inner.entries.insert(key, (now, record.clone()));

        while inner.entries.len() > self.capacity || inner.order.len() > self.capacity * 2 {
            let Some((at, key)) = inner.order.pop_front() else {
                break;
            };
            // Skip order slots superseded by a later insert of the same key
            if inner.entries.get(&key).is_some_and(|(t, _)| *t == at) {
                inner.entries.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
