//! Query-embedding memo: least-recently-used eviction plus a time-to-live.
//!
//! Repeated questions skip the provider round trip. Defaults: 1000 entries, 1 hour.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Slot {
    vector: Vec<f32>,
    stored: Instant,
    /// Logical clock value of the last read or write.
    used: u64,
}

struct Slots {
    map: HashMap<String, Slot>,
    clock: u64,
}

/// Thread-safe cache of question text to query vector.
pub struct QueryCache {
    slots: Mutex<Slots>,
    capacity: usize,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots {
                map: HashMap::new(),
                clock: 0,
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn default_cache() -> Self {
        Self::new(1000, Duration::from_secs(3600))
    }

    /// Cached vector for `question`; expired entries are dropped on access.
    pub fn get(&self, question: &str) -> Option<Vec<f32>> {
        let mut slots = self.slots.lock();
        slots.clock += 1;
        let now = slots.clock;

        match slots.map.get_mut(question) {
            None => return None,
            Some(slot) if slot.stored.elapsed() < self.ttl => {
                slot.used = now;
                return Some(slot.vector.clone());
            }
            Some(_) => {}
        }
        slots.map.remove(question);
        None
    }

    pub fn put(&self, question: String, vector: Vec<f32>) {
        let mut slots = self.slots.lock();
        slots.clock += 1;
        let now = slots.clock;

        if !slots.map.contains_key(&question) && slots.map.len() >= self.capacity {
            let stalest = slots
                .map
                .iter()
                .min_by_key(|(_, s)| s.used)
                .map(|(k, _)| k.clone());
            if let Some(key) = stalest {
                slots.map.remove(&key);
            }
        }
        slots.map.insert(
            question,
            Slot {
                vector,
                stored: Instant::now(),
                used: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
