//! In-process counter store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::store::{CounterStore, StoreError};
use crate::clock::Clock;

/// One live counter.
#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    expire_at: u64,
}

impl Slot {
    fn is_expired(&self, now: u64) -> bool {
        self.expire_at <= now
    }
}

/// Counter store held in process memory.
///
/// Each increment runs while holding the map's shard lock for that key, so
/// increments on one key are linearizable. Expired counters are treated as
/// absent and reclaimed by [`MemoryStore::purge_expired`].
#[derive(Debug)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
        }
    }

    /// Current count for `key`, or `None` if it is absent or expired.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_secs();
        self.slots
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.count)
    }

    /// Absolute expiry of `key`, if it is live.
    pub fn expiry(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_secs();
        self.slots
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.expire_at)
    }

    /// Drop every expired counter. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(now));
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            debug!(removed, remaining = self.slots.len(), "Purged expired counters");
        }
        removed
    }

    /// Number of stored counters, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_and_expire(&self, key: &str, expire_at: u64) -> Result<u64, StoreError> {
        let now = self.clock.now_secs();
        let mut slot = self.slots.entry(key.to_string()).or_insert(Slot {
            count: 0,
            expire_at: 0,
        });

        if slot.is_expired(now) {
            slot.count = 0;
        }
        slot.count += 1;
        slot.expire_at = expire_at;

        trace!(key, count = slot.count, expire_at, "Incremented counter");
        Ok(slot.count)
    }
}
