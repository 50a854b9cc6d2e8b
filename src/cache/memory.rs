//! Process-local fast cache.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;

use super::store::{CacheError, FastCache};

/// Cap for TTLs that would overflow the clock.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn expiring(value: &str, now: Instant, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE),
        }
    }

    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// [`FastCache`] backed by a concurrent map. Expiry follows the tokio clock, so paused-time tests
/// can age entries deterministically.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFastCache {
    slots: Arc<DashMap<String, Slot>>,
}

impl InMemoryFastCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.iter().filter(|slot| slot.live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(&self, key: &str) -> Option<Slot> {
        let now = Instant::now();
        let slot = self.slots.get(key)?.clone();
        if slot.live(now) {
            Some(slot)
        } else {
            self.slots.remove_if(key, |_, slot| !slot.live(now));
            None
        }
    }
}

#[async_trait]
impl FastCache for InMemoryFastCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.live_value(key).map(|slot| slot.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            self.slots.remove(key);
            return Ok(());
        }
        self.slots
            .insert(key.to_string(), Slot::expiring(value, Instant::now(), ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        if ttl.is_zero() {
            return Ok(false);
        }
        let now = Instant::now();
        let slot = Slot::expiring(value, now, ttl);
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().live(now) {
                    Ok(false)
                } else {
                    occupied.insert(slot);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.live_value(key).is_some())
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        Ok(self
            .live_value(key)
            .map(|slot| slot.expires_at.saturating_duration_since(Instant::now())))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.slots.remove(key);
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let removed = self
            .slots
            .remove_if(key, |_, slot| slot.live(now) && slot.value == expected);
        Ok(removed.is_some())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
