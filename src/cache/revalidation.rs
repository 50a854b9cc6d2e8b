//! Per-key single-flight token.

use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};
use uuid::Uuid;

use super::store::FastCache;

/// Proof that this request instance acquired a revalidation lock.
///
/// Only the holder of a ticket can release the lock; a request that did not acquire one has
/// nothing to hand to [`RevalidationLock::release`].
#[derive(Debug)]
#[must_use = "an acquired lock must be released"]
pub struct LockTicket {
    key: String,
    token: String,
}

impl LockTicket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Short-lived mutual exclusion on top of [`FastCache::set_if_absent`].
///
/// Locks self-expire after `ttl`, so a crashed holder delays revalidation at most that long.
#[derive(Clone)]
pub struct RevalidationLock {
    cache: Arc<dyn FastCache>,
    ttl: Duration,
}

impl RevalidationLock {
    pub fn new(cache: Arc<dyn FastCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Never blocks. A transport failure is reported as "not acquired".
    pub async fn try_acquire(&self, key: &str) -> Option<LockTicket> {
        let token = Uuid::new_v4().to_string();
        match self.cache.set_if_absent(key, &token, self.ttl).await {
            Ok(true) => {
                debug!(target: "esi_gateway::cache::lock", key, "revalidation lock acquired");
                Some(LockTicket {
                    key: key.to_string(),
                    token,
                })
            }
            Ok(false) => None,
            Err(err) => {
                warn!(
                    target: "esi_gateway::cache::lock",
                    op = "lock.acquire",
                    key,
                    error = %err,
                    "treating lock acquisition failure as busy"
                );
                None
            }
        }
    }

    /// Best effort; the lock expires on its own if the delete fails.
    ///
    /// Deletes only while the key still holds this ticket's token, so a holder that outlived the
    /// TTL never removes a lock someone else acquired since.
    pub async fn release(&self, ticket: LockTicket) {
        match self.cache.delete_if_eq(&ticket.key, &ticket.token).await {
            Ok(true) => {
                debug!(target: "esi_gateway::cache::lock", key = %ticket.key, "revalidation lock released");
            }
            Ok(false) => {
                warn!(
                    target: "esi_gateway::cache::lock",
                    op = "lock.release",
                    key = %ticket.key,
                    token = %ticket.token,
                    "revalidation lock expired before release"
                );
            }
            Err(err) => {
                warn!(
                    target: "esi_gateway::cache::lock",
                    op = "lock.release",
                    key = %ticket.key,
                    token = %ticket.token,
                    error = %err,
                    "failed to release revalidation lock"
                );
            }
        }
    }
}
