//! Cache lifetimes for one resource kind.

use std::time::Duration;

const DEFAULT_FRESH_SECS: u64 = 600;
const DEFAULT_FALLBACK_TTL_SECS: u64 = 86_400;
const DEFAULT_MIN_PAYLOAD_TTL_SECS: u64 = 60;
const DEFAULT_LOCK_TTL_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Lifetime of the freshness marker ("skip revalidation until").
    pub fresh: Duration,
    /// Payload lifetime when the upstream sends no usable cache headers.
    pub fallback_ttl: Duration,
    /// Floor for payload entries so short upstream lifetimes do not churn the fast cache.
    pub min_payload_ttl: Duration,
    pub lock_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            fresh: Duration::from_secs(DEFAULT_FRESH_SECS),
            fallback_ttl: Duration::from_secs(DEFAULT_FALLBACK_TTL_SECS),
            min_payload_ttl: Duration::from_secs(DEFAULT_MIN_PAYLOAD_TTL_SECS),
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
        }
    }
}

impl CachePolicy {
    pub fn payload_ttl(&self, lifetime: Duration) -> Duration {
        lifetime.max(self.min_payload_ttl)
    }

    /// The marker never outlives the data it vouches for.
    pub fn marker_ttl(&self, lifetime: Duration) -> Duration {
        self.fresh.min(lifetime)
    }
}
