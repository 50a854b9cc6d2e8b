//! Validator metadata stored beside every durable record.

use std::time::Duration;

use time::OffsetDateTime;

/// Conditional-request validators and the expiry derived from the upstream freshness lifetime.
///
/// `expires_at` is only ever computed from a fetch (`now + ttl`); it is not extended by readers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetadata {
    pub entity_tag: Option<String>,
    pub last_modified: Option<OffsetDateTime>,
    pub expires_at: Option<OffsetDateTime>,
}

impl CacheMetadata {
    /// Validity left at `now`, or `None` once expired (or when no expiry is known).
    pub fn remaining(&self, now: OffsetDateTime) -> Option<Duration> {
        let expires_at = self.expires_at?;
        if expires_at <= now {
            return None;
        }
        Duration::try_from(expires_at - now).ok()
    }

    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        self.remaining(now).is_some()
    }

    /// Metadata after a not-modified answer: new validators win, stored ones fill the gaps.
    pub fn revalidated(
        &self,
        entity_tag: Option<String>,
        last_modified: Option<OffsetDateTime>,
        expires_at: OffsetDateTime,
    ) -> Self {
        Self {
            entity_tag: entity_tag.or_else(|| self.entity_tag.clone()),
            last_modified: last_modified.or(self.last_modified),
            expires_at: Some(expires_at),
        }
    }
}
