//! Fast-cache contract.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("fast cache transport error: {0}")]
    Transport(String),
}

impl CacheError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Low-latency string store with per-entry expiry.
///
/// A zero `ttl` passed to [`FastCache::set`] removes the entry; entries never outlive their TTL.
#[async_trait]
pub trait FastCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Atomically store `value` only when `key` is absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Remaining lifetime, or `None` when the key is absent or has no expiry.
    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete `key` only while it still holds `expected`. Returns whether it was deleted.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}
