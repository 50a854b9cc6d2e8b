//! Fast-cache tier.
//!
//! - [`FastCache`]: the key-value contract the cache-aside engine needs (Redis in production,
//!   [`InMemoryFastCache`] in tests and single-process setups).
//! - [`CacheKeys`]: key layout for payloads, validators, freshness markers and locks.
//! - [`RevalidationLock`]: per-key single-flight token built on `set_if_absent`.
//! - [`CachePolicy`]: freshness window, fallback lifetime and lock lifetime.
//!
//! ```toml
//! [cache]
//! version = "v1"
//! character_fresh_seconds = 600
//! lock_ttl_seconds = 15
//! min_payload_ttl_seconds = 60
//! ```

mod config;
mod keys;
mod memory;
mod revalidation;
mod store;

pub use config::CachePolicy;
pub use keys::{CacheKeys, ResourceKeys};
pub use memory::InMemoryFastCache;
pub use revalidation::{LockTicket, RevalidationLock};
pub use store::{CacheError, FastCache};
