//! Fast-cache key layout.
//!
//! Payload keys carry the cache version and the upstream compatibility date, so entries written
//! under an older contract are never read. Lock keys carry neither: deployments on different
//! versions share one lock per resource.

/// Namespacing components shared by every resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    version: String,
    compatibility_date: String,
}

/// The four keys the cache-aside flow touches for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKeys {
    pub payload: String,
    pub entity_tag: String,
    pub fresh: String,
    pub lock: String,
}

impl CacheKeys {
    pub fn new(version: impl Into<String>, compatibility_date: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            compatibility_date: compatibility_date.into(),
        }
    }

    pub fn resource(&self, key_base: &str, id: &str) -> ResourceKeys {
        let payload = format!(
            "{key_base}:{}:{}:{id}",
            self.version, self.compatibility_date
        );
        ResourceKeys {
            entity_tag: format!("{payload}:etag"),
            fresh: format!("{payload}:fresh"),
            lock: format!("lock:{key_base}:{id}"),
            payload,
        }
    }
}
