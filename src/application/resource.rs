//! Capability contract that plugs one resource kind into the cache-aside engine.

use std::{fmt::Display, time::Duration};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use time::OffsetDateTime;

use crate::{
    application::repos::RepoError,
    domain::{cache_meta::CacheMetadata, error::DomainError},
    infra::upstream::UpstreamError,
};

/// Upstream answer in resource terms. `payload` is `None` when the upstream said "not modified".
#[derive(Debug, Clone)]
pub struct Fetched<P> {
    pub payload: Option<P>,
    pub entity_tag: Option<String>,
    pub last_modified: Option<OffsetDateTime>,
    /// Freshness lifetime computed from the response headers, if they allowed one.
    pub ttl: Option<Duration>,
}

#[async_trait]
pub trait CachedResource: Send + Sync + 'static {
    type Key: Display + Clone + Send + Sync + 'static;
    /// Durable row including its [`CacheMetadata`].
    type Record: Send + Sync + 'static;
    /// Upstream payload.
    type Payload: Send + Sync + 'static;
    /// Client-facing shape; this is what the fast cache stores.
    type View: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Short name used as the cache-key base, the log field and the metric label.
    fn kind(&self) -> &'static str;

    /// Validate the raw key before any tier is consulted.
    fn parse_key(&self, raw: &str) -> Result<Self::Key, DomainError>;

    async fn read_durable(&self, key: &Self::Key) -> Result<Option<Self::Record>, RepoError>;

    fn durable_meta<'a>(&self, record: &'a Self::Record) -> &'a CacheMetadata;

    async fn upsert_on_success(
        &self,
        key: &Self::Key,
        payload: &Self::Payload,
        meta: &CacheMetadata,
    ) -> Result<Self::Record, RepoError>;

    /// Persist refreshed validators after a 304. Kinds without metadata columns keep the default.
    async fn bump_on_not_modified(
        &self,
        _key: &Self::Key,
        _meta: &CacheMetadata,
    ) -> Result<(), RepoError> {
        Ok(())
    }

    async fn fetch_upstream(
        &self,
        key: &Self::Key,
        entity_tag: Option<&str>,
    ) -> Result<Fetched<Self::Payload>, UpstreamError>;

    fn to_view(&self, key: &Self::Key, record: &Self::Record) -> Self::View;
}
