//! In-memory doubles for exercising the cache-aside engine without Redis, Postgres or ESI.

#![allow(dead_code)]

pub mod app;

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use esi_gateway::{
    application::{
        cache_aside::CacheAside,
        repos::RepoError,
        resource::{CachedResource, Fetched},
    },
    cache::{CacheError, CacheKeys, CachePolicy, FastCache, InMemoryFastCache, ResourceKeys},
    domain::{cache_meta::CacheMetadata, error::DomainError},
    infra::upstream::UpstreamError,
    util::clock::{Clock, ManualClock},
};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, macros::datetime};

pub const KIND: &str = "widget";
pub const START: OffsetDateTime = datetime!(2025-10-01 12:00:00 UTC);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetView {
    pub id: u32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetRecord {
    pub id: u32,
    pub label: String,
    pub meta: CacheMetadata,
}

/// Scripted resource: upstream answers are popped in order; an empty script is a network error.
#[derive(Default)]
pub struct WidgetResource {
    pub durable: Mutex<HashMap<u32, WidgetRecord>>,
    pub script: Mutex<VecDeque<Result<Fetched<String>, UpstreamError>>>,
    pub upstream_delay: Option<Duration>,
    pub fail_durable_reads: bool,
    pub fail_upserts: bool,
    pub durable_reads: AtomicUsize,
    pub upstream_calls: AtomicUsize,
    pub upserts: AtomicUsize,
    pub bumps: AtomicUsize,
    pub seen_tags: Mutex<Vec<Option<String>>>,
}

impl WidgetResource {
    pub fn with_record(self, record: WidgetRecord) -> Self {
        self.durable
            .lock()
            .expect("durable lock")
            .insert(record.id, record);
        self
    }

    pub fn answering(self, answer: Result<Fetched<String>, UpstreamError>) -> Self {
        self.script.lock().expect("script lock").push_back(answer);
        self
    }

    pub fn record(&self, id: u32) -> Option<WidgetRecord> {
        self.durable.lock().expect("durable lock").get(&id).cloned()
    }

    pub fn upstream_calls(&self) -> usize {
        self.upstream_calls.load(Ordering::SeqCst)
    }

    pub fn durable_reads(&self) -> usize {
        self.durable_reads.load(Ordering::SeqCst)
    }

    pub fn seen_tags(&self) -> Vec<Option<String>> {
        self.seen_tags.lock().expect("tags lock").clone()
    }
}

pub fn fetched(label: &str, entity_tag: Option<&str>, ttl_secs: Option<u64>) -> Fetched<String> {
    Fetched {
        payload: Some(label.to_string()),
        entity_tag: entity_tag.map(str::to_string),
        last_modified: None,
        ttl: ttl_secs.map(Duration::from_secs),
    }
}

pub fn not_modified(entity_tag: Option<&str>, ttl_secs: Option<u64>) -> Fetched<String> {
    Fetched {
        payload: None,
        entity_tag: entity_tag.map(str::to_string),
        last_modified: None,
        ttl: ttl_secs.map(Duration::from_secs),
    }
}

pub fn record(
    id: u32,
    label: &str,
    entity_tag: Option<&str>,
    expires_at: OffsetDateTime,
) -> WidgetRecord {
    WidgetRecord {
        id,
        label: label.to_string(),
        meta: CacheMetadata {
            entity_tag: entity_tag.map(str::to_string),
            last_modified: None,
            expires_at: Some(expires_at),
        },
    }
}

#[async_trait]
impl CachedResource for WidgetResource {
    type Key = u32;
    type Record = WidgetRecord;
    type Payload = String;
    type View = WidgetView;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn parse_key(&self, raw: &str) -> Result<u32, DomainError> {
        let id: u32 = raw
            .parse()
            .map_err(|_| DomainError::malformed_key(KIND, raw, "expected digits"))?;
        if id == 0 {
            return Err(DomainError::unknown_key(KIND, id));
        }
        Ok(id)
    }

    async fn read_durable(&self, key: &u32) -> Result<Option<WidgetRecord>, RepoError> {
        self.durable_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_durable_reads {
            return Err(RepoError::Timeout);
        }
        Ok(self.record(*key))
    }

    fn durable_meta<'a>(&self, record: &'a WidgetRecord) -> &'a CacheMetadata {
        &record.meta
    }

    async fn upsert_on_success(
        &self,
        key: &u32,
        payload: &String,
        meta: &CacheMetadata,
    ) -> Result<WidgetRecord, RepoError> {
        if self.fail_upserts {
            return Err(RepoError::from_persistence("connection reset"));
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let record = WidgetRecord {
            id: *key,
            label: payload.clone(),
            meta: meta.clone(),
        };
        self.durable
            .lock()
            .expect("durable lock")
            .insert(*key, record.clone());
        Ok(record)
    }

    async fn bump_on_not_modified(
        &self,
        key: &u32,
        meta: &CacheMetadata,
    ) -> Result<(), RepoError> {
        self.bumps.fetch_add(1, Ordering::SeqCst);
        let mut durable = self.durable.lock().expect("durable lock");
        let record = durable.get_mut(key).ok_or(RepoError::NotFound)?;
        record.meta = meta.clone();
        Ok(())
    }

    async fn fetch_upstream(
        &self,
        _key: &u32,
        entity_tag: Option<&str>,
    ) -> Result<Fetched<String>, UpstreamError> {
        self.upstream_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tags
            .lock()
            .expect("tags lock")
            .push(entity_tag.map(str::to_string));
        if let Some(delay) = self.upstream_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().expect("script lock").pop_front();
        next.unwrap_or_else(|| Err(UpstreamError::network("connection refused")))
    }

    fn to_view(&self, key: &u32, record: &WidgetRecord) -> WidgetView {
        WidgetView {
            id: *key,
            label: record.label.clone(),
        }
    }
}

pub struct Harness {
    pub resource: Arc<WidgetResource>,
    pub cache: Arc<dyn FastCache>,
    pub clock: Arc<ManualClock>,
    pub aside: CacheAside<WidgetResource>,
}

impl Harness {
    pub fn new(resource: WidgetResource) -> Self {
        Self::with_cache(resource, Arc::new(InMemoryFastCache::new()))
    }

    pub fn with_cache(resource: WidgetResource, cache: Arc<dyn FastCache>) -> Self {
        let resource = Arc::new(resource);
        let clock = Arc::new(ManualClock::new(START));
        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let aside = CacheAside::new(
            resource.clone(),
            cache.clone(),
            CacheKeys::new("v1", "2025-09-30"),
            CachePolicy::default(),
            clock_dyn,
        );
        Self {
            resource,
            cache,
            clock,
            aside,
        }
    }

    pub fn keys(&self, id: u32) -> ResourceKeys {
        CacheKeys::new("v1", "2025-09-30").resource(KIND, &id.to_string())
    }

    pub async fn seed_payload(&self, id: u32, label: &str, fresh: bool) {
        let keys = self.keys(id);
        let json = serde_json::to_string(&WidgetView {
            id,
            label: label.to_string(),
        })
        .expect("encode view");
        self.cache
            .set(&keys.payload, &json, Duration::from_secs(3_600))
            .await
            .expect("seed payload");
        if fresh {
            self.cache
                .set(&keys.fresh, "1", Duration::from_secs(600))
                .await
                .expect("seed marker");
        }
    }
}

/// Every operation fails, as if the cache server were unreachable.
#[derive(Debug, Default)]
pub struct UnreachableCache;

#[async_trait]
impl FastCache for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::transport("connection refused"))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::transport("connection refused"))
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, CacheError> {
        Err(CacheError::transport("connection refused"))
    }

    async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::transport("connection refused"))
    }

    async fn ttl_remaining(&self, _key: &str) -> Result<Option<Duration>, CacheError> {
        Err(CacheError::transport("connection refused"))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::transport("connection refused"))
    }

    async fn delete_if_eq(&self, _key: &str, _expected: &str) -> Result<bool, CacheError> {
        Err(CacheError::transport("connection refused"))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::transport("connection refused"))
    }
}
