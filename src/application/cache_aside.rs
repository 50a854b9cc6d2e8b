//! Cache-aside orchestration across the fast cache, the durable store and the upstream.
//!
//! Per request, in order:
//! 1. fast-cache payload plus freshness marker: serve it, touch nothing else;
//! 2. durable record still inside its upstream lifetime: serve it and re-warm the fast cache;
//! 3. otherwise take the per-key revalidation lock and ask the upstream (conditionally when a tag
//!    is known). A busy lock serves whatever the fast cache held; with nothing cached the request
//!    goes upstream anyway. This step runs in its own task, so a caller that stops waiting
//!    neither aborts the upstream call nor leaves the lock held;
//! 4. any upstream-phase failure falls back to the fast-cache value read in step 1, then to the
//!    durable record, and only then surfaces the classified error.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use esi_gateway_api_types::{ApiMeta, ApiSuccess, DataSource};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::{
    application::{error::AppError, resource::CachedResource},
    cache::{CacheError, CacheKeys, CachePolicy, FastCache, ResourceKeys, RevalidationLock},
    domain::cache_meta::CacheMetadata,
    util::clock::Clock,
};

const TARGET: &str = "esi_gateway::cache_aside";
const MARKER_VALUE: &str = "1";

/// A successful answer and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Served<V> {
    pub data: V,
    pub source: DataSource,
    pub stale: bool,
    /// Remaining lifetime of the served copy, when known.
    pub ttl: Option<Duration>,
    pub etag: Option<String>,
}

impl<V> Served<V> {
    pub fn meta(&self) -> ApiMeta {
        ApiMeta {
            source: Some(self.source),
            stale: self.stale.then_some(true),
            ttl: self.ttl.map(|ttl| ttl.as_secs()),
            etag: self.etag.clone(),
        }
    }

    pub fn into_envelope(self) -> ApiSuccess<V> {
        let meta = self.meta();
        ApiSuccess::with_meta(self.data, meta)
    }
}

enum Failure {
    /// Eligible for stale-if-error.
    Fallback(AppError),
    /// Reported as is.
    Terminal(AppError),
}

pub struct CacheAside<R: CachedResource> {
    engine: Arc<Engine<R>>,
}

struct Engine<R: CachedResource> {
    resource: Arc<R>,
    cache: Arc<dyn FastCache>,
    keys: CacheKeys,
    lock: RevalidationLock,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
}

impl<R: CachedResource> CacheAside<R> {
    pub fn new(
        resource: Arc<R>,
        cache: Arc<dyn FastCache>,
        keys: CacheKeys,
        policy: CachePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lock = RevalidationLock::new(cache.clone(), policy.lock_ttl);
        Self {
            engine: Arc::new(Engine {
                resource,
                cache,
                keys,
                lock,
                policy,
                clock,
            }),
        }
    }

    /// Resolve one resource by its raw (unvalidated) key.
    pub async fn get(&self, raw_key: &str) -> Result<Served<R::View>, AppError> {
        let engine = &self.engine;
        let started = Instant::now();
        let key = engine.resource.parse_key(raw_key)?;
        let keys = engine.keys.resource(engine.resource.kind(), &key.to_string());

        let result = engine.serve(&key, &keys).await;
        engine.report(&key, &result, started.elapsed());
        result
    }
}

impl<R: CachedResource> Engine<R> {
    async fn serve(
        self: &Arc<Self>,
        key: &R::Key,
        keys: &ResourceKeys,
    ) -> Result<Served<R::View>, AppError> {
        let cached = self.read_cached(keys).await;
        if let Some(view) = cached.as_ref()
            && self.marker_present(keys).await
        {
            let ttl = best_effort(
                "fastcache.ttl",
                &keys.payload,
                self.cache.ttl_remaining(&keys.payload).await,
            )
            .flatten();
            return Ok(Served {
                data: view.clone(),
                source: DataSource::Fastcache,
                stale: false,
                ttl,
                etag: None,
            });
        }

        let record = self.read_durable(key).await;
        if let Some(record) = record.as_ref() {
            let meta = self.resource.durable_meta(record);
            if let Some(remaining) = meta.remaining(self.clock.now()) {
                let view = self.resource.to_view(key, record);
                self.refresh_fast(keys, &view, meta.entity_tag.as_deref(), remaining)
                    .await;
                return Ok(Served {
                    data: view,
                    source: DataSource::Durable,
                    stale: false,
                    ttl: Some(remaining),
                    etag: meta.entity_tag.clone(),
                });
            }
        }

        // Lock, upstream call, cache fill and release run to completion even when the caller
        // is dropped.
        let engine = Arc::clone(self);
        let (key, keys) = (key.clone(), keys.clone());
        tokio::spawn(async move {
            engine
                .revalidate_or_fallback(&key, &keys, cached, record)
                .await
        })
        .await
        .unwrap_or_else(|err| {
            Err(AppError::unexpected(format!(
                "revalidation task failed: {err}"
            )))
        })
    }

    async fn revalidate_or_fallback(
        &self,
        key: &R::Key,
        keys: &ResourceKeys,
        cached: Option<R::View>,
        record: Option<R::Record>,
    ) -> Result<Served<R::View>, AppError> {
        let ticket = self.lock.try_acquire(&keys.lock).await;
        if ticket.is_none() {
            counter!("esi_gateway_revalidation_lock_busy_total", "kind" => self.resource.kind())
                .increment(1);
            if let Some(view) = cached.as_ref() {
                debug!(target: TARGET, kind = self.resource.kind(), key = %key, "revalidation in flight, serving cached copy");
                return Ok(Served {
                    data: view.clone(),
                    source: DataSource::Fastcache,
                    stale: true,
                    ttl: None,
                    etag: None,
                });
            }
            debug!(target: TARGET, kind = self.resource.kind(), key = %key, "revalidation in flight and nothing cached, fetching without the lock");
        }

        let outcome = self.revalidate(key, keys, record.as_ref()).await;
        if let Some(ticket) = ticket {
            self.lock.release(ticket).await;
        }

        match outcome {
            Ok(served) => Ok(served),
            Err(Failure::Terminal(err)) => Err(err),
            Err(Failure::Fallback(err)) => self.stale_fallback(key, cached, record, err),
        }
    }

    async fn revalidate(
        &self,
        key: &R::Key,
        keys: &ResourceKeys,
        record: Option<&R::Record>,
    ) -> Result<Served<R::View>, Failure> {
        let stored_tag = record.and_then(|record| self.resource.durable_meta(record).entity_tag.clone());
        let entity_tag = match stored_tag {
            Some(tag) => Some(tag),
            None => best_effort(
                "fastcache.get_etag",
                &keys.entity_tag,
                self.cache.get(&keys.entity_tag).await,
            )
            .flatten(),
        };

        let fetched = self
            .resource
            .fetch_upstream(key, entity_tag.as_deref())
            .await
            .map_err(|err| Failure::Fallback(err.into()))?;

        let ttl = fetched.ttl.unwrap_or(self.policy.fallback_ttl);
        let expires_at = self.clock.now() + ttl;

        let Some(payload) = fetched.payload else {
            let Some(record) = record else {
                return Err(Failure::Terminal(AppError::not_found(format!(
                    "{} {key} not found",
                    self.resource.kind()
                ))));
            };
            let meta = self.resource.durable_meta(record).revalidated(
                fetched.entity_tag,
                fetched.last_modified,
                expires_at,
            );
            if let Err(err) = self.resource.bump_on_not_modified(key, &meta).await {
                warn!(
                    target: TARGET,
                    op = "durable.bump_metadata",
                    kind = self.resource.kind(),
                    key = %key,
                    error = %err,
                    "failed to persist refreshed validators"
                );
            }
            let view = self.resource.to_view(key, record);
            self.refresh_fast(keys, &view, meta.entity_tag.as_deref(), ttl)
                .await;
            return Ok(Served {
                data: view,
                source: DataSource::Upstream,
                stale: false,
                ttl: Some(ttl),
                etag: meta.entity_tag,
            });
        };

        let meta = CacheMetadata {
            entity_tag: fetched.entity_tag,
            last_modified: fetched.last_modified,
            expires_at: Some(expires_at),
        };
        let stored = self
            .resource
            .upsert_on_success(key, &payload, &meta)
            .await
            .map_err(|err| Failure::Fallback(err.into()))?;

        let view = self.resource.to_view(key, &stored);
        self.refresh_fast(keys, &view, meta.entity_tag.as_deref(), ttl)
            .await;
        Ok(Served {
            data: view,
            source: DataSource::Upstream,
            stale: false,
            ttl: Some(ttl),
            etag: meta.entity_tag,
        })
    }

    fn stale_fallback(
        &self,
        key: &R::Key,
        cached: Option<R::View>,
        record: Option<R::Record>,
        error: AppError,
    ) -> Result<Served<R::View>, AppError> {
        if let Some(view) = cached {
            info!(target: TARGET, kind = self.resource.kind(), key = %key, error = %error, "upstream failed, serving stale fast-cache copy");
            return Ok(Served {
                data: view,
                source: DataSource::Fastcache,
                stale: true,
                ttl: None,
                etag: None,
            });
        }

        if let Some(record) = record {
            info!(target: TARGET, kind = self.resource.kind(), key = %key, error = %error, "upstream failed, serving stale durable copy");
            return Ok(Served {
                data: self.resource.to_view(key, &record),
                source: DataSource::Durable,
                stale: true,
                ttl: None,
                etag: self.resource.durable_meta(&record).entity_tag.clone(),
            });
        }

        Err(error)
    }

    async fn read_cached(&self, keys: &ResourceKeys) -> Option<R::View> {
        let raw = best_effort(
            "fastcache.get",
            &keys.payload,
            self.cache.get(&keys.payload).await,
        )??;
        match serde_json::from_str(&raw) {
            Ok(view) => Some(view),
            Err(err) => {
                warn!(target: TARGET, op = "fastcache.decode", key = %keys.payload, error = %err, "ignoring undecodable cache entry");
                None
            }
        }
    }

    async fn marker_present(&self, keys: &ResourceKeys) -> bool {
        best_effort(
            "fastcache.exists",
            &keys.fresh,
            self.cache.exists(&keys.fresh).await,
        )
        .unwrap_or(false)
    }

    async fn read_durable(&self, key: &R::Key) -> Option<R::Record> {
        match self.resource.read_durable(key).await {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    target: TARGET,
                    op = "durable.read",
                    kind = self.resource.kind(),
                    key = %key,
                    error = %err,
                    "durable read failed, continuing as if absent"
                );
                None
            }
        }
    }

    /// Payload and tag live `max(lifetime, min_payload_ttl)`; the marker `min(fresh, lifetime)`.
    async fn refresh_fast(
        &self,
        keys: &ResourceKeys,
        view: &R::View,
        entity_tag: Option<&str>,
        lifetime: Duration,
    ) {
        let payload_ttl = self.policy.payload_ttl(lifetime);
        let marker_ttl = self.policy.marker_ttl(lifetime);

        match serde_json::to_string(view) {
            Ok(json) => {
                best_effort(
                    "fastcache.set_payload",
                    &keys.payload,
                    self.cache.set(&keys.payload, &json, payload_ttl).await,
                );
            }
            Err(err) => {
                warn!(target: TARGET, op = "fastcache.encode", key = %keys.payload, error = %err, "failed to encode view");
            }
        }

        if let Some(tag) = entity_tag {
            best_effort(
                "fastcache.set_etag",
                &keys.entity_tag,
                self.cache.set(&keys.entity_tag, tag, payload_ttl).await,
            );
        }

        if marker_ttl.is_zero() {
            best_effort(
                "fastcache.clear_marker",
                &keys.fresh,
                self.cache.delete(&keys.fresh).await,
            );
        } else {
            best_effort(
                "fastcache.set_marker",
                &keys.fresh,
                self.cache.set(&keys.fresh, MARKER_VALUE, marker_ttl).await,
            );
        }
    }

    fn report(&self, key: &R::Key, result: &Result<Served<R::View>, AppError>, elapsed: Duration) {
        let kind = self.resource.kind();
        let elapsed_ms = elapsed.as_millis() as u64;
        match result {
            Ok(served) => {
                counter!(
                    "esi_gateway_serve_total",
                    "kind" => kind,
                    "source" => served.source.as_str(),
                    "stale" => if served.stale { "true" } else { "false" }
                )
                .increment(1);
                info!(
                    target: TARGET,
                    kind,
                    key = %key,
                    source = served.source.as_str(),
                    stale = served.stale,
                    ttl = served.ttl.map(|ttl| ttl.as_secs()),
                    etag = served.etag.as_deref(),
                    elapsed_ms,
                    "served"
                );
            }
            Err(err) => {
                warn!(
                    target: TARGET,
                    kind,
                    key = %key,
                    code = err.code().as_str(),
                    error = %err,
                    elapsed_ms,
                    "resolution failed"
                );
            }
        }
    }
}

fn best_effort<T>(op: &'static str, key: &str, result: Result<T, CacheError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(target: TARGET, op, key, error = %err, "fast cache operation failed");
            None
        }
    }
}
