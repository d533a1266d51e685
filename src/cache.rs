//! Locator Cache & Learner (C6, §4.6, §6): a two-tier store keyed by
//! `(domain, field)` — a short-TTL hot tier and a durable cold tier of
//! [`LocatorRecord`]s — plus the learning updates that keep confidence
//! converging over time.
//!
//! [`Store`] and [`DurableStore`] are *consumed* interfaces (§6): the ASIE
//! does not implement a production Redis/Mongo-style backend itself, it only
//! depends on a trait object satisfying them. [`InMemoryStore`] is the
//! in-process fallback §4.6 requires for fallback-safe namespaces, built on
//! `moka`, matching the teacher's own TTL-cache dependency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{CacheTtls, Namespace};
use crate::domain::{Domain, SemanticField};
use crate::error::{AsieError, Result};
use crate::locator::LocatorRecord;
use crate::strategy::ExtractionStrategy;

/// The hot, short-TTL key-value tier (§4.6, §6 "Consumed interfaces").
#[async_trait]
pub trait Store: Send + Sync {
    /// Write `value` under `(namespace, key)` with the given TTL.
    async fn setex(&self, namespace: Namespace, key: &str, value: Value, ttl: Duration) -> Result<()>;
    /// Read the value at `(namespace, key)`, or `None` if absent/expired.
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>>;
    /// List keys in `namespace` matching a simple prefix `pattern`.
    async fn keys(&self, namespace: Namespace, pattern: &str) -> Result<Vec<String>>;
    /// Delete the given keys from `namespace`.
    async fn del(&self, namespace: Namespace, keys: &[String]) -> Result<()>;
}

/// Per-domain reliability summary, as returned by [`DurableStore::aggregate_by_domain`] (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct ReliabilitySummary {
    /// The domain summarized.
    pub domain: Domain,
    /// Total records on file for this domain.
    pub total_records: u64,
    /// Records currently active.
    pub active_records: u64,
    /// Mean confidence across all active records.
    pub mean_active_confidence: f64,
}

/// The durable, long-lived tier of [`LocatorRecord`]s and [`ExtractionStrategy`]
/// artifacts (§4.6, §6 "Consumed interfaces").
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert or merge a record, keyed by `(domain, field, selector)` (§4.6 `upsert`).
    async fn upsert(&self, record: LocatorRecord) -> Result<()>;
    /// Return the highest-confidence active record for `(domain, field)`, if any.
    async fn get_best(&self, domain: &Domain, field: SemanticField) -> Result<Option<LocatorRecord>>;
    /// Apply a `record_result` update to the record at `(domain, field, selector)`.
    async fn record_result(&self, domain: &Domain, field: SemanticField, selector: &str, success: bool) -> Result<()>;
    /// Deactivate stale/low-confidence records; returns the count touched (§4.6 `cleanup`).
    async fn cleanup(&self, age_days: i64, min_confidence: f64) -> Result<u64>;
    /// Fetch the persisted strategy for `domain`, if any.
    async fn get_strategy(&self, domain: &Domain) -> Result<Option<ExtractionStrategy>>;
    /// Persist `strategy`, superseding (never mutating) any prior strategy for its domain.
    async fn put_strategy(&self, strategy: ExtractionStrategy) -> Result<()>;
    /// Aggregate reliability stats across all records for `domain`.
    async fn aggregate_by_domain(&self, domain: &Domain) -> Result<ReliabilitySummary>;
}

/// The in-process fallback store required by §4.6 for fallback-safe
/// namespaces when the hot tier is unavailable. One `moka` cache per
/// namespace, each built with that namespace's configured TTL.
pub struct InMemoryStore {
    caches: dashmap::DashMap<Namespace, moka::future::Cache<String, Value>>,
    ttls: CacheTtls,
}

impl InMemoryStore {
    /// Build a fallback store whose per-namespace TTLs come from `ttls`.
    pub fn new(ttls: CacheTtls) -> Self {
        let caches = dashmap::DashMap::new();
        for ns in [
            Namespace::Navigation,
            Namespace::Selectors,
            Namespace::Learning,
            Namespace::State,
            Namespace::Discovery,
            Namespace::Checkpoint,
        ] {
            let cache = moka::future::Cache::builder()
                .max_capacity(50_000)
                .time_to_live(ns.ttl(&ttls))
                .build();
            caches.insert(ns, cache);
        }
        Self { caches, ttls }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(CacheTtls::default())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn setex(&self, namespace: Namespace, key: &str, value: Value, _ttl: Duration) -> Result<()> {
        // The namespace's own TTL governs the in-process fallback (§4.6); the
        // per-call `_ttl` exists for interface parity with external backends
        // that support arbitrary per-key TTLs.
        let _ = namespace.ttl(&self.ttls);
        if let Some(cache) = self.caches.get(&namespace) {
            cache.insert(key.to_string(), value).await;
            Ok(())
        } else {
            Err(AsieError::Fatal(format!("unknown namespace {namespace}")))
        }
    }

    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>> {
        if let Some(cache) = self.caches.get(&namespace) {
            Ok(cache.get(key).await)
        } else {
            Err(AsieError::Fatal(format!("unknown namespace {namespace}")))
        }
    }

    async fn keys(&self, namespace: Namespace, pattern: &str) -> Result<Vec<String>> {
        if let Some(cache) = self.caches.get(&namespace) {
            Ok(cache.iter().map(|(k, _)| (*k).clone()).filter(|k| k.contains(pattern)).collect())
        } else {
            Err(AsieError::Fatal(format!("unknown namespace {namespace}")))
        }
    }

    async fn del(&self, namespace: Namespace, keys: &[String]) -> Result<()> {
        if let Some(cache) = self.caches.get(&namespace) {
            for key in keys {
                cache.invalidate(key).await;
            }
            Ok(())
        } else {
            Err(AsieError::Fatal(format!("unknown namespace {namespace}")))
        }
    }
}

/// The Cache & Learner service (C6): composes a hot [`Store`] with a cold
/// [`DurableStore`], transparently falling back to an in-process store per
/// §4.6's contract.
pub struct CacheLearner {
    hot: Arc<dyn Store>,
    cold: Arc<dyn DurableStore>,
    fallback: InMemoryStore,
    ttls: CacheTtls,
}

impl CacheLearner {
    /// Build a learner over injected hot/cold backends.
    pub fn new(hot: Arc<dyn Store>, cold: Arc<dyn DurableStore>, ttls: CacheTtls) -> Self {
        Self {
            hot,
            fallback: InMemoryStore::new(ttls.clone()),
            cold,
            ttls,
        }
    }

    fn key_for(domain: &Domain, field: SemanticField) -> String {
        format!("{domain}:{field}")
    }

    async fn hot_get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>> {
        match self.hot.get(namespace, key).await {
            Ok(v) => Ok(v),
            Err(AsieError::CacheUnavailable { .. }) => {
                if namespace.is_fallback_safe() {
                    self.fallback.get(namespace, key).await
                } else {
                    log::warn!("hot cache unavailable for non-fallback-safe namespace {namespace}; proceeding without cache");
                    Ok(None)
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn hot_set(&self, namespace: Namespace, key: &str, value: Value) -> Result<()> {
        let ttl = namespace.ttl(&self.ttls);
        match self.hot.setex(namespace, key, value.clone(), ttl).await {
            Ok(()) => Ok(()),
            Err(AsieError::CacheUnavailable { .. }) => {
                if namespace.is_fallback_safe() {
                    self.fallback.setex(namespace, key, value, ttl).await
                } else {
                    log::warn!("hot cache unavailable for non-fallback-safe namespace {namespace}; write dropped");
                    Ok(())
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Read the best known locator for `(domain, field)`, trying the hot
    /// tier first and falling through to the cold tier on miss, populating
    /// the hot tier on the way back (§4.6).
    pub async fn get_locator(&self, domain: &Domain, field: SemanticField) -> Result<Option<LocatorRecord>> {
        let key = Self::key_for(domain, field);
        if let Some(value) = self.hot_get(Namespace::Selectors, &key).await? {
            return Ok(Some(serde_json::from_value(value)?));
        }
        let record = self.cold.get_best(domain, field).await?;
        if let Some(record) = &record {
            self.hot_set(Namespace::Selectors, &key, serde_json::to_value(record)?).await?;
        }
        Ok(record)
    }

    /// Invalidate `key` in both the hot tier and, for fallback-safe
    /// namespaces, the in-process fallback — so a stale entry never survives
    /// in one tier after the other was cleared.
    async fn hot_del(&self, namespace: Namespace, key: &str) -> Result<()> {
        let keys = [key.to_string()];
        match self.hot.del(namespace, &keys).await {
            Ok(()) => {}
            Err(AsieError::CacheUnavailable { .. }) => {
                log::warn!("hot cache unavailable for namespace {namespace}; nothing to invalidate there");
            }
            Err(e) => return Err(e),
        }
        if namespace.is_fallback_safe() {
            self.fallback.del(namespace, &keys).await?;
        }
        Ok(())
    }

    /// Persist a newly discovered/validated record, invalidating the hot
    /// cache entry so the next `get_locator` re-reads the merged cold record.
    pub async fn upsert_locator(&self, record: LocatorRecord) -> Result<()> {
        let key = Self::key_for(&record.domain, record.field);
        self.cold.upsert(record).await?;
        self.hot_del(Namespace::Selectors, &key).await
    }

    /// Record the outcome of using a cached record, updating confidence
    /// and possibly deactivating it (§4.6 `record_result`, §7 `NoMatch`).
    pub async fn record_result(&self, domain: &Domain, field: SemanticField, selector: &str, success: bool) -> Result<()> {
        self.cold.record_result(domain, field, selector, success).await?;
        let key = Self::key_for(domain, field);
        self.hot_del(Namespace::Selectors, &key).await
    }

    /// Read a persisted strategy for `domain`, if present (§4.7 step 1).
    pub async fn get_strategy(&self, domain: &Domain) -> Result<Option<ExtractionStrategy>> {
        self.cold.get_strategy(domain).await
    }

    /// Persist a newly learned strategy, superseding any prior one (§3, §4.7 step 4).
    pub async fn put_strategy(&self, strategy: ExtractionStrategy) -> Result<()> {
        self.cold.put_strategy(strategy).await
    }

    /// §4.6 `cleanup`.
    pub async fn cleanup(&self, age_days: i64, min_confidence: f64) -> Result<u64> {
        self.cold.cleanup(age_days, min_confidence).await
    }

    /// §6 durable-store reliability aggregation.
    pub async fn aggregate_by_domain(&self, domain: &Domain) -> Result<ReliabilitySummary> {
        self.cold.aggregate_by_domain(domain).await
    }
}
