//! Hand-written test doubles (§9 "Humanization vs. determinism in tests").
//!
//! No mocking framework is used here, matching the teacher's own test style;
//! each fake implements the real trait directly and exposes a small amount
//! of test-only introspection.

#![cfg(test)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::{Browser, ElementHandle, MutationEvent, NetworkEvent, WaitUntil};
use crate::cache::{DurableStore, ReliabilitySummary, Store};
use crate::config::Namespace;
use crate::domain::{Domain, SemanticField};
use crate::error::{AsieError, Result};
use crate::locator::LocatorRecord;
use crate::snapshot::{AvailabilityState, CAPTURE_SCRIPT, PageStateSnapshot};
use crate::strategy::ExtractionStrategy;

fn empty_snapshot() -> PageStateSnapshot {
    PageStateSnapshot {
        url: "about:blank".to_string(),
        title: String::new(),
        price_text: None,
        images: Vec::new(),
        availability: AvailabilityState::default(),
        selected_variant_values: Vec::new(),
        selected_variant_labels: Vec::new(),
        captured_at_ms: 0,
    }
}

/// Mutable state shared behind a [`FakeBrowser`]'s handle.
pub struct Inner {
    /// The current page-state snapshot, mutated by registered click effects.
    pub snapshot: PageStateSnapshot,
    click_effects: HashMap<String, Box<dyn Fn(&mut Inner) + Send + Sync>>,
    total_wait_ms: u64,
    html: String,
    network_events: VecDeque<NetworkEvent>,
    mutation_events: VecDeque<MutationEvent>,
}

/// An in-memory [`Browser`] double: no real page, no real DOM. `evaluate`
/// answers the two scripts the engine actually dispatches ([`CAPTURE_SCRIPT`]
/// and the DOM snapshot used for candidate/variant discovery); everything
/// else is a recorded no-op.
pub struct FakeBrowser {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBrowser {
    /// An empty browser: blank snapshot, no registered selectors, no page markup.
    pub fn new() -> Self {
        Self::from_snapshot(empty_snapshot())
    }

    /// A browser seeded with a specific starting snapshot.
    pub fn from_snapshot(snapshot: PageStateSnapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                snapshot,
                click_effects: HashMap::new(),
                total_wait_ms: 0,
                html: String::new(),
                network_events: VecDeque::new(),
                mutation_events: VecDeque::new(),
            })),
        }
    }

    /// Register a click effect for `selector`: once registered, `query`
    /// resolves it to a handle, and `click` runs `effect` against the
    /// shared [`Inner`] state (typically mutating `snapshot`).
    pub fn on_click<F>(&self, selector: &str, effect: F)
    where
        F: Fn(&mut Inner) + Send + Sync + 'static,
    {
        self.inner.lock().unwrap().click_effects.insert(selector.to_string(), Box::new(effect));
    }

    /// Set the markup the DOM-snapshot script will return.
    pub fn set_page_html(&self, html: impl Into<String>) {
        self.inner.lock().unwrap().html = html.into();
    }

    /// Queue a network event for `next_network_event` to return.
    pub fn push_network_event(&self, event: NetworkEvent) {
        self.inner.lock().unwrap().network_events.push_back(event);
    }

    /// Queue a mutation event for `next_mutation_event` to return.
    pub fn push_mutation_event(&self, event: MutationEvent) {
        self.inner.lock().unwrap().mutation_events.push_back(event);
    }

    /// Total milliseconds accumulated across all `wait_ms` calls.
    pub fn total_wait_ms(&self) -> u64 {
        self.inner.lock().unwrap().total_wait_ms
    }
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, _url: &str, _wait_until: WaitUntil, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn evaluate(&self, script: &str, _args: Value) -> Result<Value> {
        let inner = self.inner.lock().unwrap();
        if script == CAPTURE_SCRIPT {
            Ok(serde_json::to_value(&inner.snapshot)?)
        } else if script == crate::dom::DOM_SNAPSHOT_SCRIPT {
            Ok(Value::String(inner.html.clone()))
        } else {
            Ok(Value::Null)
        }
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let inner = self.inner.lock().unwrap();
        if inner.click_effects.contains_key(selector) {
            Ok(vec![ElementHandle(selector.to_string())])
        } else {
            Ok(Vec::new())
        }
    }

    async fn click(&self, handle: &ElementHandle) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(effect) = inner.click_effects.remove(&handle.0) {
            effect(&mut inner);
            inner.click_effects.insert(handle.0.clone(), effect);
        }
        Ok(())
    }

    async fn hover(&self, _handle: &ElementHandle) -> Result<()> {
        Ok(())
    }

    async fn select_by_index(&self, _handle: &ElementHandle, _index: usize) -> Result<()> {
        Ok(())
    }

    async fn type_str(&self, _handle: &ElementHandle, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn scroll_by(&self, _dx: i64, _dy: i64) -> Result<()> {
        Ok(())
    }

    async fn wait_ms(&self, ms: u64) -> Result<()> {
        self.inner.lock().unwrap().total_wait_ms += ms;
        Ok(())
    }

    async fn next_network_event(&self, _timeout: Duration) -> Result<Option<NetworkEvent>> {
        Ok(self.inner.lock().unwrap().network_events.pop_front())
    }

    async fn next_mutation_event(&self, _timeout: Duration) -> Result<Option<MutationEvent>> {
        Ok(self.inner.lock().unwrap().mutation_events.pop_front())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A [`Store`] double whose every method reports the hot tier as
/// unavailable, for exercising the §4.6 fallback contract.
pub struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    async fn setex(&self, namespace: Namespace, _key: &str, _value: Value, _ttl: Duration) -> Result<()> {
        Err(AsieError::CacheUnavailable { namespace: namespace.to_string() })
    }

    async fn get(&self, namespace: Namespace, _key: &str) -> Result<Option<Value>> {
        Err(AsieError::CacheUnavailable { namespace: namespace.to_string() })
    }

    async fn keys(&self, namespace: Namespace, _pattern: &str) -> Result<Vec<String>> {
        Err(AsieError::CacheUnavailable { namespace: namespace.to_string() })
    }

    async fn del(&self, namespace: Namespace, _keys: &[String]) -> Result<()> {
        Err(AsieError::CacheUnavailable { namespace: namespace.to_string() })
    }
}

/// A [`DurableStore`] double backed by a plain in-memory `Vec`, for tests
/// that need cold-tier persistence semantics without a real database.
#[derive(Default)]
pub struct InMemoryDurableStore {
    records: Mutex<Vec<LocatorRecord>>,
    strategies: Mutex<Vec<ExtractionStrategy>>,
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn upsert(&self, record: LocatorRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.domain == record.domain && r.field == record.field && r.locator.selector == record.locator.selector)
        {
            existing.upsert_merge(&record.locator, &record.context);
        } else {
            records.push(record);
        }
        Ok(())
    }

    async fn get_best(&self, domain: &Domain, field: SemanticField) -> Result<Option<LocatorRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| &r.domain == domain && r.field == field && r.active)
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
            .cloned())
    }

    async fn record_result(&self, domain: &Domain, field: SemanticField, selector: &str, success: bool) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        if let Some(r) = records
            .iter_mut()
            .find(|r| &r.domain == domain && r.field == field && r.locator.selector == selector)
        {
            r.record_result(success);
        }
        Ok(())
    }

    async fn cleanup(&self, age_days: i64, min_confidence: f64) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let mut touched = 0u64;
        for r in records.iter_mut() {
            let was_active = r.active;
            r.cleanup_if_stale(age_days, min_confidence);
            if was_active && !r.active {
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn get_strategy(&self, domain: &Domain) -> Result<Option<ExtractionStrategy>> {
        let strategies = self.strategies.lock().unwrap();
        Ok(strategies
            .iter()
            .filter(|s| &s.domain == domain)
            .max_by(|a, b| a.learned_at.cmp(&b.learned_at))
            .cloned())
    }

    async fn put_strategy(&self, strategy: ExtractionStrategy) -> Result<()> {
        self.strategies.lock().unwrap().push(strategy);
        Ok(())
    }

    async fn aggregate_by_domain(&self, domain: &Domain) -> Result<ReliabilitySummary> {
        let records = self.records.lock().unwrap();
        let relevant: Vec<_> = records.iter().filter(|r| &r.domain == domain).collect();
        let active: Vec<_> = relevant.iter().filter(|r| r.active).collect();
        let mean_active_confidence = if active.is_empty() {
            0.0
        } else {
            active.iter().map(|r| r.confidence).sum::<f64>() / active.len() as f64
        };
        Ok(ReliabilitySummary {
            domain: domain.clone(),
            total_records: relevant.len() as u64,
            active_records: active.len() as u64,
            mean_active_confidence,
        })
    }
}
