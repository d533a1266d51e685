//! Locator and LocatorRecord (§3, §4.6, §6): the unit of learned knowledge
//! the engine accumulates per `(domain, field)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Category, Domain, SemanticField};
use crate::error::{AsieError, Result};

/// How a [`Locator`] was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    /// Found by generic DOM structure analysis.
    Dom,
    /// Found via a label/text heuristic (§4.5 layer 1).
    Label,
    /// Found via ARIA roles/attributes (§4.5 layer 2).
    Aria,
    /// Found via `data-*` attributes (§4.5 layer 3).
    DataAttr,
    /// Found via structural clustering (§4.5 layer 4).
    Structural,
    /// Loaded from the cache without rediscovery.
    Cached,
    /// Produced by the adaptive retry loop (§4.7).
    Learned,
}

/// An immutable, verified selector plus its discovery provenance (§3).
///
/// Invariant: `selector` must be syntactically valid CSS and must have
/// resolved to at least one element at least once; [`Locator::new`] is the
/// only constructor and enforces this by construction (callers pass in the
/// already-observed match count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    /// The primary CSS selector.
    pub selector: String,
    /// Ordered fallback selectors, tried in order if `selector` stops matching.
    pub alternatives: Vec<String>,
    /// How this locator was found.
    pub discovery_method: DiscoveryMethod,
    /// The validation category of the field this locator targets.
    pub element_category: Category,
    /// When this locator was first produced.
    pub discovered_at: DateTime<Utc>,
}

impl Locator {
    /// Construct a `Locator`, rejecting selectors that never matched.
    ///
    /// `observed_matches` is the element count the caller observed when
    /// resolving `selector` against the live page; it must be `>= 1`.
    pub fn new(
        selector: impl Into<String>,
        alternatives: Vec<String>,
        discovery_method: DiscoveryMethod,
        element_category: Category,
        observed_matches: usize,
    ) -> Result<Self> {
        let selector = selector.into();
        if selector.trim().is_empty() {
            return Err(AsieError::SelectorInvalid(selector));
        }
        if observed_matches == 0 {
            return Err(AsieError::NoMatch(selector));
        }
        Ok(Self {
            selector,
            alternatives,
            discovery_method,
            element_category,
            discovered_at: Utc::now(),
        })
    }

    /// Merge another locator's alternatives into this one's by set union,
    /// preserving order and first-seen precedence (§4.6 `upsert`).
    pub fn merge_alternatives(&mut self, other: &Locator) {
        for alt in std::iter::once(&other.selector).chain(other.alternatives.iter()) {
            if alt != &self.selector && !self.alternatives.contains(alt) {
                self.alternatives.push(alt.clone());
            }
        }
    }
}

/// The confidence floor below which an over-observed record is deactivated (§3, §4.6).
pub const DEACTIVATION_CONFIDENCE: f64 = 0.30;
/// The observation count after which the deactivation floor applies (§3, §4.6).
pub const DEACTIVATION_MIN_OBSERVATIONS: u64 = 10;
/// The per-observation confidence step applied by `record_result` (§4.6, §8).
pub const CONFIDENCE_STEP: f64 = 0.1;

/// A [`Locator`] plus its aggregated reliability state, as persisted by the
/// Cache & Learner (§3, §6). Unique key: `(domain, field, selector)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorRecord {
    /// The domain this record was learned for.
    pub domain: Domain,
    /// The semantic field this record targets.
    pub field: SemanticField,
    /// The locator itself.
    pub locator: Locator,
    /// Free-form provenance context (e.g. the candidate's reason tag).
    pub context: String,
    /// Times this record was read and used for an extraction attempt.
    pub usage_count: u64,
    /// Times an extraction using this record succeeded.
    pub success_count: u64,
    /// Times an extraction using this record failed.
    pub failure_count: u64,
    /// Current reliability estimate, always in `[0, 1]`.
    pub confidence: f64,
    /// Whether this record is eligible to be returned by a cache read.
    pub active: bool,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// Last time this record was read for an extraction attempt.
    pub last_used: DateTime<Utc>,
    /// Last time this record's confidence was updated by `record_result`.
    pub last_validated: DateTime<Utc>,
}

impl LocatorRecord {
    /// Construct a fresh record for a newly-discovered, newly-validated locator.
    pub fn new(domain: Domain, field: SemanticField, locator: Locator, context: impl Into<String>, initial_confidence: f64) -> Self {
        let now = Utc::now();
        Self {
            domain,
            field,
            locator,
            context: context.into(),
            usage_count: 0,
            success_count: 0,
            failure_count: 0,
            confidence: initial_confidence.clamp(0.0, 1.0),
            active: true,
            created_at: now,
            last_used: now,
            last_validated: now,
        }
    }

    /// Total observations recorded against this record.
    pub fn observations(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// §8 invariant check: useful in tests and as a debug assertion point.
    pub fn invariants_hold(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
            && self.success_count + self.failure_count <= self.usage_count
            && (!self.active || self.confidence >= DEACTIVATION_CONFIDENCE)
    }

    /// Update reliability after an extraction attempt (§4.6 `record_result`, §8).
    ///
    /// Moves confidence by ±[`CONFIDENCE_STEP`], clamps to `[0, 1]`, and
    /// deactivates the record once `observations() >= DEACTIVATION_MIN_OBSERVATIONS`
    /// and the new confidence is below [`DEACTIVATION_CONFIDENCE`].
    pub fn record_result(&mut self, success: bool) {
        self.usage_count += 1;
        if success {
            self.success_count += 1;
            self.confidence = (self.confidence + CONFIDENCE_STEP).clamp(0.0, 1.0);
        } else {
            self.failure_count += 1;
            self.confidence = (self.confidence - CONFIDENCE_STEP).clamp(0.0, 1.0);
        }
        self.last_used = Utc::now();
        self.last_validated = self.last_used;

        if self.observations() >= DEACTIVATION_MIN_OBSERVATIONS && self.confidence < DEACTIVATION_CONFIDENCE {
            self.active = false;
        }
    }

    /// `upsert` merge semantics (§4.6): bump usage/discovery bookkeeping and
    /// union in the incoming locator's alternatives.
    pub fn upsert_merge(&mut self, incoming: &Locator, incoming_context: &str) {
        self.locator.merge_alternatives(incoming);
        self.usage_count += 1;
        if self.context.is_empty() {
            self.context = incoming_context.to_string();
        }
    }

    /// §4.6 `cleanup`: deactivate stale or chronically low-confidence records.
    pub fn cleanup_if_stale(&mut self, age_days: i64, min_confidence: f64) {
        let age = Utc::now().signed_duration_since(self.last_used);
        if age.num_days() >= age_days {
            self.active = false;
            return;
        }
        if self.observations() >= DEACTIVATION_MIN_OBSERVATIONS && self.confidence < min_confidence {
            self.active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_locator() -> Locator {
        Locator::new("#add-to-cart", vec![], DiscoveryMethod::Dom, Category::Status, 1).unwrap()
    }

    #[test]
    fn locator_rejects_zero_matches() {
        let err = Locator::new(".btn", vec![], DiscoveryMethod::Dom, Category::Status, 0).unwrap_err();
        assert!(matches!(err, AsieError::NoMatch(_)));
    }

    #[test]
    fn locator_rejects_empty_selector() {
        let err = Locator::new("   ", vec![], DiscoveryMethod::Dom, Category::Status, 1).unwrap_err();
        assert!(matches!(err, AsieError::SelectorInvalid(_)));
    }

    #[test]
    fn merge_alternatives_is_a_set_union() {
        let mut a = sample_locator();
        let mut b = sample_locator();
        b.selector = "button[type=submit]".to_string();
        b.alternatives = vec!["#add-to-cart".to_string(), ".buy-now".to_string()];
        a.merge_alternatives(&b);
        assert!(a.alternatives.contains(&"button[type=submit]".to_string()));
        assert!(a.alternatives.contains(&".buy-now".to_string()));
        // the dedupe must not re-add a's own selector as an alternative.
        assert!(!a.alternatives.contains(&"#add-to-cart".to_string()));
    }

    #[test]
    fn record_result_moves_confidence_by_bounded_step() {
        let mut r = LocatorRecord::new(
            Domain::from_host("shop.example.com"),
            SemanticField::Availability,
            sample_locator(),
            "submit inside cart form",
            0.5,
        );
        r.record_result(true);
        assert!((r.confidence - 0.6).abs() < 1e-9);
        r.record_result(false);
        assert!((r.confidence - 0.5).abs() < 1e-9);
        assert!(r.invariants_hold());
    }

    #[test]
    fn deactivates_after_ten_low_confidence_observations() {
        let mut r = LocatorRecord::new(
            Domain::from_host("shop.example.com"),
            SemanticField::Price,
            sample_locator(),
            "",
            0.35,
        );
        for _ in 0..10 {
            r.record_result(false);
        }
        assert!(r.observations() >= DEACTIVATION_MIN_OBSERVATIONS);
        assert!(r.confidence < DEACTIVATION_CONFIDENCE);
        assert!(!r.active);
        assert!(r.invariants_hold());
    }

    #[test]
    fn idempotent_flip_bounds_confidence_delta() {
        let mut r = LocatorRecord::new(
            Domain::from_host("shop.example.com"),
            SemanticField::Title,
            sample_locator(),
            "",
            0.7,
        );
        let before = r.confidence;
        r.record_result(true);
        r.record_result(false);
        let delta = (r.confidence - before).abs();
        assert!(delta <= 0.2 + 1e-9);
    }

    #[test]
    fn serde_round_trip_preserves_equality() {
        let r = LocatorRecord::new(
            Domain::from_host("shop.example.com"),
            SemanticField::Title,
            sample_locator(),
            "h1 in product region",
            0.9,
        );
        let json = serde_json::to_string(&r).unwrap();
        let back: LocatorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.domain, r.domain);
        assert_eq!(back.field, r.field);
        assert_eq!(back.locator, r.locator);
        assert_eq!(back.confidence, r.confidence);
        assert_eq!(back.active, r.active);
    }
}
