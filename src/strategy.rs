//! Persisted and exposed artifact types (§3, §6): what `learn_strategy`
//! produces, and what `extract`/`quick_check` return to callers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Domain, SemanticField};
use crate::locator::Locator;

/// Interaction requirements discovered while learning a strategy (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionRules {
    /// Whether this page requires JS execution to reach a stable state
    /// (always true for a headless-browser-backed engine, kept explicit for
    /// the artifact's own documentation value).
    pub requires_js: bool,
    /// Selectors the orchestrator learned are worth waiting on before
    /// sampling (e.g. a price element that renders after a fetch).
    pub wait_for_selectors: Vec<String>,
    /// Whether correctly reading `price`/`availability` requires driving a
    /// variant selection first (§4.5).
    pub interaction_required: bool,
}

/// A per-domain learned extraction artifact (§3 "ExtractionStrategy").
///
/// Lifecycle: produced only when `quality >= threshold`, or as a best-effort
/// artifact on budget exhaustion; a newer strategy always supersedes rather
/// than mutates an older one (§4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStrategy {
    /// The domain this strategy was learned for.
    pub domain: Domain,
    /// The winning locator for each field discovered during learning.
    pub selectors: HashMap<SemanticField, Locator>,
    /// A short platform tag (e.g. `"shopify"`, `"woocommerce"`, `"unknown"`),
    /// used by the `platform_specific` adaptive-retry step (§4.7).
    pub platform: String,
    /// Interaction requirements this strategy depends on.
    pub interaction_rules: InteractionRules,
    /// URL substring/regex hints learned about this domain's product pages.
    pub url_patterns: Vec<String>,
    /// The aggregate quality score in `[0, 100]` this strategy achieved.
    pub quality: f64,
    /// When this strategy was learned.
    pub learned_at: DateTime<Utc>,
    /// How many learning attempts were spent producing this strategy.
    pub attempts_required: u32,
}

impl ExtractionStrategy {
    /// The fields required by §4.7 (`title`, `price`, `images`) that this
    /// strategy is missing a selector for.
    pub fn missing_required_fields(&self) -> Vec<SemanticField> {
        [SemanticField::Title, SemanticField::Price, SemanticField::Images]
            .into_iter()
            .filter(|f| !self.selectors.contains_key(f))
            .collect()
    }

    /// Whether `quality` clears `threshold` (§4.7 step 1/3 gating condition).
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.quality >= threshold
    }
}

/// A single extracted field value, tagged with the confidence of the
/// locator that produced it (§7 "partial data with a quality score").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    /// The raw extracted value, as JSON (a string, number, or array of image URLs).
    pub value: serde_json::Value,
    /// The confidence of the [`crate::locator::LocatorRecord`] that produced it.
    pub confidence: f64,
}

/// The result of `extract(url, options)` (§6 "Exposed interfaces").
///
/// Never fails outright on a partially-broken page: missing fields are
/// reported, not propagated as an error (§7).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// The URL that was extracted.
    pub url: String,
    /// Every field successfully resolved.
    pub fields: HashMap<SemanticField, FieldValue>,
    /// Required or requested fields that could not be resolved.
    pub missing_fields: Vec<SemanticField>,
    /// `100 * resolved_weight / total_weight` across attempted fields (§4.7).
    pub quality: f64,
}

/// The result of `quick_check(url, strategy)` (§6): a light probe that never
/// fails, returning `None` per field it could not resolve (§7).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuickCheckResult {
    /// The current price text, if resolved.
    pub price: Option<String>,
    /// Whether the add-to-cart affordance is currently enabled.
    pub availability: Option<bool>,
    /// A parsed stock count, if the page exposes one.
    pub stock_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(quality: f64, selectors: HashMap<SemanticField, Locator>) -> ExtractionStrategy {
        ExtractionStrategy {
            domain: Domain::from_host("shop.example.com"),
            selectors,
            platform: "unknown".to_string(),
            interaction_rules: InteractionRules::default(),
            url_patterns: vec![],
            quality,
            learned_at: Utc::now(),
            attempts_required: 1,
        }
    }

    #[test]
    fn missing_required_fields_reports_all_three_when_empty() {
        let s = strategy(0.0, HashMap::new());
        let missing = s.missing_required_fields();
        assert_eq!(missing.len(), 3);
        assert!(missing.contains(&SemanticField::Title));
    }

    #[test]
    fn meets_threshold_is_inclusive() {
        let s = strategy(70.0, HashMap::new());
        assert!(s.meets_threshold(70.0));
        assert!(!s.meets_threshold(70.1));
    }
}
