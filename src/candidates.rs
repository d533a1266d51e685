//! DOM Candidate Finder (C3, §4.3): proposes up to 5 scored locator
//! candidates per [`SemanticField`] from an in-page structural analysis.
//!
//! The actual selector synthesis and per-field heuristics live in
//! [`crate::dom`], running against a DOM snapshot captured through
//! [`Browser::evaluate`]. This module owns the part downstream of that:
//! parsing/normalizing matched text and applying the ranking/ordering rule.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::browser::Browser;
use crate::dom;
use crate::domain::{Category, SemanticField};
use crate::error::Result;
use crate::locator::DiscoveryMethod;

lazy_static! {
    /// The currency regex the `price` heuristic restricts leaf nodes to (§4.3).
    static ref PRICE_RE: Regex = Regex::new(r"(?P<symbol>[$€£¥])\s?(?P<amount>\d+(?:[.,]\d{1,2})?)").expect("static regex");
}

/// Whether `text` contains a currency-prefixed amount (§4.2/§4.3). Shared
/// with [`crate::dom`]'s `price` heuristic so both sides agree on exactly
/// what counts as price-shaped text.
pub(crate) fn looks_like_price(text: &str) -> bool {
    PRICE_RE.is_match(text)
}

/// Parse a sampled price string into minor units (cents) and an ISO 4217
/// currency code (§8 scenario 5). Returns `None` if no currency-prefixed
/// amount is found.
pub fn normalize_price(text: &str) -> Option<(i64, String)> {
    let caps = PRICE_RE.captures(text)?;
    let amount: f64 = caps["amount"].replace(',', ".").parse().ok()?;
    let currency = match &caps["symbol"] {
        "€" => "EUR",
        "£" => "GBP",
        "¥" => "JPY",
        _ => "USD",
    };
    Some(((amount * 100.0).round() as i64, currency.to_string()))
}

/// A single candidate locator before ranking, exactly as reported by the
/// in-page analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    /// The synthesized selector.
    pub selector: String,
    /// Raw confidence in `[0, 1]` assigned by the per-field heuristic.
    pub confidence: f64,
    /// A short tag explaining why this candidate was proposed (e.g. `"h1-in-product-region"`).
    pub reason: String,
    /// A short sample of the matched content, for logging/debugging.
    pub sample: Option<String>,
    /// How many elements this selector resolved to when it was synthesized.
    pub observed_matches: usize,
    /// How the candidate was discovered.
    pub discovery_method: DiscoveryMethod,
}

/// A ranked candidate, ready for the validator (§4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// The candidate's raw payload.
    pub raw: RawCandidate,
    /// The field this candidate targets.
    pub field: SemanticField,
}

impl Candidate {
    /// The validation category for this candidate's field.
    pub fn category(&self) -> Category {
        self.field.category()
    }
}

/// Capture the page's current markup and apply the §4.3 in-page heuristic
/// for `field`, then the ordering rule: sort by descending confidence, ties
/// broken by shorter selector, then by earlier DOM order.
pub async fn find_candidates(browser: &dyn Browser, field: SemanticField) -> Result<Vec<Candidate>> {
    let doc = dom::capture_document(browser).await?;
    let raw = dom::find_field_candidates(&doc, field);
    Ok(rank_candidates(raw, field))
}

/// The pure ranking/ordering step, split out from [`find_candidates`] so it
/// is directly testable without a [`Browser`].
pub fn rank_candidates(mut raw: Vec<RawCandidate>, field: SemanticField) -> Vec<Candidate> {
    // DOM order is the input order; record it before sorting so ties can
    // fall back to it after a stable sort disturbs relative order.
    let dom_order: std::collections::HashMap<String, usize> = raw
        .iter()
        .enumerate()
        .map(|(i, c)| (c.selector.clone(), i))
        .collect();

    raw.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.selector.len().cmp(&b.selector.len()))
            .then_with(|| {
                dom_order
                    .get(&a.selector)
                    .cmp(&dom_order.get(&b.selector))
            })
    });

    raw.into_iter()
        .take(5)
        .map(|raw| Candidate { raw, field })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(selector: &str, confidence: f64) -> RawCandidate {
        RawCandidate {
            selector: selector.to_string(),
            confidence,
            reason: "test".to_string(),
            sample: None,
            observed_matches: 1,
            discovery_method: DiscoveryMethod::Dom,
        }
    }

    #[test]
    fn sorts_by_descending_confidence() {
        let raw = vec![candidate(".a", 0.5), candidate(".b", 0.9), candidate(".c", 0.7)];
        let ranked = rank_candidates(raw, SemanticField::Title);
        let selectors: Vec<_> = ranked.iter().map(|c| c.raw.selector.clone()).collect();
        assert_eq!(selectors, vec![".b", ".c", ".a"]);
    }

    #[test]
    fn ties_break_by_shorter_selector_then_dom_order() {
        let raw = vec![
            candidate("div.product h1.title", 0.8),
            candidate("h1", 0.8),
            candidate(".title", 0.8),
        ];
        let ranked = rank_candidates(raw, SemanticField::Title);
        let selectors: Vec<_> = ranked.iter().map(|c| c.raw.selector.clone()).collect();
        assert_eq!(selectors, vec!["h1", ".title", "div.product h1.title"]);
    }

    #[test]
    fn caps_at_five_candidates() {
        let raw: Vec<_> = (0..10).map(|i| candidate(&format!(".c{i}"), 0.1 * i as f64)).collect();
        let ranked = rank_candidates(raw, SemanticField::Images);
        assert_eq!(ranked.len(), 5);
        // highest confidence ones survive
        assert_eq!(ranked[0].raw.selector, ".c9");
    }

    #[tokio::test]
    async fn find_candidates_handles_an_empty_page() {
        let browser = crate::testing::FakeBrowser::new();
        let candidates = find_candidates(&browser, SemanticField::Brand).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn normalize_price_reads_dollar_amount_into_cents() {
        let (minor_units, currency) = normalize_price("$129.00").unwrap();
        assert_eq!(minor_units, 12900);
        assert_eq!(currency, "USD");
    }

    #[test]
    fn normalize_price_recognizes_euro_and_pound() {
        assert_eq!(normalize_price("€19,99").unwrap(), (1999, "EUR".to_string()));
        assert_eq!(normalize_price("£5").unwrap(), (500, "GBP".to_string()));
    }

    #[test]
    fn normalize_price_recognizes_yen() {
        assert_eq!(normalize_price("¥1500").unwrap(), (150000, "JPY".to_string()));
    }

    #[test]
    fn normalize_price_returns_none_without_a_currency_symbol() {
        assert_eq!(normalize_price("out of stock"), None);
    }
}
