//! Interactive Validator (C4, §4.4): exercises a candidate locator against
//! the live page, diffs before/after snapshots, and scores confidence.

use std::future::Future;

use crate::browser::{Browser, ElementHandle};
use crate::candidates::Candidate;
use crate::config::Config;
use crate::domain::Category;
use crate::error::Result;
use crate::snapshot::{self, Change, PageStateSnapshot};

/// The outcome of validating a single candidate locator (§4.4 step 6).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Whether the candidate is considered to have "worked".
    pub works: bool,
    /// The raw interaction-driven confidence in `[0, 100]` (0 when no
    /// interaction was attempted, e.g. text/price/image fields).
    pub interaction_confidence: u32,
    /// `successful_elements / tested` across the elements exercised.
    pub reliability: f64,
    /// The changes observed across the validation run.
    pub changes: Vec<Change>,
    /// The final combined confidence in `[0, 1]` (§4.4 "Final confidence combination").
    pub final_confidence: f64,
}

impl ValidationResult {
    /// §4.4: "A locator is considered validated iff `works` and `confidence >= 30`."
    pub fn is_validated(&self) -> bool {
        self.works && self.interaction_confidence >= 30
    }

    /// §4.4 "Short-circuit": stop testing further candidates for this field.
    pub fn should_short_circuit(&self) -> bool {
        self.final_confidence >= 0.85
    }
}

/// Combine dom-derived and interaction-derived confidence (§4.4).
pub fn combine_confidence(dom_confidence: f64, interaction_confidence: u32, reliability: f64, interaction_attempted: bool) -> f64 {
    if !interaction_attempted {
        return (0.6 * dom_confidence).clamp(0.0, 1.0);
    }
    (0.4 * dom_confidence + 0.6 * (interaction_confidence as f64 / 100.0) + 0.1 * reliability).clamp(0.0, 1.0)
}

/// Resolve the minimal field-appropriate action for a category and perform
/// it on one element, returning whether the action itself succeeded
/// (distinct from whether it produced an observable page change).
async fn perform_action(browser: &dyn Browser, category: Category, handle: &ElementHandle) -> Result<()> {
    match category {
        Category::Options => browser.select_by_index(handle, 1).await,
        Category::Status => browser.click(handle).await,
        Category::Text | Category::Price | Category::Image => Ok(()),
    }
}

/// Validate a candidate (§4.4).
///
/// `preselect` is an optional one-shot future run when the category is
/// [`Category::Status`] and the availability button is currently disabled —
/// it should drive whatever variant pre-selection (§4.5) is needed before
/// the click is retried.
pub async fn validate<F>(
    browser: &dyn Browser,
    candidate: &Candidate,
    config: &Config,
    preselect: Option<F>,
) -> Result<ValidationResult>
where
    F: Future<Output = Result<()>>,
{
    let category = candidate.category();
    let interaction_attempted = !matches!(category, Category::Text | Category::Price | Category::Image);

    let initial_before = snapshot::capture(browser).await?;

    if !interaction_attempted {
        let content_present = has_sampled_content(category, &initial_before, candidate);
        let final_confidence = combine_confidence(candidate.raw.confidence, 0, 0.0, false);
        return Ok(ValidationResult {
            works: content_present,
            interaction_confidence: 0,
            reliability: if content_present { 1.0 } else { 0.0 },
            changes: Vec::new(),
            final_confidence,
        });
    }

    if category == Category::Status && !initial_before.availability.is_enabled() {
        if let Some(fut) = preselect {
            fut.await?;
        }
    }

    let handles = browser.query(&candidate.raw.selector).await?;
    let cap = config.max_validation_elements.max(1);
    let mut tested = 0usize;
    let mut successful = 0usize;
    let mut rolling_before = initial_before.clone();
    let mut action_failed = false;

    for handle in handles.iter().take(cap) {
        tested += 1;
        match perform_action(browser, category, handle).await {
            Ok(()) => {
                tokio::time::timeout(config.validation_wait, poll_for_change(browser, &rolling_before))
                    .await
                    .unwrap_or(Ok(rolling_before.clone()))
                    .map(|after| {
                        let d = snapshot::diff(&rolling_before, &after);
                        if d.has_changes() {
                            successful += 1;
                        }
                        rolling_before = after;
                    })
                    .ok();
            }
            Err(_) => {
                action_failed = true;
            }
        }
    }

    if tested == 0 {
        action_failed = true;
    }

    if action_failed && successful == 0 {
        return Ok(ValidationResult {
            works: false,
            interaction_confidence: 0,
            reliability: 0.0,
            changes: Vec::new(),
            final_confidence: combine_confidence(candidate.raw.confidence, 0, 0.0, false),
        });
    }

    let final_diff = snapshot::diff(&initial_before, &rolling_before);
    let reliability = if tested == 0 { 0.0 } else { successful as f64 / tested as f64 };
    let final_confidence = combine_confidence(candidate.raw.confidence, final_diff.confidence, reliability, true);

    Ok(ValidationResult {
        works: final_diff.has_changes(),
        interaction_confidence: final_diff.confidence,
        reliability,
        changes: final_diff.changes,
        final_confidence,
    })
}

/// Poll `browser` for a page change relative to `baseline` with a short,
/// progressively-backing-off interval (§4.4 step 4 "progressive polling").
async fn poll_for_change(browser: &dyn Browser, baseline: &PageStateSnapshot) -> Result<PageStateSnapshot> {
    let steps = [50u64, 100, 200, 400, 750];
    let mut latest = baseline.clone();
    for step in steps {
        browser.wait_ms(step).await?;
        latest = snapshot::capture(browser).await?;
        if snapshot::diff(baseline, &latest).has_changes() {
            return Ok(latest);
        }
    }
    Ok(latest)
}

fn has_sampled_content(category: Category, snapshot: &PageStateSnapshot, candidate: &Candidate) -> bool {
    if let Some(sample) = &candidate.raw.sample {
        if !sample.trim().is_empty() {
            return true;
        }
    }
    match category {
        Category::Price => snapshot.price_text.as_deref().map(|s| !s.is_empty()).unwrap_or(false),
        Category::Image => !snapshot.images.is_empty(),
        Category::Text => !snapshot.title.trim().is_empty(),
        _ => false,
    }
}

/// Validate up to the top 3 candidates for a field, stopping early on the
/// §4.4 short-circuit and returning the best result seen (§4.7 step b).
pub async fn validate_top_candidates(
    browser: &dyn Browser,
    candidates: &[Candidate],
    config: &Config,
) -> Result<Option<(Candidate, ValidationResult)>> {
    let mut best: Option<(Candidate, ValidationResult)> = None;
    for candidate in candidates.iter().take(3) {
        let result = validate(browser, candidate, config, None::<std::future::Pending<Result<()>>>).await?;
        let is_better = best
            .as_ref()
            .map(|(_, b)| result.final_confidence > b.final_confidence)
            .unwrap_or(true);
        let short_circuit = result.should_short_circuit();
        if is_better {
            best = Some((candidate.clone(), result));
        }
        if short_circuit {
            break;
        }
    }
    Ok(best)
}
