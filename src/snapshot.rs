//! Page-State Sampler (C2, §4.2): a deterministic, comparable projection of
//! the page, plus the diff logic the validator scores interactions against.

use serde::{Deserialize, Serialize};

use crate::browser::Browser;
use crate::error::Result;

/// The single in-page evaluation a capture performs (§4.2): extracts url,
/// title, first price-pattern match, up to 3 product images, the primary
/// add-to-cart-like button's state, selected variant-like control values,
/// and `.selected`/`.active` text inside variant-ish containers.
pub const CAPTURE_SCRIPT: &str = r#"(() => {
  return window.__asie_capture_snapshot();
})()"#;

/// Capture a [`PageStateSnapshot`] via a single in-page evaluation (§4.2).
pub async fn capture(browser: &dyn Browser) -> Result<PageStateSnapshot> {
    let payload = browser.evaluate(CAPTURE_SCRIPT, serde_json::Value::Null).await?;
    Ok(serde_json::from_value(payload)?)
}

/// A single product image as captured by [`PageStateSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// The image `src` (or `currentSrc` for responsive images).
    pub src: String,
    /// The image `alt` text, if present.
    pub alt: Option<String>,
}

/// The add-to-cart-like button's observed state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AvailabilityState {
    /// Visible button text.
    pub text: Option<String>,
    /// The `disabled` DOM property.
    pub disabled: bool,
    /// The `aria-disabled` attribute, parsed as a boolean.
    pub aria_disabled: bool,
    /// The button's `class` attribute string, for diffing stock-state classes.
    pub class: Option<String>,
}

impl AvailabilityState {
    /// True when neither disablement signal is set.
    pub fn is_enabled(&self) -> bool {
        !self.disabled && !self.aria_disabled
    }
}

/// A deterministic projection of product-relevant page state at one instant
/// (§3 `PageStateSnapshot`). Never persisted; used only for comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageStateSnapshot {
    /// The page URL at capture time.
    pub url: String,
    /// The document title.
    pub title: String,
    /// The first price-pattern text match found in a short leaf element.
    pub price_text: Option<String>,
    /// Up to 3 product images, in DOM order.
    pub images: Vec<ImageRef>,
    /// The primary add-to-cart-like button's state.
    pub availability: AvailabilityState,
    /// Values of all visible, selected, variant-like form controls.
    pub selected_variant_values: Vec<String>,
    /// Text of `.selected`/`.active` elements inside variant-ish containers.
    pub selected_variant_labels: Vec<String>,
    /// Capture timestamp (milliseconds since epoch, as returned by the page).
    pub captured_at_ms: i64,
}

/// The kind of change observed between two snapshots (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The page URL changed.
    UrlChange,
    /// The sampled price text changed.
    PriceChange,
    /// The sampled image set changed.
    ImageChange,
    /// The availability button's enabled/disabled state or text changed.
    AvailabilityChange,
    /// The selected variant values/labels changed.
    VariantSelectionChange,
    /// Anything else the sampler is not specifically weighted to notice.
    Other,
}

impl ChangeKind {
    /// The confidence weight this change type contributes (§4.2).
    pub const fn weight(self) -> u32 {
        match self {
            ChangeKind::ImageChange => 40,
            ChangeKind::PriceChange => 35,
            ChangeKind::UrlChange => 30,
            ChangeKind::VariantSelectionChange => 25,
            ChangeKind::AvailabilityChange => 20,
            ChangeKind::Other => 10,
        }
    }
}

/// A single typed delta between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// The kind of change observed.
    pub kind: ChangeKind,
    /// A short human-readable description, useful for logging.
    pub description: String,
}

/// The result of comparing two [`PageStateSnapshot`]s: the changes observed
/// and their combined, clamped confidence (§4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    /// Every distinct change detected, in no particular order.
    pub changes: Vec<Change>,
    /// The combined confidence, clamped to `[0, 100]`.
    pub confidence: u32,
}

impl Diff {
    /// True when at least one change was observed.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// True when a change of the given kind was observed.
    pub fn has_kind(&self, kind: ChangeKind) -> bool {
        self.changes.iter().any(|c| c.kind == kind)
    }
}

/// Compare two snapshots and produce a [`Diff`] (§4.2).
///
/// Confidence is the sum of each distinct change kind's weight, plus a +15
/// bonus when two or more distinct kinds changed, clamped to `[0, 100]`.
pub fn diff(before: &PageStateSnapshot, after: &PageStateSnapshot) -> Diff {
    let mut changes = Vec::new();

    if before.url != after.url {
        changes.push(Change {
            kind: ChangeKind::UrlChange,
            description: format!("url changed from {} to {}", before.url, after.url),
        });
    }
    if before.price_text != after.price_text {
        changes.push(Change {
            kind: ChangeKind::PriceChange,
            description: format!("price text changed from {:?} to {:?}", before.price_text, after.price_text),
        });
    }
    if before.images != after.images {
        changes.push(Change {
            kind: ChangeKind::ImageChange,
            description: "product image set changed".to_string(),
        });
    }
    if before.availability != after.availability {
        changes.push(Change {
            kind: ChangeKind::AvailabilityChange,
            description: "availability button state changed".to_string(),
        });
    }
    if before.selected_variant_values != after.selected_variant_values
        || before.selected_variant_labels != after.selected_variant_labels
    {
        changes.push(Change {
            kind: ChangeKind::VariantSelectionChange,
            description: "selected variant changed".to_string(),
        });
    }
    if before.title != after.title {
        changes.push(Change {
            kind: ChangeKind::Other,
            description: "title changed".to_string(),
        });
    }

    let distinct_kinds: std::collections::HashSet<ChangeKind> =
        changes.iter().map(|c| c.kind).collect();
    let mut confidence: u32 = distinct_kinds.iter().map(|k| k.weight()).sum();
    if distinct_kinds.len() >= 2 {
        confidence += 15;
    }
    let confidence = confidence.min(100);

    Diff { changes, confidence }
}
