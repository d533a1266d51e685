//! Variant Model & Sweeper (C5, §4.5): discovers the page's variant-control
//! groups, normalizes them into an arena, and exhaustively sweeps option
//! combinations to learn cross-group availability dependencies.

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::browser::{Browser, ElementHandle};
use crate::config::Config;
use crate::dom;
use crate::error::{AsieError, Result};
use crate::snapshot::{self, ChangeKind, PageStateSnapshot};

lazy_static! {
    static ref VARIANT_URL_PARAM_RE: Regex = Regex::new(r"variant=\d+").expect("static regex");
    static ref VARIANT_NETWORK_RE: Regex =
        Regex::new(r"(?i)variant|graphql.*(product|variant|options)|cart/(add|change|update)")
            .expect("static regex");
}

/// The semantic key a discovered group was classified under (§4.5 group
/// ordering: `color -> style -> size -> others`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VariantKey {
    /// A color/colour variant group.
    Color,
    /// A style/finish variant group.
    Style,
    /// A size variant group.
    Size,
    /// Anything that didn't classify as the above.
    Unknown,
}

impl VariantKey {
    /// Lower is earlier in sweep order (§4.5 "color most often gates size availability").
    pub const fn sweep_priority(self) -> u8 {
        match self {
            VariantKey::Color => 0,
            VariantKey::Style => 1,
            VariantKey::Size => 2,
            VariantKey::Unknown => 3,
        }
    }

    /// Classify a label/aria-label/container-class string into a [`VariantKey`]
    /// (§4.5 layers 1-4 all funnel into this same word-matching heuristic).
    pub fn classify(text: &str) -> VariantKey {
        let lower = text.to_ascii_lowercase();
        if lower.contains("color") || lower.contains("colour") {
            VariantKey::Color
        } else if lower.contains("style") || lower.contains("finish") || lower.contains("swatch") {
            VariantKey::Style
        } else if lower.contains("size") {
            VariantKey::Size
        } else {
            VariantKey::Unknown
        }
    }
}

/// How a variant group's options are presented (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ControlType {
    /// A native `<select>`.
    Dropdown,
    /// A radio-button group.
    Radio,
    /// A set of plain buttons acting as a radio group.
    Button,
    /// Swatch-style clickable elements (e.g. color chips).
    Swatch,
    /// An ARIA `radiogroup`/`listbox`/`group` role.
    AriaGroup,
}

/// One variant option before it has been placed into a [`VariantModel`]'s arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVariantOption {
    /// Visible label text.
    pub label: String,
    /// The underlying value (e.g. a `data-value` or `<option value>`).
    pub value: String,
    /// Positional index within its group, used as the re-selector fallback.
    pub index: usize,
    /// An attribute-preferring selector for this specific option.
    pub selector: String,
    /// Whether this option is currently disabled.
    pub disabled: bool,
    /// Whether this option is currently selected.
    pub selected: bool,
}

/// One discovered variant group before merging/ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVariantGroup {
    /// The group's container/selector family.
    pub selector: String,
    /// The classified semantic key.
    pub key: VariantKey,
    /// The control presentation.
    pub control_type: ControlType,
    /// Discovery-layer priority (label=4, aria=3, data-attr=2, structural=1).
    pub priority: u8,
    /// Discovery-layer base confidence.
    pub confidence: f64,
    /// This group's options, in DOM order.
    pub options: Vec<RawVariantOption>,
}

/// A variant option inside a [`VariantModel`]'s arena. References its owning
/// group by index; groups never reference options by pointer, only by index
/// (§9 "cyclic group<->options graph... arena + index, no back-references").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantOption {
    /// Index of the owning [`VariantGroup`] in [`VariantModel::groups`].
    pub group_index: usize,
    /// Visible label text.
    pub label: String,
    /// The underlying value.
    pub value: String,
    /// Positional index within its group.
    pub index: usize,
    /// An attribute-preferring selector for this option.
    pub selector: String,
    /// Whether this option is currently disabled.
    pub disabled: bool,
    /// Whether this option is currently selected.
    pub selected: bool,
}

/// A normalized variant group inside a [`VariantModel`]'s arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantGroup {
    /// The classified semantic key.
    pub key: VariantKey,
    /// The control presentation.
    pub control_type: ControlType,
    /// The group's container/selector family.
    pub selector: String,
    /// Indices into [`VariantModel::options`] belonging to this group, in DOM order.
    pub option_indices: Vec<usize>,
    /// Discovery-layer priority this group survived merging with.
    pub priority: u8,
    /// Discovery-layer confidence this group survived merging with.
    pub confidence: f64,
}

/// The normalized model of a page's variant controls (§3, §4.5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantModel {
    /// Groups, already ordered for sweeping (`color -> style -> size -> others`).
    pub groups: Vec<VariantGroup>,
    /// The option arena; groups reference into this by index.
    pub options: Vec<VariantOption>,
}

impl VariantModel {
    /// The live option list for a group (§3 `get_options()`).
    pub fn get_options(&self, group_index: usize) -> Vec<&VariantOption> {
        self.groups
            .get(group_index)
            .map(|g| g.option_indices.iter().filter_map(|&i| self.options.get(i)).collect())
            .unwrap_or_default()
    }

    /// §8 invariant check: every option index is in bounds, and options
    /// within a group are pairwise-distinct by `(value, label)`.
    pub fn invariants_hold(&self) -> bool {
        for (group_index, group) in self.groups.iter().enumerate() {
            let options = self.get_options(group_index);
            for option in &options {
                if option.index >= options.len() {
                    return false;
                }
            }
            let mut seen = std::collections::HashSet::new();
            for option in &options {
                if !seen.insert((&option.value, &option.label)) {
                    return false;
                }
            }
            let _ = group;
        }
        true
    }
}

/// Build a [`VariantModel`] from the live page (§4.5 `build_model`): captures
/// the page's current markup and runs all four discovery layers
/// ([`dom::discover_variant_groups`]) over it, then merges/ranks the result.
pub async fn build_model(browser: &dyn Browser) -> Result<VariantModel> {
    let doc = dom::capture_document(browser).await?;
    let raw = dom::discover_variant_groups(&doc);
    Ok(merge_groups(raw))
}

fn better(a: &RawVariantGroup, b: &RawVariantGroup) -> bool {
    (a.priority, ordered(a.confidence), a.options.len()) > (b.priority, ordered(b.confidence), b.options.len())
}

/// `f64` has no total order; variant confidence is always finite and in
/// `[0, 1]`, so this bit-for-bit total order is safe for ranking purposes.
fn ordered(x: f64) -> u64 {
    (x.clamp(0.0, 1.0) * 1_000_000.0) as u64
}

/// The pure dedupe/rank/order step of [`build_model`], split out for direct
/// testability: dedupe by selector keeping the best-ranked duplicate, order
/// survivors by `(priority, confidence, option_count)` descending, cap at
/// 10, then reorder for sweeping by `color -> style -> size -> others`.
pub fn merge_groups(raw: Vec<RawVariantGroup>) -> VariantModel {
    let mut by_selector: std::collections::HashMap<String, RawVariantGroup> = std::collections::HashMap::new();
    for group in raw {
        match by_selector.entry(group.selector.clone()) {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                if better(&group, slot.get()) {
                    slot.insert(group);
                }
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(group);
            }
        }
    }

    let mut groups: Vec<RawVariantGroup> = by_selector.into_values().collect();
    groups.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| ordered(b.confidence).cmp(&ordered(a.confidence)))
            .then_with(|| b.options.len().cmp(&a.options.len()))
    });
    groups.truncate(10);
    groups.sort_by_key(|g| g.key.sweep_priority());

    let mut model = VariantModel::default();
    for raw_group in groups {
        let group_index = model.groups.len();
        let mut option_indices = Vec::with_capacity(raw_group.options.len());
        for raw_option in raw_group.options {
            let option_index = model.options.len();
            model.options.push(VariantOption {
                group_index,
                label: raw_option.label,
                value: raw_option.value,
                index: raw_option.index,
                selector: raw_option.selector,
                disabled: raw_option.disabled,
                selected: raw_option.selected,
            });
            option_indices.push(option_index);
        }
        model.groups.push(VariantGroup {
            key: raw_group.key,
            control_type: raw_group.control_type,
            selector: raw_group.selector,
            option_indices,
            priority: raw_group.priority,
            confidence: raw_group.confidence,
        });
    }
    model
}

/// Re-resolve an option's element: prefer the attribute-match selector,
/// falling back to a positional match within the group (§4.5 `select()`).
async fn resolve_option(browser: &dyn Browser, group: &VariantGroup, option: &VariantOption) -> Result<ElementHandle> {
    if let Some(handle) = browser.query(&option.selector).await?.into_iter().next() {
        return Ok(handle);
    }
    let fallback = format!("{} > :nth-child({})", group.selector, option.index + 1);
    browser
        .query(&fallback)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AsieError::NoMatch(option.selector.clone()))
}

/// Drive one option's selection and report whether an update was observed
/// (§4.5 `VariantOption.select()`). Framework-controlled synthetic event
/// dispatch (`input`/`change`/`click`) is part of the `select_by_index`/
/// `click` backend contract (§4.1), same as for the validator's actions.
pub async fn select_option(browser: &dyn Browser, group: &VariantGroup, option: &VariantOption, config: &Config) -> Result<bool> {
    let baseline = snapshot::capture(browser).await?;
    let handle = resolve_option(browser, group, option).await?;
    match group.control_type {
        ControlType::Dropdown => browser.select_by_index(&handle, option.index).await?,
        ControlType::Radio | ControlType::Button | ControlType::Swatch | ControlType::AriaGroup => {
            browser.click(&handle).await?
        }
    }
    wait_for_variant_update(browser, &baseline, config).await
}

/// Wait for the first observable signal that a variant selection took
/// effect (§4.5 `wait_for_variant_update`): a variant-tagged URL query
/// param, an Image/Price/VariantSelection diff, or a variant-shaped network
/// response — whichever comes first, bounded by `config.variant_update_timeout`.
pub async fn wait_for_variant_update(browser: &dyn Browser, baseline: &PageStateSnapshot, config: &Config) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + config.variant_update_timeout;
    loop {
        if let Some(event) = browser.next_network_event(Duration::from_millis(20)).await? {
            if VARIANT_NETWORK_RE.is_match(&event.url) {
                return Ok(true);
            }
        }

        let current = snapshot::capture(browser).await?;
        if current.url != baseline.url && VARIANT_URL_PARAM_RE.is_match(&current.url) {
            return Ok(true);
        }
        let diff = snapshot::diff(baseline, &current);
        if diff.has_kind(ChangeKind::ImageChange)
            || diff.has_kind(ChangeKind::PriceChange)
            || diff.has_kind(ChangeKind::VariantSelectionChange)
        {
            return Ok(true);
        }

        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        browser.wait_ms(20).await?;
    }
}

/// A single leaf of the combinatorial sweep: the path of `(group_index,
/// option_index_within_group)` taken to reach it, and whether the
/// availability affordance was enabled there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    /// The selections applied, in group order.
    pub path: Vec<(usize, usize)>,
    /// Whether the add-to-cart affordance was enabled at this leaf.
    pub availability_enabled: bool,
}

/// Sweep-level bookkeeping (§4.5 `{groups[], combinations[], stats}`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepStats {
    /// Combinations actually exercised.
    pub tested: usize,
    /// Of those, how many left availability enabled.
    pub available: usize,
    /// Groups considered (after the top-10 merge cap).
    pub groups_considered: usize,
}

/// The outcome of [`enumerate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    /// The model's groups, unchanged (carried for convenience).
    pub groups: Vec<VariantGroup>,
    /// Every leaf combination exercised, in traversal order.
    pub combinations: Vec<Combination>,
    /// Summary counters.
    pub stats: SweepStats,
}

impl SweepResult {
    /// §4.5 "Derived invariant": a group has an inter-group dependency iff
    /// fewer combinations left availability enabled than were tested.
    pub fn has_inter_group_dependency(&self) -> bool {
        self.stats.available < self.stats.tested
    }
}

/// Depth-first sweep of every option combination across `model.groups`,
/// bounded by a per-group cap (`config.sweep_group_cap`) and an absolute
/// combination cap (`config.sweep_combo_cap`) (§4.5 `enumerate`).
///
/// At each leaf the *entire* path is re-applied from the root, tolerating
/// re-renders that may have reset earlier selections.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub async fn enumerate(browser: &dyn Browser, model: &VariantModel, config: &Config) -> Result<SweepResult> {
    let groups_considered = model.groups.len();

    if model.groups.is_empty() || config.sweep_combo_cap == 0 {
        return Ok(SweepResult {
            groups: model.groups.clone(),
            combinations: Vec::new(),
            stats: SweepStats { tested: 0, available: 0, groups_considered },
        });
    }

    let capped_counts: Vec<usize> = model
        .groups
        .iter()
        .map(|g| g.option_indices.len().min(config.sweep_group_cap.max(1)).max(1))
        .collect();
    let mut indices = vec![0usize; model.groups.len()];
    let mut combinations = Vec::new();

    'outer: loop {
        if combinations.len() >= config.sweep_combo_cap {
            break;
        }

        let mut path = Vec::with_capacity(model.groups.len());
        for (group_index, group) in model.groups.iter().enumerate() {
            let option_slot = indices[group_index];
            if let Some(&option_arena_index) = group.option_indices.get(option_slot) {
                let option = &model.options[option_arena_index];
                let _ = select_option(browser, group, option, config).await;
                path.push((group_index, option_slot));
            }
        }

        let snap = snapshot::capture(browser).await?;
        combinations.push(Combination { path, availability_enabled: snap.availability.is_enabled() });

        let mut carry_pos = model.groups.len();
        loop {
            if carry_pos == 0 {
                break 'outer;
            }
            carry_pos -= 1;
            indices[carry_pos] += 1;
            if indices[carry_pos] < capped_counts[carry_pos] {
                break;
            }
            indices[carry_pos] = 0;
            if carry_pos == 0 {
                break 'outer;
            }
        }
    }

    let available = combinations.iter().filter(|c| c.availability_enabled).count();
    let tested = combinations.len();
    Ok(SweepResult {
        groups: model.groups.clone(),
        combinations,
        stats: SweepStats { tested, available, groups_considered },
    })
}
