//! The in-page half of C3/C5 (§4.3, §4.5), done in Rust instead of assuming
//! a page-injected global: parses a serialized DOM snapshot and runs the
//! selector-synthesis and per-field/per-layer discovery heuristics directly
//! against it.
//!
//! Parsing uses `scraper` — the public crate the teacher's own vendored,
//! modified `packages::scraper` module is itself forked from — rather than
//! re-vendoring that fork. `lol_html`, the teacher's other HTML dependency,
//! is a streaming one-pass rewriter with no selector-uniqueness-testing or
//! ancestor-traversal API, which §4.3's synthesis rules and §4.5's
//! structural-clustering layer both need.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::browser::Browser;
use crate::candidates::{looks_like_price, RawCandidate};
use crate::domain::SemanticField;
use crate::error::Result;
use crate::locator::DiscoveryMethod;
use crate::variant::{ControlType, RawVariantGroup, RawVariantOption, VariantKey};

lazy_static! {
    static ref FONT_SIZE_RE: Regex = Regex::new(r"font-size\s*:\s*(\d+(?:\.\d+)?)px").expect("static regex");
}

/// The script dispatched through [`Browser::evaluate`] to obtain the page's
/// current serialized markup. Every routine below analyzes that markup in
/// Rust; no backend is asked to run any page-injected discovery logic.
pub const DOM_SNAPSHOT_SCRIPT: &str = "document.documentElement.outerHTML";

/// Fetch and parse the live page's current markup (§4.3, §4.5 shared entry point).
pub async fn capture_document(browser: &dyn Browser) -> Result<Html> {
    let value = browser.evaluate(DOM_SNAPSHOT_SCRIPT, Value::Null).await?;
    let html = match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Ok(Html::parse_document(&html))
}

fn count_matches(doc: &Html, selector_str: &str) -> usize {
    match Selector::parse(selector_str) {
        Ok(sel) => doc.select(&sel).count(),
        Err(_) => 0,
    }
}

/// Escape a class/id fragment for use inside a CSS selector.
fn escape_ident(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

fn tag_and_first_class(el: ElementRef) -> String {
    let value = el.value();
    let mut s = value.name().to_string();
    if let Some(class) = value.classes().next() {
        s.push('.');
        s.push_str(&escape_ident(class));
    }
    s
}

/// §4.3 selector synthesis: `#id` -> escaped class combo -> `data-*`
/// predicates -> ancestor path up to 3 levels, first unique match wins.
/// Falls back to the best ancestor path built along the way if nothing
/// proved unique.
pub fn synthesize_selector(doc: &Html, el: ElementRef) -> String {
    let value = el.value();

    if let Some(id) = value.id() {
        if !id.is_empty() && !id.starts_with(|c: char| c.is_ascii_digit()) {
            let candidate = format!("#{}", escape_ident(id));
            if count_matches(doc, &candidate) == 1 {
                return candidate;
            }
        }
    }

    let classes: Vec<&str> = value.classes().collect();
    for class in &classes {
        let candidate = format!(".{}", escape_ident(class));
        if count_matches(doc, &candidate) == 1 {
            return candidate;
        }
    }
    if classes.len() >= 2 {
        let candidate = format!(".{}.{}", escape_ident(classes[0]), escape_ident(classes[1]));
        if count_matches(doc, &candidate) == 1 {
            return candidate;
        }
    }

    let data_attrs: Vec<(&str, &str)> = value.attrs().filter(|(k, _)| k.starts_with("data-")).take(2).collect();
    if !data_attrs.is_empty() {
        let mut candidate = value.name().to_string();
        for (k, v) in &data_attrs {
            candidate.push_str(&format!("[{k}=\"{}\"]", v.replace('"', "\\\"")));
        }
        if count_matches(doc, &candidate) == 1 {
            return candidate;
        }
    }

    let mut segments = vec![tag_and_first_class(el)];
    for ancestor in el.ancestors().take(3) {
        segments.push(tag_and_first_class(ancestor));
        let candidate = segments.iter().rev().cloned().collect::<Vec<_>>().join(" > ");
        if count_matches(doc, &candidate) == 1 {
            return candidate;
        }
    }

    segments.iter().rev().cloned().collect::<Vec<_>>().join(" > ")
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<Vec<_>>().join("").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

fn is_noise(el: ElementRef) -> bool {
    if matches!(el.value().name(), "nav" | "header" | "footer" | "script" | "style") {
        return true;
    }
    el.ancestors().any(|a| matches!(a.value().name(), "nav" | "header" | "footer"))
}

fn candidate(doc: &Html, el: ElementRef, confidence: f64, reason: &str, sample: &str) -> RawCandidate {
    RawCandidate {
        selector: synthesize_selector(doc, el),
        confidence,
        reason: reason.to_string(),
        sample: Some(truncate(sample, 160)),
        observed_matches: 1,
        discovery_method: DiscoveryMethod::Dom,
    }
}

/// **title** (§4.3): first visible `h1` in the product region (0.9),
/// semantic-class fallbacks otherwise.
fn title_candidates(doc: &Html) -> Vec<RawCandidate> {
    let mut out = Vec::new();
    if let Ok(sel) = Selector::parse("h1") {
        for (i, el) in doc.select(&sel).enumerate() {
            if is_noise(el) {
                continue;
            }
            let text = element_text(el);
            if text.is_empty() {
                continue;
            }
            let confidence = if i == 0 { 0.9 } else { 0.6 };
            out.push(candidate(doc, el, confidence, "h1-in-product-region", &text));
        }
    }
    for hint in ["product-title", "product-name", "pdp-title"] {
        if let Ok(sel) = Selector::parse(&format!(".{hint}")) {
            for el in doc.select(&sel) {
                if is_noise(el) {
                    continue;
                }
                let text = element_text(el);
                if text.is_empty() {
                    continue;
                }
                out.push(candidate(doc, el, 0.5, "semantic-class-fallback", &text));
            }
        }
    }
    out
}

fn font_size_boosts(style: Option<&str>) -> bool {
    style
        .and_then(|s| FONT_SIZE_RE.captures(s))
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|size| size > 14.0)
        .unwrap_or(false)
}

/// **price**/**original_price** (§4.3): leaf nodes matching the currency
/// regex; font size > 14 or a `price`-ish class boosts confidence to 0.8.
fn price_candidates(doc: &Html) -> Vec<RawCandidate> {
    let mut out = Vec::new();
    let Ok(sel) = Selector::parse("*") else { return out };
    for el in doc.select(&sel) {
        if is_noise(el) {
            continue;
        }
        if el.children().any(|c| scraper::Node::is_element(c.value())) {
            continue;
        }
        let text = element_text(el);
        if text.is_empty() || text.len() > 40 || !looks_like_price(&text) {
            continue;
        }
        let value = el.value();
        let boosted = font_size_boosts(value.attr("style")) || value.classes().any(|c| c.to_ascii_lowercase().contains("price"));
        let confidence = if boosted { 0.8 } else { 0.6 };
        out.push(candidate(doc, el, confidence, "currency-pattern-leaf", &text));
    }
    out
}

fn is_logo_or_icon(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    lower.contains("logo") || lower.contains("icon") || lower.contains("favicon") || lower.ends_with(".svg")
}

/// **images** (§4.3): visible `img` with intrinsic area > 10 000 px²,
/// excluding logo/icon filenames.
fn image_candidates(doc: &Html) -> Vec<RawCandidate> {
    let mut out = Vec::new();
    let Ok(sel) = Selector::parse("img") else { return out };
    for el in doc.select(&sel) {
        if is_noise(el) {
            continue;
        }
        let value = el.value();
        let Some(src) = value.attr("src") else { continue };
        if src.is_empty() || is_logo_or_icon(src) {
            continue;
        }
        let width = value.attr("width").and_then(|w| w.parse::<u64>().ok());
        let height = value.attr("height").and_then(|h| h.parse::<u64>().ok());
        if let (Some(w), Some(h)) = (width, height) {
            if w * h <= 10_000 {
                continue;
            }
        }
        let product_hint = value.classes().any(|c| c.to_ascii_lowercase().contains("product")) || src.to_ascii_lowercase().contains("product");
        let confidence = if product_hint { 0.85 } else { 0.55 };
        out.push(candidate(doc, el, confidence, "visible-img-in-product-region", src));
    }
    out
}

/// **description** (§4.3): visible prose blocks of 100-5000 chars outside
/// `nav/header/footer`.
fn description_candidates(doc: &Html) -> Vec<RawCandidate> {
    let mut out = Vec::new();
    for tag in ["p", "div", "section", "article"] {
        let Ok(sel) = Selector::parse(tag) else { continue };
        for el in doc.select(&sel) {
            if is_noise(el) {
                continue;
            }
            let text = element_text(el);
            let len = text.chars().count();
            if !(100..=5000).contains(&len) {
                continue;
            }
            out.push(candidate(doc, el, 0.6, "prose-block-outside-chrome", &text));
        }
    }
    out
}

const ADD_TO_CART_TOKENS: &[&str] = &["add to cart", "add to bag", "add-to-cart", "addtocart", "buy now", "buy-now"];

/// **availability** (§4.3): aggressively scores buttons by text/id/class/aria
/// containing add-to-cart-like tokens. Per Open Question (1), a submit
/// button inside `form[action*="cart"]` is the strongest signal (0.95) and is
/// accepted on its own; the token match is only a tie-breaker, never a gate,
/// for that case.
fn availability_candidates(doc: &Html) -> Vec<RawCandidate> {
    let mut out = Vec::new();
    for tag in ["button", "a", "input"] {
        let Ok(sel) = Selector::parse(tag) else { continue };
        for el in doc.select(&sel) {
            if is_noise(el) {
                continue;
            }
            let value = el.value();
            let text = element_text(el).to_ascii_lowercase();
            let id = value.id().unwrap_or("").to_ascii_lowercase();
            let class = value.classes().collect::<Vec<_>>().join(" ").to_ascii_lowercase();
            let aria = value.attr("aria-label").unwrap_or("").to_ascii_lowercase();
            let haystacks = [text.as_str(), id.as_str(), class.as_str(), aria.as_str()];
            let token_match = ADD_TO_CART_TOKENS.iter().any(|tok| haystacks.iter().any(|h| h.contains(tok)));

            let in_cart_form = el.ancestors().any(|a| {
                a.value().name() == "form" && a.value().attr("action").map(|act| act.contains("cart")).unwrap_or(false)
            });
            let is_submit = value.attr("type").map(|t| t.eq_ignore_ascii_case("submit")).unwrap_or(tag == "button");

            if !(in_cart_form && is_submit) && !token_match {
                continue;
            }

            let (confidence, reason) = if in_cart_form && is_submit {
                (0.95, "submit-inside-cart-form")
            } else {
                (0.7, "add-to-cart-token-match")
            };
            out.push(candidate(doc, el, confidence, reason, &element_text(el)));
        }
    }
    out
}

/// A light generic heuristic for fields §4.3 doesn't spell out in detail:
/// elements whose class or `itemprop` names one of `hints`.
fn class_hint_candidates(doc: &Html, hints: &[&str], reason: &str) -> Vec<RawCandidate> {
    let mut out = Vec::new();
    for hint in hints {
        let Ok(sel) = Selector::parse(&format!("[class*=\"{hint}\" i], [itemprop=\"{hint}\" i]")) else { continue };
        for el in doc.select(&sel) {
            if is_noise(el) {
                continue;
            }
            let text = element_text(el);
            if text.is_empty() {
                continue;
            }
            out.push(candidate(doc, el, 0.5, reason, &text));
        }
    }
    out
}

/// Dispatch to the per-field heuristic (§4.3). `variants`/`size`/`color` go
/// through [`discover_variant_groups`] instead (§4.5).
pub fn find_field_candidates(doc: &Html, field: SemanticField) -> Vec<RawCandidate> {
    match field {
        SemanticField::Title => title_candidates(doc),
        SemanticField::Price | SemanticField::OriginalPrice => price_candidates(doc),
        SemanticField::Images => image_candidates(doc),
        SemanticField::Description => description_candidates(doc),
        SemanticField::Availability => availability_candidates(doc),
        SemanticField::Brand => class_hint_candidates(doc, &["brand", "manufacturer"], "brand-class-hint"),
        SemanticField::Sku => class_hint_candidates(doc, &["sku", "product-code", "part-number"], "sku-class-hint"),
        SemanticField::Rating => class_hint_candidates(doc, &["rating", "stars", "review-score"], "rating-class-hint"),
        SemanticField::Variants | SemanticField::Size | SemanticField::Color => Vec::new(),
    }
}

fn control_type_for(el: ElementRef) -> ControlType {
    if el.value().name() == "select" {
        return ControlType::Dropdown;
    }
    match el.value().attr("role") {
        Some("radiogroup") | Some("listbox") | Some("group") => ControlType::AriaGroup,
        _ => ControlType::Button,
    }
}

fn options_for_select(select_el: ElementRef) -> Vec<RawVariantOption> {
    let mut out = Vec::new();
    let Ok(opt_sel) = Selector::parse("option") else { return out };
    for (i, opt) in select_el.select(&opt_sel).enumerate() {
        let value = opt.value();
        let label = element_text(opt);
        let val = value.attr("value").map(|v| v.to_string()).unwrap_or_else(|| label.clone());
        out.push(RawVariantOption {
            label: if label.is_empty() { val.clone() } else { label },
            value: val,
            index: i,
            selector: format!("option:nth-of-type({})", i + 1),
            disabled: value.attr("disabled").is_some(),
            selected: value.attr("selected").is_some(),
        });
    }
    out
}

fn options_for_container(doc: &Html, container: ElementRef) -> Vec<RawVariantOption> {
    let mut out = Vec::new();
    let Ok(opt_sel) = Selector::parse("button, input[type=radio], a, [data-value], [data-option]") else { return out };
    for (i, opt) in container.select(&opt_sel).enumerate() {
        let value = opt.value();
        let label = element_text(opt);
        let val = value
            .attr("data-value")
            .or_else(|| value.attr("value"))
            .map(|v| v.to_string())
            .unwrap_or_else(|| label.clone());
        out.push(RawVariantOption {
            label: if label.is_empty() { val.clone() } else { label },
            value: val,
            index: i,
            selector: synthesize_selector(doc, opt),
            disabled: value.attr("disabled").is_some() || value.attr("aria-disabled").map(|a| a == "true").unwrap_or(false),
            selected: value.classes().any(|c| c == "selected" || c == "active")
                || value.attr("aria-checked").map(|a| a == "true").unwrap_or(false)
                || value.attr("checked").is_some(),
        });
    }
    out
}

fn group_from_container(doc: &Html, container: ElementRef, key: VariantKey, priority: u8, confidence: f64) -> Option<RawVariantGroup> {
    let options = if container.value().name() == "select" {
        options_for_select(container)
    } else {
        options_for_container(doc, container)
    };
    if options.len() < 2 {
        return None;
    }
    Some(RawVariantGroup {
        selector: synthesize_selector(doc, container),
        key,
        control_type: control_type_for(container),
        priority,
        confidence,
        options,
    })
}

/// Layer 1, label-driven (§4.5, priority 4, confidence 0.9): a `label`/
/// `legend`/heading whose text names a variant kind, resolved to its
/// associated control via `for=`, falling back to its parent container.
fn label_driven_groups(doc: &Html) -> Vec<RawVariantGroup> {
    let mut out = Vec::new();
    let Ok(label_sel) = Selector::parse("label, legend, h2, h3") else { return out };
    for label in doc.select(&label_sel) {
        let text = element_text(label);
        if text.is_empty() {
            continue;
        }
        let key = VariantKey::classify(&text);
        if key == VariantKey::Unknown {
            continue;
        }

        let control = label
            .value()
            .attr("for")
            .and_then(|id| {
                let sel = format!("#{}", escape_ident(id));
                Selector::parse(&sel).ok().and_then(|s| doc.select(&s).next())
            })
            .or_else(|| label.parent_element());

        let Some(container) = control else { continue };
        if let Some(group) = group_from_container(doc, container, key, 4, 0.9) {
            out.push(group);
        }
    }
    out
}

/// Layer 2, accessibility (§4.5, priority 3): ARIA `radiogroup`/`listbox`/`group`
/// roles, classified by `aria-label`.
fn accessibility_groups(doc: &Html) -> Vec<RawVariantGroup> {
    let mut out = Vec::new();
    let Ok(sel) = Selector::parse("[role=radiogroup], [role=listbox], [role=group]") else { return out };
    for el in doc.select(&sel) {
        let key = VariantKey::classify(el.value().attr("aria-label").unwrap_or(""));
        if let Some(group) = group_from_container(doc, el, key, 3, 0.75) {
            out.push(group);
        }
    }
    out
}

/// Layer 3, data-attribute (§4.5, priority 2): elements carrying
/// `data-variant`/`data-variant-name`/`data-option-name`.
fn data_attribute_groups(doc: &Html) -> Vec<RawVariantGroup> {
    let mut out = Vec::new();
    let Ok(sel) = Selector::parse("[data-variant], [data-variant-name], [data-option-name]") else { return out };
    for el in doc.select(&sel) {
        let value = el.value();
        let hint = value
            .attr("data-variant-name")
            .or_else(|| value.attr("data-option-name"))
            .or_else(|| value.attr("data-variant"))
            .unwrap_or("");
        let key = VariantKey::classify(hint);
        if let Some(group) = group_from_container(doc, el, key, 2, 0.6) {
            out.push(group);
        }
    }
    out
}

/// Layer 4, structural clustering (§4.5, priority 1): a container whose
/// direct children are uniformly tagged and share a class, with no semantic
/// label/aria/data-attribute signal to go on.
fn structural_clustering_groups(doc: &Html) -> Vec<RawVariantGroup> {
    let mut out = Vec::new();
    let Ok(sel) = Selector::parse("div, ul, fieldset") else { return out };
    for container in doc.select(&sel) {
        if is_noise(container) {
            continue;
        }
        let children: Vec<ElementRef> = container.children().filter_map(ElementRef::wrap).collect();
        if children.len() < 2 {
            continue;
        }
        let first_tag = children[0].value().name();
        if !matches!(first_tag, "button" | "a" | "li" | "span") {
            continue;
        }
        let first_classes: std::collections::HashSet<&str> = children[0].value().classes().collect();
        if first_classes.is_empty() {
            continue;
        }
        let uniform = children
            .iter()
            .all(|c| c.value().name() == first_tag && !first_classes.is_disjoint(&c.value().classes().collect()));
        if !uniform {
            continue;
        }

        let options: Vec<RawVariantOption> = children
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let label = element_text(*c);
                RawVariantOption {
                    value: label.clone(),
                    label,
                    index: i,
                    selector: synthesize_selector(doc, *c),
                    disabled: c.value().attr("disabled").is_some(),
                    selected: c.value().classes().any(|cl| cl == "selected" || cl == "active"),
                }
            })
            .collect();
        if options.len() < 2 {
            continue;
        }

        out.push(RawVariantGroup {
            selector: synthesize_selector(doc, container),
            key: VariantKey::Unknown,
            control_type: ControlType::Button,
            priority: 1,
            confidence: 0.4,
            options,
        });
    }
    out
}

/// Run all four §4.5 discovery layers over `doc`. [`crate::variant::merge_groups`]
/// dedupes/ranks/orders the combined result.
pub fn discover_variant_groups(doc: &Html) -> Vec<RawVariantGroup> {
    let mut out = Vec::new();
    out.extend(label_driven_groups(doc));
    out.extend(accessibility_groups(doc));
    out.extend(data_attribute_groups(doc));
    out.extend(structural_clustering_groups(doc));
    out
}
