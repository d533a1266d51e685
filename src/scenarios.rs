//! End-to-end scenario tests (§8): each one exercises two or three
//! components together against a single literal page shape, rather than
//! the isolated unit coverage each module already carries on its own.

#![cfg(test)]

use crate::browser::{dismiss_popups, NetworkEvent};
use crate::candidates::{normalize_price, Candidate, RawCandidate};
use crate::config::Config;
use crate::domain::SemanticField;
use crate::locator::DiscoveryMethod;
use crate::snapshot::{AvailabilityState, PageStateSnapshot};
use crate::testing::FakeBrowser;
use crate::validator::validate;
use crate::variant::{self, ControlType, RawVariantGroup, RawVariantOption, VariantKey};

fn blank_snapshot() -> PageStateSnapshot {
    PageStateSnapshot {
        url: "https://shop.example.com/p/1".to_string(),
        title: String::new(),
        price_text: None,
        images: Vec::new(),
        availability: AvailabilityState::default(),
        selected_variant_values: Vec::new(),
        selected_variant_labels: Vec::new(),
        captured_at_ms: 0,
    }
}

/// Scenario 1: single-variant product, no `<select>`/radios at all.
#[tokio::test]
async fn single_variant_product_resolves_title_and_availability() {
    let snapshot = PageStateSnapshot {
        title: "Cocoon Shirt — Off White".to_string(),
        availability: AvailabilityState {
            text: Some("Add to cart".to_string()),
            disabled: false,
            aria_disabled: false,
            class: Some("btn btn-primary".to_string()),
        },
        ..blank_snapshot()
    };
    let browser = FakeBrowser::from_snapshot(snapshot);
    let config = Config::default();

    let title_candidate = Candidate {
        raw: RawCandidate {
            selector: "h1.product-title".to_string(),
            confidence: 0.9,
            reason: "first h1 in product region".to_string(),
            sample: Some("Cocoon Shirt — Off White".to_string()),
            observed_matches: 1,
            discovery_method: DiscoveryMethod::Dom,
        },
        field: SemanticField::Title,
    };
    let result = validate(&browser, &title_candidate, &config, None::<std::future::Pending<crate::error::Result<()>>>)
        .await
        .unwrap();
    assert!(result.works);
    assert!(result.final_confidence >= 0.3);

    let model = variant::build_model(&browser).await.unwrap();
    assert!(model.groups.is_empty());

    let snap = crate::snapshot::capture(&browser).await.unwrap();
    assert!(snap.availability.is_enabled());
}

/// Scenario 2: a size-only dropdown with three real options.
#[tokio::test]
async fn size_only_dropdown_sweeps_three_independent_combinations() {
    let browser = FakeBrowser::from_snapshot(PageStateSnapshot {
        availability: AvailabilityState { text: Some("Add to cart".to_string()), ..Default::default() },
        ..blank_snapshot()
    });
    let model = variant::merge_groups(vec![RawVariantGroup {
        selector: "select[name=size]".to_string(),
        key: VariantKey::Size,
        control_type: ControlType::Dropdown,
        priority: 4,
        confidence: 0.9,
        options: ["S", "M", "L"]
            .iter()
            .enumerate()
            .map(|(i, label)| RawVariantOption {
                label: label.to_string(),
                value: label.to_string(),
                index: i,
                selector: format!("select[name=size] option[value={label}]"),
                disabled: false,
                selected: i == 0,
            })
            .collect(),
    }]);

    let mut config = Config::default();
    config.variant_update_timeout = std::time::Duration::from_millis(50);
    let result = variant::enumerate(&browser, &model, &config).await.unwrap();
    assert_eq!(result.stats.tested, 3);
    assert_eq!(result.stats.available, 3);
    assert!(!result.has_inter_group_dependency());
}

/// Scenario 3: color gates size — `(Red, L)` is the sole disabled combination.
#[tokio::test]
async fn color_gates_size_leaves_exactly_one_combination_disabled() {
    let browser = FakeBrowser::from_snapshot(PageStateSnapshot {
        availability: AvailabilityState { text: Some("Add to cart".to_string()), ..Default::default() },
        ..blank_snapshot()
    });

    browser.on_click("[data-color='red']", |inner| {
        inner.snapshot.availability.class = Some("swatch-red".to_string());
    });
    browser.on_click("[data-color='blue']", |inner| {
        inner.snapshot.availability.class = Some("swatch-blue".to_string());
    });
    browser.on_click("[data-size='S']", |inner| {
        inner.snapshot.availability.disabled = false;
    });
    browser.on_click("[data-size='M']", |inner| {
        inner.snapshot.availability.disabled = false;
    });
    browser.on_click("[data-size='L']", |inner| {
        inner.snapshot.availability.disabled = inner.snapshot.availability.class.as_deref() == Some("swatch-red");
    });

    let color_group = RawVariantGroup {
        selector: ".colors".to_string(),
        key: VariantKey::Color,
        control_type: ControlType::Swatch,
        priority: 4,
        confidence: 0.9,
        options: vec![
            RawVariantOption { label: "Red".to_string(), value: "red".to_string(), index: 0, selector: "[data-color='red']".to_string(), disabled: false, selected: true },
            RawVariantOption { label: "Blue".to_string(), value: "blue".to_string(), index: 1, selector: "[data-color='blue']".to_string(), disabled: false, selected: false },
        ],
    };
    let size_group = RawVariantGroup {
        selector: ".sizes".to_string(),
        key: VariantKey::Size,
        control_type: ControlType::Swatch,
        priority: 4,
        confidence: 0.9,
        options: ["S", "M", "L"]
            .iter()
            .enumerate()
            .map(|(i, label)| RawVariantOption {
                label: label.to_string(),
                value: label.to_string(),
                index: i,
                selector: format!("[data-size='{label}']"),
                disabled: false,
                selected: i == 0,
            })
            .collect(),
    };
    let model = variant::merge_groups(vec![size_group, color_group]);
    assert_eq!(model.groups[0].key, VariantKey::Color, "color sweeps before size");

    let mut config = Config::default();
    config.variant_update_timeout = std::time::Duration::from_millis(50);
    let result = variant::enumerate(&browser, &model, &config).await.unwrap();
    assert_eq!(result.stats.tested, 6);
    assert_eq!(result.stats.available, 5);
    assert!(result.has_inter_group_dependency());

    let disabled: Vec<_> = result.combinations.iter().filter(|c| !c.availability_enabled).collect();
    assert_eq!(disabled.len(), 1);
    assert_eq!(disabled[0].path, vec![(0, 0), (1, 2)]);
}

/// Scenario 4: a color selection only ever surfaces as a network response.
#[tokio::test]
async fn network_only_variant_update_is_detected() {
    let browser = FakeBrowser::from_snapshot(PageStateSnapshot {
        availability: AvailabilityState { text: Some("Add to cart".to_string()), ..Default::default() },
        ..blank_snapshot()
    });
    browser.on_click("[data-color='red']", |_inner| {});
    browser.push_network_event(NetworkEvent {
        url: "https://shop.example.com/graphql".to_string(),
        status: Some(200),
        body_sample: Some(r#"{"data":{"product":{"variant":{"id":"2"}}}}"#.to_string()),
    });

    let model = variant::merge_groups(vec![RawVariantGroup {
        selector: ".colors".to_string(),
        key: VariantKey::Color,
        control_type: ControlType::Swatch,
        priority: 4,
        confidence: 0.9,
        options: vec![RawVariantOption {
            label: "Red".to_string(),
            value: "red".to_string(),
            index: 0,
            selector: "[data-color='red']".to_string(),
            disabled: false,
            selected: false,
        }],
    }]);

    let mut config = Config::default();
    config.variant_update_timeout = std::time::Duration::from_millis(1500);
    let observed = variant::select_option(&browser, &model.groups[0], &model.options[0], &config).await.unwrap();
    assert!(observed);
}

/// Scenario 5: a bare `$129.00` leaf normalizes to minor units + currency.
#[tokio::test]
async fn price_leaf_normalizes_with_high_confidence() {
    let browser = FakeBrowser::from_snapshot(PageStateSnapshot {
        price_text: Some("$129.00".to_string()),
        ..blank_snapshot()
    });
    let candidate = Candidate {
        raw: RawCandidate {
            selector: ".price".to_string(),
            confidence: 0.75,
            reason: "currency-pattern leaf".to_string(),
            sample: Some("$129.00".to_string()),
            observed_matches: 1,
            discovery_method: DiscoveryMethod::Dom,
        },
        field: SemanticField::Price,
    };
    let config = Config::default();
    let result = validate(&browser, &candidate, &config, None::<std::future::Pending<crate::error::Result<()>>>)
        .await
        .unwrap();
    assert!(result.works);
    assert!(candidate.raw.confidence >= 0.6);

    let (minor_units, currency) = normalize_price("$129.00").unwrap();
    assert_eq!(minor_units, 12900);
    assert_eq!(currency, "USD");
}

/// Scenario 6: a newsletter modal is closed before title/price extraction.
#[tokio::test]
async fn popup_is_dismissed_before_extraction_succeeds() {
    let browser = FakeBrowser::from_snapshot(PageStateSnapshot {
        title: String::new(),
        price_text: None,
        ..blank_snapshot()
    });
    browser.on_click("[aria-label=\"close\" i]", |inner| {
        inner.snapshot.title = "Cocoon Shirt".to_string();
        inner.snapshot.price_text = Some("$129.00".to_string());
    });

    dismiss_popups(&browser).await.unwrap();

    let snap = crate::snapshot::capture(&browser).await.unwrap();
    assert_eq!(snap.title, "Cocoon Shirt");
    assert_eq!(snap.price_text.as_deref(), Some("$129.00"));
}
