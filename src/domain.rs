use serde::{Deserialize, Serialize};
use std::fmt;
use strum::EnumIter;

/// A host name, lowercased with any leading `www.` stripped.
///
/// This is the identity key for all learning: locator records, cached
/// strategies, and reliability aggregates are all keyed by `Domain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Domain(String);

impl Domain {
    /// Derive a `Domain` from a full URL or a bare host string.
    pub fn parse(input: &str) -> Option<Self> {
        let host = if let Ok(parsed) = url::Url::parse(input) {
            parsed.host_str().map(|h| h.to_string())
        } else {
            Some(input.to_string())
        }?;
        Some(Self::from_host(&host))
    }

    /// Normalize a bare host string directly, skipping URL parsing.
    pub fn from_host(host: &str) -> Self {
        let lower = host.to_ascii_lowercase();
        let stripped = lower.strip_prefix("www.").unwrap_or(&lower);
        Self(stripped.to_string())
    }

    /// The normalized host string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validation/scoring policy bucket. Behavior in the validator and
/// candidate finder dispatches on `Category`, never on the field name, so
/// adding a new `SemanticField` only requires picking an existing category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Prose/short text content (title, description, brand, sku, rating).
    Text,
    /// Currency-denominated values (price, original_price).
    Price,
    /// Image sources (images).
    Image,
    /// Mutually-exclusive option sets (variants, size, color).
    Options,
    /// Boolean/tri-state UI affordance (availability).
    Status,
}

/// The closed enumeration of extractable product attributes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SemanticField {
    /// The product's display name.
    Title,
    /// The current selling price.
    Price,
    /// A pre-discount price, if shown struck through.
    OriginalPrice,
    /// Product photography, ordered by DOM order.
    Images,
    /// Prose product description.
    Description,
    /// Add-to-cart affordance state.
    Availability,
    /// Manufacturer or house brand.
    Brand,
    /// The set of variant groups (color, size, ...).
    Variants,
    /// A size-specific variant group, when modeled independently.
    Size,
    /// A color-specific variant group, when modeled independently.
    Color,
    /// Stock keeping unit / part number.
    Sku,
    /// Aggregate customer rating.
    Rating,
}

impl SemanticField {
    /// The validation category this field belongs to.
    pub const fn category(self) -> Category {
        use SemanticField::*;
        match self {
            Title | Description | Brand | Sku | Rating => Category::Text,
            Price | OriginalPrice => Category::Price,
            Images => Category::Image,
            Variants | Size | Color => Category::Options,
            Availability => Category::Status,
        }
    }

    /// Fields the orchestrator treats as mandatory for a strategy to be usable (§4.7).
    pub const fn is_required(self) -> bool {
        matches!(self, SemanticField::Title | SemanticField::Price | SemanticField::Images)
    }

    /// The point value a single URL's extraction contributes toward `quality`
    /// when this field is present (§4.7: required=100, optional=50).
    pub const fn quality_weight(self) -> u32 {
        if self.is_required() {
            100
        } else {
            50
        }
    }
}
