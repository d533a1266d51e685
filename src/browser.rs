//! Browser Session (C1, §4.1): a narrow, opaque interface over a headless
//! browser backend. The ASIE never depends on a concrete browser engine —
//! any backend satisfying [`Browser`] is acceptable (§6 "Consumed interfaces").

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::{AsieError, Result};
use crate::rng::RandomSource;

/// An opaque handle to a resolved DOM element. Backends are free to encode
/// whatever they need (a CDP remote object id, a WebDriver element id, ...)
/// as long as it round-trips through the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

/// When `navigate` should consider the page ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    /// The `load` event fired.
    Load,
    /// The `DOMContentLoaded` event fired.
    DomContentLoaded,
    /// No new network connections for ~500ms.
    NetworkIdle,
}

/// A network response observed since the last poll, as used by
/// [`crate::variant::wait_for_variant_update`] to detect network-signaled
/// variant updates (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEvent {
    /// The request URL.
    pub url: String,
    /// The HTTP status code, if the response completed.
    pub status: Option<u16>,
    /// A short prefix of the response body, used for content sniffing
    /// (e.g. matching `product.variant` in a GraphQL payload).
    pub body_sample: Option<String>,
}

/// A single mutation-observer callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationEvent {
    /// The CSS selector of the nearest ancestor the backend could identify,
    /// if any.
    pub target_selector: Option<String>,
}

/// The narrow, opaque Browser Session contract (§4.1, §6).
///
/// Every method here is a suspension point (§5): between two calls the
/// engine makes no assumption about DOM stability, which is why locators
/// are always re-resolved rather than cached across an `.await`.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Navigate to `url`, waiting for `wait_until`, bounded by `timeout`.
    ///
    /// Fails with [`AsieError::NavTimeout`] if `timeout` elapses before the
    /// wait condition is met, or [`AsieError::NavDenied`] if the backend
    /// reports an outright rejection (blocked, non-2xx, captcha wall).
    async fn navigate(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> Result<()>;

    /// Run `script` in the page context with `args`, returning its JSON-
    /// serializable result.
    async fn evaluate(&self, script: &str, args: Value) -> Result<Value>;

    /// Resolve `selector` against the live DOM.
    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>>;

    /// Click a resolved element. Bounded by the backend's own click timeout
    /// (default 5000ms, §4.1); times out as [`AsieError::InteractionFailed`].
    async fn click(&self, handle: &ElementHandle) -> Result<()>;

    /// Hover over a resolved element (used both for humanization and for
    /// the "alternative interactions" adaptive retry step, §4.7).
    async fn hover(&self, handle: &ElementHandle) -> Result<()>;

    /// Select an option by index on a `<select>`-like control.
    async fn select_by_index(&self, handle: &ElementHandle, index: usize) -> Result<()>;

    /// Type a string into a resolved, focused input.
    async fn type_str(&self, handle: &ElementHandle, text: &str) -> Result<()>;

    /// Scroll the viewport by a relative offset.
    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<()>;

    /// Suspend for exactly `ms` milliseconds.
    async fn wait_ms(&self, ms: u64) -> Result<()>;

    /// Poll for the next network response observed since the last call,
    /// bounded by `timeout`. Returns `None` on timeout with no event.
    async fn next_network_event(&self, timeout: Duration) -> Result<Option<NetworkEvent>>;

    /// Poll for the next DOM mutation observed since the last call, bounded
    /// by `timeout`. Returns `None` on timeout with no event.
    async fn next_mutation_event(&self, timeout: Duration) -> Result<Option<MutationEvent>>;

    /// Release the underlying page/session.
    async fn close(&self) -> Result<()>;
}

/// A small, non-exhaustive list of generic dismisser selectors tried before
/// pressing Escape on every navigation (§4.1 "Popups/cookie banners").
pub const GENERIC_DISMISSER_SELECTORS: &[&str] = &[
    "[aria-label=\"close\" i]",
    "[aria-label=\"dismiss\" i]",
    ".modal .close",
    ".cookie-consent button",
    "#onetrust-accept-btn-handler",
    "[data-testid=\"close-button\"]",
];

/// Best-effort popup/cookie-banner dismissal (§4.1). Never fails: every
/// dismisser attempt that errors is swallowed, and a final Escape keypress
/// is sent regardless of whether anything matched.
pub async fn dismiss_popups(browser: &dyn Browser) -> Result<()> {
    for selector in GENERIC_DISMISSER_SELECTORS {
        match browser.query(selector).await {
            Ok(handles) => {
                for handle in handles.iter().take(1) {
                    let _ = browser.click(handle).await;
                }
            }
            Err(err) => {
                log::debug!("popup dismisser selector {selector:?} failed: {err}");
            }
        }
    }
    // Escape is sent unconditionally; a backend with no keyboard-dispatch
    // concept simply no-ops via evaluate.
    let _ = browser
        .evaluate(
            "document.dispatchEvent(new KeyboardEvent('keydown', {key: 'Escape'}))",
            Value::Null,
        )
        .await;
    Ok(())
}

/// Applies the §4.1 humanization contract: a randomized pause between
/// actions, and an occasional hover before a click.
pub struct Humanizer<'a> {
    rng: &'a dyn RandomSource,
    pause_range_ms: (u64, u64),
    hover_probability: f64,
}

impl<'a> Humanizer<'a> {
    /// Build a humanizer from the engine config and an injected [`RandomSource`].
    pub fn new(config: &Config, rng: &'a dyn RandomSource) -> Self {
        Self {
            rng,
            pause_range_ms: config.humanize_pause_range_ms,
            hover_probability: config.humanize_hover_probability,
        }
    }

    /// Insert the randomized inter-action pause (§4.1 default 100-2000ms).
    pub async fn pause(&self, browser: &dyn Browser) -> Result<()> {
        let (low, high) = self.pause_range_ms;
        let ms = self.rng.range_u64(low, high);
        browser.wait_ms(ms).await
    }

    /// Click `handle`, first hovering over it with probability
    /// `hover_probability` (§4.1 default ~30%).
    pub async fn humanized_click(&self, browser: &dyn Browser, handle: &ElementHandle) -> Result<()> {
        if self.rng.chance(self.hover_probability) {
            let _ = browser.hover(handle).await;
        }
        self.pause(browser).await?;
        browser
            .click(handle)
            .await
            .map_err(|_| AsieError::InteractionFailed {
                field: crate::domain::SemanticField::Availability,
                reason: "click did not resolve".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededRandomSource;
    use crate::testing::FakeBrowser;

    #[tokio::test]
    async fn dismiss_popups_never_fails_when_nothing_matches() {
        let browser = FakeBrowser::new();
        assert!(dismiss_popups(&browser).await.is_ok());
    }

    #[tokio::test]
    async fn humanizer_pause_stays_within_configured_range() {
        let rng = SeededRandomSource::new(7);
        let config = Config::default();
        let humanizer = Humanizer::new(&config, &rng);
        let browser = FakeBrowser::new();
        humanizer.pause(&browser).await.unwrap();
        let waited = browser.total_wait_ms();
        let (low, high) = config.humanize_pause_range_ms;
        assert!(waited >= low && waited < high);
    }
}
