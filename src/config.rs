use std::time::Duration;

/// Per-namespace TTLs for the hot cache tier (§4.6).
///
/// `checkpoint` is the one namespace that must never be silently served from
/// the in-process fallback (§4.6, §7 `CacheUnavailable`).
#[derive(Debug, Clone)]
pub struct CacheTtls {
    /// TTL for navigation-related entries (default 7 days).
    pub navigation: Duration,
    /// TTL for selector/locator entries (default 3 days).
    pub selectors: Duration,
    /// TTL for in-progress learning state (default 1 day).
    pub learning: Duration,
    /// TTL for page-state snapshots (default 12 hours).
    pub state: Duration,
    /// TTL for discovery scratch data (default 1 hour).
    pub discovery: Duration,
    /// TTL for orchestrator checkpoints. This namespace is not fallback-safe.
    pub checkpoint: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(7 * 24 * 3600),
            selectors: Duration::from_secs(3 * 24 * 3600),
            learning: Duration::from_secs(24 * 3600),
            state: Duration::from_secs(12 * 3600),
            discovery: Duration::from_secs(3600),
            checkpoint: Duration::from_secs(48 * 3600),
        }
    }
}

/// The cache namespaces named in §4.6. `Checkpoint` is the sole
/// non-fallback-safe namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Namespace {
    /// Navigation bookkeeping (URL patterns, platform hints).
    Navigation,
    /// Learned selectors/locators.
    Selectors,
    /// Scratch state for an in-progress learning attempt.
    Learning,
    /// Snapshot-adjacent state.
    State,
    /// Discovery-phase scratch data.
    Discovery,
    /// Orchestrator checkpoints. Never served from fallback.
    Checkpoint,
}

impl Namespace {
    /// Whether this namespace may transparently fall through to the
    /// in-process store when the hot tier is unavailable (§4.6, §7).
    pub const fn is_fallback_safe(self) -> bool {
        !matches!(self, Namespace::Checkpoint)
    }

    /// The configured TTL for this namespace.
    pub fn ttl(self, ttls: &CacheTtls) -> Duration {
        match self {
            Namespace::Navigation => ttls.navigation,
            Namespace::Selectors => ttls.selectors,
            Namespace::Learning => ttls.learning,
            Namespace::State => ttls.state,
            Namespace::Discovery => ttls.discovery,
            Namespace::Checkpoint => ttls.checkpoint,
        }
    }
}

/// Budgets and thresholds for a single `learn_strategy` run (§4.7, §6 "Environment").
///
/// The core crate never reads environment variables itself (that belongs to
/// the excluded CLI/REST layer per §1); callers populate `Config` however
/// they like and pass it in.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum learning attempts before giving up with the best strategy found.
    pub max_attempts: u32,
    /// Minimum `quality` score that ends the learning loop early.
    pub quality_threshold: f64,
    /// Number of sample URLs used to score a candidate strategy.
    pub sample_size: usize,
    /// Timeout for a single `navigate` call.
    pub navigation_timeout: Duration,
    /// Timeout for a `quick_check` probe.
    pub quick_check_timeout: Duration,
    /// Maximum elements validated per field per attempt (§4.4 step 2).
    pub max_validation_elements: usize,
    /// Maximum wait for a validator to observe a post-interaction diff.
    pub validation_wait: Duration,
    /// Per-group option cap during variant sweeps (`P` in §4.5).
    pub sweep_group_cap: usize,
    /// Absolute combination cap across an entire sweep (`N` in §4.5).
    pub sweep_combo_cap: usize,
    /// Timeout waiting for a variant update signal (§4.5 `wait_for_variant_update`).
    pub variant_update_timeout: Duration,
    /// Bounded wait for a `click` to resolve before `InteractionFailed`.
    pub click_timeout: Duration,
    /// Humanization pause range between synthesized actions (§4.1), inclusive low, exclusive high.
    pub humanize_pause_range_ms: (u64, u64),
    /// Probability of a hover-before-click humanization step.
    pub humanize_hover_probability: f64,
    /// TTLs for the hot cache tier.
    pub cache_ttls: CacheTtls,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            quality_threshold: 70.0,
            sample_size: 3,
            navigation_timeout: Duration::from_secs(30),
            quick_check_timeout: Duration::from_secs(5),
            max_validation_elements: 3,
            validation_wait: Duration::from_millis(1500),
            sweep_group_cap: 12,
            sweep_combo_cap: 150,
            variant_update_timeout: Duration::from_millis(3000),
            click_timeout: Duration::from_millis(5000),
            humanize_pause_range_ms: (100, 2000),
            humanize_hover_probability: 0.30,
            cache_ttls: CacheTtls::default(),
        }
    }
}

impl Config {
    /// Builder-style setter for `max_attempts`.
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Builder-style setter for `quality_threshold`.
    pub fn with_quality_threshold(mut self, q: f64) -> Self {
        self.quality_threshold = q;
        self
    }

    /// Builder-style setter for `sweep_group_cap` and `sweep_combo_cap` together.
    pub fn with_sweep_caps(mut self, group_cap: usize, combo_cap: usize) -> Self {
        self.sweep_group_cap = group_cap;
        self.sweep_combo_cap = combo_cap;
        self
    }
}
