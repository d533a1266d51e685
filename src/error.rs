use thiserror::Error;

use crate::domain::SemanticField;

/// Convenience alias used throughout the crate.
pub type Result<T, E = AsieError> = std::result::Result<T, E>;

/// The error taxonomy driving the engine's partial-failure tolerance.
///
/// Most variants are recovered locally by the component that produced them
/// (see each component's module docs); only [`AsieError::Fatal`] and a timed
/// out [`AsieError::NavTimeout`]/[`AsieError::NavDenied`] ever abort an
/// in-progress learning attempt.
#[derive(Debug, Error)]
pub enum AsieError {
    /// The page was never reached before the navigation timeout elapsed.
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavTimeout {
        /// The URL that was being navigated to.
        url: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The page actively refused the navigation (blocked, captcha-walled, non-2xx).
    #[error("navigation to {url} was denied: {reason}")]
    NavDenied {
        /// The URL that was being navigated to.
        url: String,
        /// A human-readable reason, usually lifted from the browser backend.
        reason: String,
    },

    /// A candidate selector failed to parse as CSS.
    #[error("selector is invalid: {0}")]
    SelectorInvalid(String),

    /// A selector parsed but resolved to zero elements.
    #[error("selector matched no elements: {0}")]
    NoMatch(String),

    /// An interaction (click, select, type) could not be completed.
    #[error("interaction with field {field:?} failed: {reason}")]
    InteractionFailed {
        /// The semantic field being validated when the interaction failed.
        field: SemanticField,
        /// A human-readable reason (click timeout, option missing, disabled).
        reason: String,
    },

    /// The interaction completed but no snapshot diff was observed in time.
    #[error("no page change observed after interacting with field {0:?}")]
    ChangeUndetected(SemanticField),

    /// The hot cache tier is offline.
    #[error("cache tier unavailable for namespace {namespace}")]
    CacheUnavailable {
        /// The namespace that could not be reached.
        namespace: String,
    },

    /// A programmer error: unknown field, invalid namespace, etc. Always propagated.
    #[error("fatal: {0}")]
    Fatal(String),

    /// A lower-level timeout, e.g. a `tokio::time::timeout` elapsing.
    #[error("operation timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// A malformed persisted record or wire payload.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AsieError {
    /// True for errors the orchestrator treats as attempt-ending rather than
    /// locally recoverable (§7 propagation policy).
    pub fn is_attempt_fatal(&self) -> bool {
        matches!(
            self,
            AsieError::NavTimeout { .. } | AsieError::NavDenied { .. } | AsieError::Fatal(_)
        )
    }
}
