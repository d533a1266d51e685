#![warn(missing_docs)]

//! Adaptive Selector Intelligence Engine.
//!
//! ASIE learns, at runtime, how to pull structured product data out of an
//! arbitrary e-commerce page: it drives a headless browser, proposes and
//! validates candidate CSS locators for each field, sweeps variant-control
//! combinations to learn availability dependencies, and caches what it
//! learns per domain so later extractions skip the discovery work entirely.
//!
//! # How to use ASIE
//!
//! The engine never owns a browser backend itself — implement [`browser::Browser`]
//! over whatever headless engine you already drive, wire a [`cache::Store`] and
//! [`cache::DurableStore`] to your hot/cold backends, and call
//! [`orchestrator::extract`] or [`orchestrator::learn_strategy`].
//!
//! - **`learn_strategy`** discovers and persists a per-domain [`strategy::ExtractionStrategy`].
//! - **`extract`** performs a full extraction, learning a strategy first if none is cached.
//! - **`quick_check`** is a light price/availability-only probe against an existing strategy.

extern crate log;
pub extern crate tokio;

/// Browser Session (C1): the opaque headless-browser contract.
pub mod browser;
/// Locator Cache & Learner (C6): the hot/cold two-tier store.
pub mod cache;
/// DOM Candidate Finder (C3): proposes scored locator candidates per field.
pub mod candidates;
/// Engine-wide budgets, thresholds, and cache TTLs.
pub mod config;
/// The `Domain` identity key and the closed `SemanticField`/`Category` enumerations.
pub mod domain;
/// In-page DOM analysis (§4.3 selector synthesis, §4.5 variant-discovery layers).
pub mod dom;
/// The error taxonomy driving partial-failure tolerance.
pub mod error;
/// `Locator` and `LocatorRecord`: the unit of learned knowledge.
pub mod locator;
/// Injectable randomness for humanization.
pub mod rng;
/// Page-State Sampler (C2): a deterministic, diffable page projection.
pub mod snapshot;
/// Persisted and exposed artifact types (`ExtractionStrategy`, `ProductRecord`, ...).
pub mod strategy;
#[cfg(test)]
mod testing;
#[cfg(test)]
mod scenarios;
/// Interactive Validator (C4): exercises candidates and scores confidence.
pub mod validator;
/// Variant Model & Sweeper (C5): variant-group discovery and combinatorial sweeps.
pub mod variant;

/// Strategy Orchestrator (C7): the learn -> test -> improve loop, and the
/// `extract`/`quick_check` operations built on top of a learned strategy.
pub mod orchestrator;

pub use cache::CacheLearner;
pub use config::Config;
pub use error::{AsieError, Result};
pub use orchestrator::{extract, learn_strategy, quick_check};
