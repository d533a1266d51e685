//! Injectable randomness (§9 "Humanization vs. determinism in tests").
//!
//! All jitter/delay/hover decisions route through a [`RandomSource`] so tests
//! can seed it deterministically instead of fighting real timing noise.

/// A source of randomness for humanization decisions. Production code uses
/// [`FastRandSource`]; tests use [`SeededRandomSource`].
pub trait RandomSource: Send + Sync {
    /// A uniformly distributed integer in `[low, high)`.
    fn range_u64(&self, low: u64, high: u64) -> u64;

    /// A uniformly distributed float in `[0.0, 1.0)`.
    fn unit_f64(&self) -> f64;

    /// True with probability `p` (`p` clamped to `[0.0, 1.0]`).
    fn chance(&self, p: f64) -> bool {
        self.unit_f64() < p.clamp(0.0, 1.0)
    }
}

/// Production randomness backed by `fastrand`, matching the teacher's
/// humanization/jitter dependency (used under its `real_browser`/`spoof`
/// features).
#[derive(Debug, Default, Clone, Copy)]
pub struct FastRandSource;

impl RandomSource for FastRandSource {
    fn range_u64(&self, low: u64, high: u64) -> u64 {
        if low >= high {
            return low;
        }
        fastrand::u64(low..high)
    }

    fn unit_f64(&self) -> f64 {
        fastrand::f64()
    }
}

/// Deterministic randomness for tests: a seeded `fastrand::Rng` wrapped
/// behind interior mutability so it can live behind a shared `&dyn
/// RandomSource`.
pub struct SeededRandomSource {
    rng: std::sync::Mutex<fastrand::Rng>,
}

impl SeededRandomSource {
    /// Construct a deterministic source from an explicit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: std::sync::Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }
}

impl RandomSource for SeededRandomSource {
    fn range_u64(&self, low: u64, high: u64) -> u64 {
        if low >= high {
            return low;
        }
        self.rng.lock().unwrap().u64(low..high)
    }

    fn unit_f64(&self) -> f64 {
        self.rng.lock().unwrap().f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_source_is_reproducible() {
        let a = SeededRandomSource::new(42);
        let b = SeededRandomSource::new(42);
        let seq_a: Vec<u64> = (0..10).map(|_| a.range_u64(100, 2000)).collect();
        let seq_b: Vec<u64> = (0..10).map(|_| b.range_u64(100, 2000)).collect();
        assert_eq!(seq_a, seq_b);
        assert!(seq_a.iter().all(|v| (100..2000).contains(v)));
    }

    #[test]
    fn chance_respects_bounds() {
        let rng = SeededRandomSource::new(1);
        assert!(!rng.chance(0.0));
        assert!(rng.chance(1.0));
    }
}
