//! Latency models for simulated relocation

use std::time::Duration;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::Rng;

/// Jitter added on top of the base latency
#[derive(Clone, Debug, PartialEq)]
pub enum Jitter {
    /// Deterministic latency
    None,
    /// Uniform distribution (inclusive bounds)
    Uniform { min_ms: u32, max_ms: u32 },
    /// Normal distribution (mean, stddev), clamped at zero
    Normal { mean_ms: f64, stddev_ms: f64 },
}

impl Jitter {
    /// Sample a jitter value
    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        match self {
            Jitter::None => Duration::ZERO,
            Jitter::Uniform { min_ms, max_ms } => {
                let (lo, hi) = if min_ms <= max_ms {
                    (*min_ms, *max_ms)
                } else {
                    (*max_ms, *min_ms)
                };
                let dist = Uniform::new_inclusive(lo, hi);
                Duration::from_millis(dist.sample(rng) as u64)
            }
            Jitter::Normal { mean_ms, stddev_ms } => {
                // Box-Muller transform
                let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
                let u2: f64 = rng.gen();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                let value = mean_ms + stddev_ms * z;
                Duration::from_micros((value.max(0.0) * 1000.0) as u64)
            }
        }
    }
}

/// Time a relocation takes in the simulation
#[derive(Clone, Debug, PartialEq)]
pub struct LatencyModel {
    pub base: Duration,
    pub jitter: Jitter,
}

impl Default for LatencyModel {
    fn default() -> Self {
        LatencyModel {
            base: Duration::from_millis(1),
            jitter: Jitter::None,
        }
    }
}

impl LatencyModel {
    /// Relocation completes on the next scheduler turn
    pub fn instant() -> Self {
        LatencyModel {
            base: Duration::ZERO,
            jitter: Jitter::None,
        }
    }

    /// Fixed latency, no jitter
    pub fn fixed(base: Duration) -> Self {
        LatencyModel {
            base,
            jitter: Jitter::None,
        }
    }

    /// Base latency plus uniform jitter in `[0, jitter_ms]`
    pub fn uniform(base: Duration, jitter_ms: u32) -> Self {
        LatencyModel {
            base,
            jitter: Jitter::Uniform {
                min_ms: 0,
                max_ms: jitter_ms,
            },
        }
    }

    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        self.base + self.jitter.sample(rng)
    }
}
