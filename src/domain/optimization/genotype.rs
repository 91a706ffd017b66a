use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Candidate (short, long) moving-average window pair.
///
/// Serialized as a two element array so a batch travels as `[[short, long], ...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Genotype {
    pub short_window: u32,
    pub long_window: u32,
}

pub type Population = Vec<Genotype>;

impl Genotype {
    /// Windows below 1 are repaired up to 1.
    pub fn new(short_window: u32, long_window: u32) -> Self {
        Self {
            short_window: short_window.max(1),
            long_window: long_window.max(1),
        }
    }

    /// Offspring with every gene shifted by a uniform step in {-1, 0, +1}.
    pub fn perturbed<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        Self::new(
            shift(self.short_window, rng.random_range(-1..=1)),
            shift(self.long_window, rng.random_range(-1..=1)),
        )
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R, bounds: &GeneBounds) -> Self {
        Self::new(
            rng.random_range(bounds.short_min..=bounds.short_max),
            rng.random_range(bounds.long_min..=bounds.long_max),
        )
    }
}

fn shift(gene: u32, step: i32) -> u32 {
    // saturating keeps 0 reachable so Genotype::new can repair it to 1
    gene.saturating_add_signed(step)
}

impl From<(u32, u32)> for Genotype {
    fn from((short_window, long_window): (u32, u32)) -> Self {
        Self {
            short_window,
            long_window,
        }
    }
}

impl From<Genotype> for (u32, u32) {
    fn from(genotype: Genotype) -> Self {
        (genotype.short_window, genotype.long_window)
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.short_window, self.long_window)
    }
}

/// Inclusive ranges for randomly seeded genotypes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneBounds {
    pub short_min: u32,
    pub short_max: u32,
    pub long_min: u32,
    pub long_max: u32,
}

impl Default for GeneBounds {
    fn default() -> Self {
        Self {
            short_min: 1,
            short_max: 50,
            long_min: 1,
            long_max: 200,
        }
    }
}

impl GeneBounds {
    /// Swaps inverted ranges and lifts zero minimums to 1.
    pub fn normalized(self) -> Self {
        let (short_min, short_max) = ordered(self.short_min, self.short_max);
        let (long_min, long_max) = ordered(self.long_min, self.long_max);
        Self {
            short_min,
            short_max,
            long_min,
            long_max,
        }
    }
}

fn ordered(a: u32, b: u32) -> (u32, u32) {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    (lo.max(1), hi.max(1))
}
