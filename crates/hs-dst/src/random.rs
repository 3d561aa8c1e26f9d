//! Seeded randomness for reproducible runs.

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::distributions::{Distribution, Standard};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Golden-ratio increment used to derive child seeds.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Deterministic RNG: the same seed always yields the same sequence.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    seed: u64,
    inner: StdRng,
}

impl DeterministicRng {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn gen<T>(&mut self) -> T
    where
        Standard: Distribution<T>,
    {
        self.inner.gen()
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.inner.gen_range(range)
    }

    pub fn gen_bool(&mut self, probability: f64) -> bool {
        debug_assert!((0.0..=1.0).contains(&probability));
        self.inner.gen_bool(probability)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }

    /// Seed for the `index`-th child stream. Independent of how much of
    /// this stream has been consumed.
    #[must_use]
    pub fn child_seed(&self, index: u64) -> u64 {
        self.seed
            .wrapping_add(SEED_STRIDE.wrapping_mul(index.wrapping_add(1)))
            .max(1)
    }
}
