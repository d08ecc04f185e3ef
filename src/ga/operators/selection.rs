//! Parent selection
//!
//! Both strategies work on a population that is already sorted best first,
//! so selecting a smaller index means selecting a fitter chromosome.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub trait SelectionFunction {
    /// Index into a sorted population of `size > 0` chromosomes
    fn select_index(&self, size: usize, rng: &mut ChaCha8Rng) -> usize;

    fn select<'a, T>(&self, population: &'a [T], rng: &mut ChaCha8Rng) -> Option<&'a T>
    where
        Self: Sized,
    {
        if population.is_empty() {
            return None;
        }
        population.get(self.select_index(population.len(), rng))
    }
}

/// Linear ranking with selective pressure `bias` in `(1, 2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankSelection {
    bias: f64,
}

impl RankSelection {
    pub fn new(bias: f64) -> Self {
        Self { bias }
    }
}

impl SelectionFunction for RankSelection {
    fn select_index(&self, size: usize, rng: &mut ChaCha8Rng) -> usize {
        let random: f64 = rng.gen();
        let bias = self.bias;
        let index = if bias <= 1.0 {
            size as f64 * random
        } else {
            size as f64 * (bias - (bias * bias - 4.0 * (bias - 1.0) * random).sqrt()) / 2.0 / (bias - 1.0)
        };
        (index.max(0.0) as usize).min(size.saturating_sub(1))
    }
}

/// Best of `size` uniformly drawn candidates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TournamentSelection {
    size: usize,
}

impl TournamentSelection {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }
}

impl SelectionFunction for TournamentSelection {
    fn select_index(&self, size: usize, rng: &mut ChaCha8Rng) -> usize {
        (0..self.size)
            .map(|_| rng.gen_range(0..size.max(1)))
            .min()
            .unwrap_or(0)
    }
}
