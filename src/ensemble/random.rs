use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Explicit random source for data generation, bagging and shuffling.
///
/// Passed in by the caller so a fixed seed reproduces the exact training
/// set and model.
pub trait RandomSource {
    /// Uniform in [0, 1).
    fn uniform(&mut self) -> f64;

    /// Uniform integer in [0, n). `n` must be non-zero.
    fn below(&mut self, n: usize) -> usize;

    /// Uniform in [lo, hi).
    fn between(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.uniform()
    }

    /// Fisher–Yates shuffle.
    fn shuffle(&mut self, items: &mut [usize]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }

    /// `k` distinct indices from [0, n), in draw order.
    fn sample_distinct(&mut self, n: usize, k: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..n).collect();
        let k = k.min(n);
        for i in 0..k {
            let j = i + self.below(n - i);
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool
    }
}

impl<R: RngCore> RandomSource for R {
    fn uniform(&mut self) -> f64 {
        self.gen::<f64>()
    }

    fn below(&mut self, n: usize) -> usize {
        self.gen_range(0..n)
    }
}

/// Deterministic source for a seed.
pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = seeded(7);
        let mut b = seeded(7);
        let xs: Vec<f64> = (0..5).map(|_| a.uniform()).collect();
        let ys: Vec<f64> = (0..5).map(|_| b.uniform()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn sample_distinct_is_distinct_and_bounded() {
        let mut rng = seeded(1);
        let picks = rng.sample_distinct(10, 4);
        assert_eq!(picks.len(), 4);
        let mut sorted = picks.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 4);
        assert!(picks.iter().all(|&i| i < 10));
        assert_eq!(rng.sample_distinct(3, 10).len(), 3);
    }

    #[test]
    fn between_respects_bounds() {
        let mut rng = seeded(3);
        for _ in 0..100 {
            let v = rng.between(0.7, 1.0);
            assert!((0.7..1.0).contains(&v));
        }
    }

    #[test]
    fn shuffle_is_permutation() {
        let mut rng = seeded(9);
        let mut items: Vec<usize> = (0..20).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }
}
