//! Sampling without replacement over the known catalog ids.

use std::collections::HashSet;

use rand::Rng;
use tracing::debug;

/// Ids not yet served in the current pass. When the pass is exhausted every
/// known id becomes eligible again, so sampling never stalls.
#[derive(Debug, Clone)]
pub struct SamplingPool {
    all: Vec<String>,
    remaining: Vec<String>,
    passes: u64,
}

impl SamplingPool {
    /// Build a pool from `ids`, dropping blanks and duplicates.
    pub fn new(ids: Vec<String>) -> Self {
        let mut seen = HashSet::with_capacity(ids.len());
        let all: Vec<String> = ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();
        Self {
            remaining: all.clone(),
            all,
            passes: 0,
        }
    }

    /// Draw one id uniformly among the unused ones. `None` only when the pool
    /// has no ids at all.
    pub fn sample<R: Rng>(&mut self, rng: &mut R) -> Option<String> {
        if self.all.is_empty() {
            return None;
        }
        if self.remaining.is_empty() {
            self.passes += 1;
            debug!(size = self.all.len(), pass = self.passes, "Sampling pool exhausted, resetting");
            self.remaining = self.all.clone();
        }
        let index = rng.gen_range(0..self.remaining.len());
        Some(self.remaining.swap_remove(index))
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Ids still available in the current pass.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Completed passes over the whole pool.
    pub fn passes(&self) -> u64 {
        self.passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool(n: usize) -> SamplingPool {
        SamplingPool::new((0..n).map(|i| format!("NCT{}", i)).collect())
    }

    #[test]
    fn test_no_repeats_within_a_pass() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pool = pool(50);
        let drawn: HashSet<String> = (0..50).map(|_| pool.sample(&mut rng).unwrap()).collect();
        assert_eq!(drawn.len(), 50);
        assert_eq!(pool.remaining(), 0);
        assert_eq!(pool.passes(), 0);
    }

    #[test]
    fn test_resets_when_exhausted() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut pool = pool(3);
        for _ in 0..3 {
            pool.sample(&mut rng).unwrap();
        }
        let next = pool.sample(&mut rng);
        assert!(next.is_some());
        assert_eq!(pool.passes(), 1);
        assert_eq!(pool.remaining(), 2);
    }

    #[test]
    fn test_empty_pool_yields_none() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut pool = SamplingPool::new(vec![]);
        assert!(pool.sample(&mut rng).is_none());
    }

    #[test]
    fn test_duplicates_and_blanks_dropped() {
        let pool = SamplingPool::new(vec![
            "NCT1".to_string(),
            " NCT1 ".to_string(),
            "".to_string(),
            "NCT2".to_string(),
        ]);
        assert_eq!(pool.len(), 2);
    }
}
