//! Count-Min Sketch frequency estimator.
//!
//! A `depth × width` matrix of saturating counters. Each row hashes the item
//! with its own seed, so collisions in one row are unlikely to repeat in the
//! others. The point estimate is the minimum over the item's buckets, which
//! can overestimate (collisions only ever add) but never underestimates.
//!
//! ```text
//!            width columns
//!          ┌───┬───┬───┬───┬───┐
//!  row 0   │ 0 │ 3 │ 0 │ 1 │ 0 │   h0(item) = 1
//!  row 1   │ 2 │ 0 │ 0 │ 3 │ 0 │   h1(item) = 3
//!  row 2   │ 0 │ 0 │ 5 │ 0 │ 0 │   h2(item) = 2
//!          └───┴───┴───┴───┴───┘
//!  count(item) = min(3, 3, 5) = 3
//! ```

use ahash::RandomState;

/// Fixed key material; rows differ by mixing in the row index.
const SEED_K1: u64 = 0x243F_6A88_85A3_08D3;
const SEED_K2: u64 = 0x1319_8A2E_0370_7344;
const SEED_K3: u64 = 0xA409_3822_299F_31D0;

/// A fixed-size probabilistic counter table.
#[derive(Debug, Clone)]
pub struct CountMinSketch {
    width: usize,
    depth: usize,
    /// Row-major, `depth * width` counters
    counters: Vec<u64>,
    hashers: Vec<RandomState>,
}

impl CountMinSketch {
    /// Creates a sketch with explicit dimensions. Zero dimensions are raised to 1.
    pub fn new(width: usize, depth: usize) -> Self {
        let width = width.max(1);
        let depth = depth.max(1);
        let hashers = (0..depth as u64)
            .map(|row| RandomState::with_seeds(row, SEED_K1, SEED_K2, SEED_K3))
            .collect();

        Self {
            width,
            depth,
            counters: vec![0; width * depth],
            hashers,
        }
    }

    /// Creates a sketch sized for relative error `error_rate` with failure
    /// probability `failure_prob`.
    ///
    /// # Example
    ///
    /// ```
    /// use emberkv::storage::CountMinSketch;
    ///
    /// let cms = CountMinSketch::with_error(0.001, 0.01);
    /// assert_eq!(cms.width(), 2000);
    /// assert_eq!(cms.depth(), 7);
    /// ```
    pub fn with_error(error_rate: f64, failure_prob: f64) -> Self {
        let (width, depth) = Self::dimensions(error_rate, failure_prob);
        Self::new(width, depth)
    }

    /// `width = ceil(2 / ε)`, `depth = ceil(log(δ) / log(0.5))`.
    pub fn dimensions(error_rate: f64, failure_prob: f64) -> (usize, usize) {
        let width = (2.0 / error_rate).ceil();
        let depth = (failure_prob.log10() / 0.5_f64.log10()).ceil();
        (width.max(1.0) as usize, depth.max(1.0) as usize)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    fn bucket(&self, row: usize, item: &[u8]) -> usize {
        let hash = self.hashers[row].hash_one(item);
        row * self.width + (hash % self.width as u64) as usize
    }

    /// Adds `amount` to the item's counter in every row, saturating at
    /// `u64::MAX`, and returns the new estimate.
    pub fn increment_by(&mut self, item: &[u8], amount: u64) -> u64 {
        let mut min = u64::MAX;
        for row in 0..self.depth {
            let idx = self.bucket(row, item);
            let counter = &mut self.counters[idx];
            *counter = counter.saturating_add(amount);
            min = min.min(*counter);
        }
        min
    }

    /// Returns the estimated count for `item`.
    pub fn count(&self, item: &[u8]) -> u64 {
        (0..self.depth)
            .map(|row| self.counters[self.bucket(row, item)])
            .min()
            .unwrap_or(0)
    }
}
