//! Per-block rate histogram.
//!
//! A fixed-size accumulator indexed by grid bucket. Each worker owns one and
//! clears it between blocks, so no allocation happens in the hot loop.

use oracle_core::OutputValue;

/// Accumulated classifier weight per trial rate.
#[derive(Debug, Clone)]
pub struct RateHistogram {
    weights: Vec<f64>,
    /// Scratch space for the candidate output values of the current block.
    pub(crate) values: Vec<OutputValue>,
}

impl RateHistogram {
    /// Create a zeroed histogram with one bucket per grid rate.
    pub fn new(buckets: usize) -> Self {
        Self {
            weights: vec![0.0; buckets],
            values: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Reset every bucket to zero.
    pub fn clear(&mut self) {
        self.weights.fill(0.0);
        self.values.clear();
    }

    #[inline]
    pub fn add(&mut self, bucket: usize, weight: f64) {
        self.weights[bucket] += weight;
    }

    #[inline]
    pub fn weight(&self, bucket: usize) -> f64 {
        self.weights[bucket]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Sum over all buckets.
    pub fn total(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Bucket with the largest weight, ties going to the lowest index.
    ///
    /// Returns `None` when every bucket is zero.
    pub fn peak(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &w) in self.weights.iter().enumerate() {
            if w > best.map_or(0.0, |(_, b)| b) {
                best = Some((i, w));
            }
        }
        best
    }

    /// Weighted mean of `rates` over the buckets within `radius` of `center`.
    ///
    /// Falls back to the center rate if the neighbourhood carries no weight.
    pub fn centroid(&self, center: usize, radius: usize, rates: &[f64]) -> f64 {
        let lo = center.saturating_sub(radius);
        let hi = center.saturating_add(radius).min(self.weights.len().saturating_sub(1));

        let mut weight_sum = 0.0;
        let mut rate_sum = 0.0;
        for i in lo..=hi {
            weight_sum += self.weights[i];
            rate_sum += self.weights[i] * rates[i];
        }

        if weight_sum > 0.0 {
            rate_sum / weight_sum
        } else {
            rates[center]
        }
    }
}
