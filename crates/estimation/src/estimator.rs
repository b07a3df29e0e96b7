//! Per-block price estimation.
//!
//! Two phases per block: sweep every candidate output across the trial rates
//! accumulating classifier weight, then pick a rate from the histogram.

use std::sync::Arc;

use oracle_core::{
    config::{EstimatorConfig, OracleConfig, RateSelection},
    Block, BlockEstimate, EstimateOutcome, OutputValue, Result,
};
use tracing::trace;

use crate::{classifier::RoundAmountClassifier, grid::RateGrid, histogram::RateHistogram};

/// Estimates one USD/BTC rate per block.
///
/// Holds only shared read-only state; cloning is cheap and every worker can
/// hold its own copy.
#[derive(Debug, Clone)]
pub struct PriceEstimator {
    grid: Arc<RateGrid>,
    classifier: Arc<RoundAmountClassifier>,
    config: EstimatorConfig,
}

impl PriceEstimator {
    pub fn new(
        grid: Arc<RateGrid>,
        classifier: Arc<RoundAmountClassifier>,
        config: EstimatorConfig,
    ) -> Self {
        Self {
            grid,
            classifier,
            config,
        }
    }

    /// Build the grid and classifier from a full configuration.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(RateGrid::new(&config.grid)?),
            Arc::new(RoundAmountClassifier::new(&config.classifier)?),
            config.estimator.clone(),
        ))
    }

    pub fn grid(&self) -> &RateGrid {
        &self.grid
    }

    pub fn classifier(&self) -> &RoundAmountClassifier {
        &self.classifier
    }

    /// A zeroed histogram sized for this estimator's grid.
    pub fn new_histogram(&self) -> RateHistogram {
        RateHistogram::new(self.grid.len())
    }

    /// Whether `value` takes part in classification.
    pub fn is_candidate(&self, value: OutputValue) -> bool {
        if !self.classifier.is_eligible(value) {
            return false;
        }
        // Round BTC amounts are priced in bitcoin, not dollars
        !(self.config.exclude_round_btc
            && value.sats().checked_rem(self.config.round_btc_modulus_sats) == Some(0))
    }

    /// Fill `hist` with the block's accumulated weights.
    ///
    /// Returns the number of candidate outputs.
    pub fn accumulate(&self, block: &Block, hist: &mut RateHistogram) -> u32 {
        hist.clear();
        let mut values = std::mem::take(&mut hist.values);
        values.extend(block.outputs.iter().copied().filter(|v| self.is_candidate(*v)));
        // Fixed summation order regardless of output order in the block
        values.sort_unstable();

        for &value in &values {
            self.sweep(value, hist);
        }

        let count = values.len() as u32;
        hist.values = values;
        count
    }

    /// Add one output's scores over the rates where any template can match.
    fn sweep(&self, value: OutputValue, hist: &mut RateHistogram) {
        let mut next = 0;
        for (lo, hi) in self.classifier.rate_windows(value) {
            let range = self.grid.index_range(lo, hi);
            for i in range.start.max(next)..range.end {
                let weight = self.classifier.classify(value, self.grid.rate(i));
                if weight > 0.0 {
                    hist.add(i, weight);
                }
            }
            next = next.max(range.end);
        }
    }

    /// Estimate the block's rate, reusing `hist` as scratch space.
    pub fn estimate(&self, block: &Block, hist: &mut RateHistogram) -> BlockEstimate {
        let output_count = self.accumulate(block, hist);

        let outcome = match hist.peak() {
            Some((peak, weight)) => EstimateOutcome::Signal {
                raw_price: self.select(hist, peak),
                total_confidence: weight,
            },
            None => {
                trace!(height = block.height, output_count, "no signal");
                EstimateOutcome::NoSignal
            }
        };

        BlockEstimate {
            height: block.height,
            timestamp: block.timestamp,
            output_count,
            outcome,
        }
    }

    fn select(&self, hist: &RateHistogram, peak: usize) -> f64 {
        match self.config.selection {
            RateSelection::Peak => self.grid.rate(peak),
            RateSelection::Centroid { radius } => hist.centroid(peak, radius, self.grid.rates()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_core::{Height, SATS_PER_BTC};

    const RATE: f64 = 43_210.0;

    fn usd_sats(usd: f64, rate: f64) -> u64 {
        (usd / rate * SATS_PER_BTC as f64).round() as u64
    }

    fn payment_block(height: Height, rate: f64) -> Block {
        let mix = [(100.0, 20), (20.0, 10), (50.0, 10), (10.0, 5), (500.0, 5)];
        let outputs = mix
            .iter()
            .flat_map(|&(usd, n)| std::iter::repeat(usd_sats(usd, rate)).take(n))
            .map(|s| OutputValue::from_sats(s).unwrap())
            .collect();
        Block::new(height, 1_700_000_000, outputs)
    }

    fn estimator() -> PriceEstimator {
        PriceEstimator::from_config(&OracleConfig::default()).unwrap()
    }

    #[test]
    fn test_recovers_rate_from_round_payments() {
        let est = estimator();
        let mut hist = est.new_histogram();
        let estimate = est.estimate(&payment_block(1, RATE), &mut hist);

        assert!(estimate.is_signal());
        assert_eq!(estimate.output_count, 50);
        let price = estimate.raw_price().unwrap();
        assert!((price / RATE - 1.0).abs() < 0.01, "price {price}");
        assert!(estimate.confidence() > 20.0);
    }

    #[test]
    fn test_recovers_several_rates() {
        let est = estimator();
        let mut hist = est.new_histogram();
        for rate in [1_234.0, 9_876.0, 27_345.0, 61_789.0] {
            let price = est
                .estimate(&payment_block(1, rate), &mut hist)
                .raw_price()
                .unwrap();
            assert!((price / rate - 1.0).abs() < 0.01, "rate {rate} price {price}");
        }
    }

    #[test]
    fn test_peak_selection_is_a_grid_rate() {
        let mut config = OracleConfig::default();
        config.estimator.selection = RateSelection::Peak;
        let est = PriceEstimator::from_config(&config).unwrap();
        let mut hist = est.new_histogram();
        let price = est
            .estimate(&payment_block(1, RATE), &mut hist)
            .raw_price()
            .unwrap();
        assert!(est.grid().rates().contains(&price));
        assert!((price / RATE - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_all_dust_is_no_signal() {
        let est = estimator();
        let mut hist = est.new_histogram();
        let outputs = (1..=50)
            .map(|i| OutputValue::from_sats(i * 10).unwrap())
            .collect();
        let estimate = est.estimate(&Block::new(7, 0, outputs), &mut hist);
        assert_eq!(estimate.outcome, EstimateOutcome::NoSignal);
        assert_eq!(estimate.raw_price(), None);
        assert_eq!(estimate.output_count, 0);
    }

    #[test]
    fn test_empty_block_is_no_signal() {
        let est = estimator();
        let mut hist = est.new_histogram();
        let estimate = est.estimate(&Block::new(7, 0, Vec::new()), &mut hist);
        assert!(!estimate.is_signal());
    }

    #[test]
    fn test_round_btc_outputs_skipped() {
        let est = estimator();
        let round = OutputValue::from_sats(SATS_PER_BTC / 10).unwrap();
        assert!(!est.is_candidate(round));

        let mut config = OracleConfig::default();
        config.estimator.exclude_round_btc = false;
        let est = PriceEstimator::from_config(&config).unwrap();
        assert!(est.is_candidate(round));
    }

    #[test]
    fn test_output_order_irrelevant() {
        let est = estimator();
        let mut hist = est.new_histogram();
        let block = payment_block(3, RATE);
        let mut reversed = block.clone();
        reversed.outputs.reverse();

        let a = est.estimate(&block, &mut hist);
        let b = est.estimate(&reversed, &mut hist);
        assert_eq!(a.raw_price().unwrap().to_bits(), b.raw_price().unwrap().to_bits());
        assert_eq!(a.confidence().to_bits(), b.confidence().to_bits());
    }

    #[test]
    fn test_bounded_sweep_matches_full_sweep() {
        let est = estimator();
        let block = payment_block(1, RATE);
        let mut hist = est.new_histogram();
        est.accumulate(&block, &mut hist);

        let mut full = est.new_histogram();
        let mut values: Vec<_> = block
            .outputs
            .iter()
            .copied()
            .filter(|v| est.is_candidate(*v))
            .collect();
        values.sort();
        for value in values {
            for (i, &rate) in est.grid().rates().iter().enumerate() {
                let w = est.classifier().classify(value, rate);
                if w > 0.0 {
                    full.add(i, w);
                }
            }
        }

        assert!(hist
            .weights()
            .iter()
            .zip(full.weights())
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn test_histogram_reuse_between_blocks() {
        let est = estimator();
        let mut hist = est.new_histogram();
        let first = est.estimate(&payment_block(1, RATE), &mut hist);
        est.estimate(&payment_block(2, 20_000.0), &mut hist);
        let again = est.estimate(&payment_block(1, RATE), &mut hist);
        assert_eq!(first, again);
    }
}
