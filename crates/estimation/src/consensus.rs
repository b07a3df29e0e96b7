//! Consensus aggregation.
//!
//! Reduces a window of per-block prices to one confidence-weighted scalar.

use ordered_float::OrderedFloat;
use oracle_core::{
    config::ConsensusConfig, ConsensusAxis, ConsensusResult, EstimateSeries, Height,
    SmoothedSeries,
};

/// Confidence-weighted consensus over a window of blocks.
#[derive(Debug, Clone)]
pub struct ConsensusAggregator {
    axis: ConsensusAxis,
    max_deviation: Option<f64>,
}

impl ConsensusAggregator {
    pub fn new(axis: ConsensusAxis, max_deviation: Option<f64>) -> Self {
        Self {
            axis,
            max_deviation,
        }
    }

    pub fn from_config(config: &ConsensusConfig) -> Self {
        Self::new(config.axis, config.max_deviation)
    }

    pub fn axis(&self) -> ConsensusAxis {
        self.axis
    }

    /// Consensus over `series`, reading prices from the configured axis.
    ///
    /// The window bounds are the first and last heights of `series`, including
    /// no-signal blocks.
    pub fn aggregate(&self, series: &EstimateSeries, smoothed: &SmoothedSeries) -> ConsensusResult {
        let start = series.first_height();
        let end = series.last_height();

        let points: Vec<(f64, f64)> = match self.axis {
            ConsensusAxis::Raw => series
                .signals()
                .filter_map(|e| e.raw_price().map(|p| (p, e.confidence())))
                .collect(),
            ConsensusAxis::Smoothed => smoothed
                .prices_smooth
                .iter()
                .copied()
                .zip(smoothed.confidences.iter().copied())
                .collect(),
        };

        self.aggregate_points(&points, start, end)
    }

    /// Consensus over `(price, confidence)` points.
    pub fn aggregate_points(
        &self,
        points: &[(f64, f64)],
        start: Option<Height>,
        end: Option<Height>,
    ) -> ConsensusResult {
        let mut points: Vec<(f64, f64)> = points
            .iter()
            .copied()
            .filter(|&(p, w)| w > 0.0 && w.is_finite() && p > 0.0 && p.is_finite())
            .collect();
        if points.is_empty() {
            return ConsensusResult::undefined(start, end);
        }

        if let Some(max_deviation) = self.max_deviation {
            let median = weighted_median(&mut points);
            points.retain(|&(p, _)| (p - median).abs() / median <= max_deviation);
        }

        let total: f64 = points.iter().map(|&(_, w)| w).sum();
        if total <= 0.0 {
            return ConsensusResult::undefined(start, end);
        }

        let (min, max) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), &(p, _)| (a.min(p), b.max(p)));
        let mean = points.iter().map(|&(p, w)| p * w).sum::<f64>() / total;

        ConsensusResult {
            price: Some(mean.clamp(min, max)),
            window_start_height: start,
            window_end_height: end,
            contributing_blocks: points.len() as u32,
            total_confidence: total,
        }
    }
}

impl Default for ConsensusAggregator {
    fn default() -> Self {
        Self::from_config(&ConsensusConfig::default())
    }
}

/// Lower weighted median; sorts `points` by price.
fn weighted_median(points: &mut [(f64, f64)]) -> f64 {
    points.sort_by_key(|&(p, _)| OrderedFloat(p));
    let half = points.iter().map(|&(_, w)| w).sum::<f64>() / 2.0;

    let mut cumulative = 0.0;
    for &(price, weight) in points.iter() {
        cumulative += weight;
        if cumulative >= half {
            return price;
        }
    }
    points.last().map_or(0.0, |&(p, _)| p)
}
