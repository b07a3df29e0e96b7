//! Trial-rate grid.
//!
//! Built with integer milli-dollar arithmetic only, so two machines always
//! produce bit-identical grids.

use std::ops::Range;

use oracle_core::{config::GridConfig, Result};

/// Fixed, ascending set of candidate USD/BTC rates.
#[derive(Debug, Clone, PartialEq)]
pub struct RateGrid {
    rates: Vec<f64>,
}

impl RateGrid {
    /// Build the grid described by `config`.
    pub fn new(config: &GridConfig) -> Result<Self> {
        config.validate()?;

        let max_milli = config.max_rate_usd * 1_000;
        let mut milli = config.min_rate_usd * 1_000;
        let mut rates = Vec::new();
        while milli <= max_milli {
            rates.push(milli as f64 / 1_000.0);
            milli += milli / config.step_divisor;
        }

        Ok(Self { rates })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Rate at bucket `index`.
    #[inline]
    pub fn rate(&self, index: usize) -> f64 {
        self.rates[index]
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn min_rate(&self) -> f64 {
        self.rates.first().copied().unwrap_or(0.0)
    }

    pub fn max_rate(&self) -> f64 {
        self.rates.last().copied().unwrap_or(0.0)
    }

    /// Indices of the rates within `[lo, hi]`.
    pub fn index_range(&self, lo: f64, hi: f64) -> Range<usize> {
        let start = self.rates.partition_point(|&r| r < lo);
        let end = self.rates.partition_point(|&r| r <= hi);
        start..end.max(start)
    }

    /// Index of the grid rate closest to `rate`.
    pub fn nearest_index(&self, rate: f64) -> usize {
        let upper = self.rates.partition_point(|&r| r < rate);
        if upper == 0 {
            return 0;
        }
        if upper >= self.rates.len() {
            return self.rates.len() - 1;
        }
        if rate - self.rates[upper - 1] <= self.rates[upper] - rate {
            upper - 1
        } else {
            upper
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_shape() {
        let grid = RateGrid::new(&GridConfig::default()).unwrap();
        assert_eq!(grid.min_rate(), 10.0);
        assert!(grid.max_rate() <= 10_000_000.0);
        assert!(grid.max_rate() > 9_900_000.0);
        // ln(1e6) / ln(1.001) is about 13.8k points
        assert!(grid.len() > 13_000 && grid.len() < 15_000);
    }

    #[test]
    fn test_strictly_increasing_with_bounded_spacing() {
        let grid = RateGrid::new(&GridConfig::default()).unwrap();
        for pair in grid.rates().windows(2) {
            assert!(pair[1] > pair[0]);
            let step = pair[1] / pair[0] - 1.0;
            assert!(step > 0.0009 && step <= 0.0011, "step {step}");
        }
    }

    #[test]
    fn test_rebuild_is_identical() {
        let a = RateGrid::new(&GridConfig::default()).unwrap();
        let b = RateGrid::new(&GridConfig::default()).unwrap();
        assert!(a
            .rates()
            .iter()
            .zip(b.rates())
            .all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_index_range() {
        let grid = RateGrid::new(&GridConfig {
            min_rate_usd: 10,
            max_rate_usd: 20,
            step_divisor: 10,
        })
        .unwrap();
        // 10, 11, 12.1, 13.31, 14.641, 16.105, 17.715, 19.486
        assert_eq!(grid.len(), 8);
        assert_eq!(grid.index_range(11.0, 13.31), 1..4);
        assert_eq!(grid.index_range(0.0, 5.0), 0..0);
        assert_eq!(grid.index_range(30.0, 40.0), 8..8);
        assert_eq!(grid.index_range(12.0, 11.0), 2..2);
    }

    #[test]
    fn test_nearest_index() {
        let grid = RateGrid::new(&GridConfig {
            min_rate_usd: 10,
            max_rate_usd: 20,
            step_divisor: 10,
        })
        .unwrap();
        assert_eq!(grid.nearest_index(1.0), 0);
        assert_eq!(grid.nearest_index(11.4), 1);
        assert_eq!(grid.nearest_index(11.8), 2);
        assert_eq!(grid.nearest_index(100.0), 7);
    }

    #[test]
    fn test_invalid_config() {
        let config = GridConfig {
            step_divisor: 0,
            ..GridConfig::default()
        };
        assert!(RateGrid::new(&config).is_err());
    }
}
