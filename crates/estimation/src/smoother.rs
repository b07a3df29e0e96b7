//! Cross-block smoothing.
//!
//! Centered, confidence-weighted moving average over the signal estimates of
//! a series. The window is truncated at both ends; nothing is padded.

use oracle_core::{config::SmoothingConfig, BlockEstimate, Result, SmoothedSeries};

/// Centered moving-average smoother.
#[derive(Debug, Clone, Copy)]
pub struct Smoother {
    window: usize,
}

impl Smoother {
    /// Fails unless `window` is odd and at least 3.
    pub fn new(window: usize) -> Result<Self> {
        SmoothingConfig { window }.validate()?;
        Ok(Self { window })
    }

    pub fn from_config(config: &SmoothingConfig) -> Result<Self> {
        Self::new(config.window)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Smooth the signal estimates in `estimates`, which must be height ordered.
    ///
    /// No-signal estimates are skipped; the output has one point per signal
    /// estimate, with heights and timestamps passed through.
    pub fn smooth(&self, estimates: &[BlockEstimate]) -> SmoothedSeries {
        let points: Vec<(&BlockEstimate, f64, f64)> = estimates
            .iter()
            .filter_map(|e| e.raw_price().map(|p| (e, p, e.confidence())))
            .collect();

        let n = points.len();
        let half = self.window / 2;
        let mut out = SmoothedSeries {
            heights_smooth: Vec::with_capacity(n),
            timestamps_smooth: Vec::with_capacity(n),
            prices_smooth: Vec::with_capacity(n),
            confidences: Vec::with_capacity(n),
        };

        for (i, &(estimate, price, confidence)) in points.iter().enumerate() {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n - 1);
            let window = &points[lo..=hi];

            let weight: f64 = window.iter().map(|p| p.2).sum();
            let smoothed = if weight > 0.0 {
                let (min, max) = window
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), p| (a.min(p.1), b.max(p.1)));
                let mean = window.iter().map(|p| p.1 * p.2).sum::<f64>() / weight;
                mean.clamp(min, max)
            } else {
                price
            };

            out.heights_smooth.push(estimate.height);
            out.timestamps_smooth.push(estimate.timestamp);
            out.prices_smooth.push(smoothed);
            out.confidences.push(confidence);
        }

        out
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self {
            window: SmoothingConfig::default().window,
        }
    }
}
