//! Round-amount classification.
//!
//! Scores how much an output value looks like a round USD payment at a given
//! trial rate. Only plain f64 multiply, divide and compare are used, so scores
//! are bit-identical on every IEEE 754 platform.

use oracle_core::{
    config::{ClassifierConfig, RoundTemplate},
    OutputValue, Result, SATS_PER_BTC,
};

/// Guard band applied to derived rate bounds so rounding never cuts off a
/// rate that scores above zero.
const RATE_BOUND_SLACK: f64 = 1e-9;

/// Round-dollar template matcher.
#[derive(Debug, Clone)]
pub struct RoundAmountClassifier {
    /// Templates in ascending USD order.
    templates: Vec<RoundTemplate>,
    dust_threshold_sats: u64,
    ceiling_sats: u64,
    tolerance: f64,
    version: String,
}

impl RoundAmountClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        config.validate()?;

        let mut templates = config.templates.clone();
        templates.sort_by(|a, b| a.usd.total_cmp(&b.usd));
        templates.dedup_by(|a, b| a.usd == b.usd);

        Ok(Self {
            templates,
            dust_threshold_sats: config.dust_threshold_sats,
            ceiling_sats: config.ceiling_sats,
            tolerance: config.relative_tolerance,
            version: config.template_set_version.clone(),
        })
    }

    pub fn templates(&self) -> &[RoundTemplate] {
        &self.templates
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Version tag of the template set.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether `value` lies between the dust threshold and the ceiling.
    #[inline]
    pub fn is_eligible(&self, value: OutputValue) -> bool {
        let sats = value.sats();
        sats >= self.dust_threshold_sats && sats <= self.ceiling_sats
    }

    /// Confidence in [0, 1] that `value` is a round USD amount at `rate` USD/BTC.
    pub fn classify(&self, value: OutputValue, rate: f64) -> f64 {
        if !self.is_eligible(value) {
            return 0.0;
        }
        let fiat = value.sats() as f64 * rate / SATS_PER_BTC as f64;
        self.score_fiat(fiat)
    }

    /// Confidence that `fiat` USD is a round amount.
    pub fn score_fiat(&self, fiat: f64) -> f64 {
        // The closest template in relative terms is one of the two neighbours
        let upper = self.templates.partition_point(|t| t.usd < fiat);
        let below = upper.checked_sub(1).map(|i| self.template_score(&self.templates[i], fiat));
        let above = self.templates.get(upper).map(|t| self.template_score(t, fiat));

        match (below, above) {
            (Some(a), Some(b)) => a.max(b),
            (Some(s), None) | (None, Some(s)) => s,
            (None, None) => 0.0,
        }
    }

    /// Score against one template: `weight * (1 - (d / tol)^2)` inside the band.
    #[inline]
    fn template_score(&self, template: &RoundTemplate, fiat: f64) -> f64 {
        let distance = (fiat - template.usd).abs() / template.usd;
        if distance >= self.tolerance {
            return 0.0;
        }
        let x = distance / self.tolerance;
        template.weight * (1.0 - x * x)
    }

    /// Fiat interval outside which every score is zero.
    pub fn fiat_range(&self) -> (f64, f64) {
        let lo = self.templates.first().map_or(0.0, |t| t.usd);
        let hi = self.templates.last().map_or(0.0, |t| t.usd);
        (lo * (1.0 - self.tolerance), hi * (1.0 + self.tolerance))
    }

    /// Rate intervals, one per template in ascending order, outside of which
    /// `classify(value, rate)` is zero.
    ///
    /// Bounds are widened slightly, so a sweep over these intervals visits every
    /// rate a full sweep would score above zero.
    pub fn rate_windows(&self, value: OutputValue) -> impl Iterator<Item = (f64, f64)> + '_ {
        let sats = value.sats() as f64;
        let eligible = self.is_eligible(value) && sats > 0.0;
        let tolerance = self.tolerance;
        self.templates
            .iter()
            .filter(move |_| eligible)
            .map(move |t| {
                let lo = t.usd * (1.0 - tolerance) * SATS_PER_BTC as f64 / sats;
                let hi = t.usd * (1.0 + tolerance) * SATS_PER_BTC as f64 / sats;
                (lo * (1.0 - RATE_BOUND_SLACK), hi * (1.0 + RATE_BOUND_SLACK))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn classifier() -> RoundAmountClassifier {
        RoundAmountClassifier::new(&ClassifierConfig::default()).unwrap()
    }

    fn sats(n: u64) -> OutputValue {
        OutputValue::from_sats(n).unwrap()
    }

    #[test]
    fn test_exact_fifty_dollars_scores_template_weight() {
        // 500,000 sats at $10,000/BTC is exactly $50
        let c = classifier();
        assert_eq!(c.classify(sats(500_000), 10_000.0), 0.55);
    }

    #[test]
    fn test_fifty_dollars_thirty_seven_scores_zero() {
        // $50.37 is 0.74% from $50 and far from everything else
        let c = classifier();
        assert_eq!(c.classify(sats(503_700), 10_000.0), 0.0);
        assert_eq!(c.score_fiat(50.37), 0.0);
    }

    #[test]
    fn test_confidence_decreases_with_distance() {
        let c = classifier();
        let exact = c.score_fiat(100.0);
        let near = c.score_fiat(100.1);
        let far = c.score_fiat(100.4);
        assert_eq!(exact, 1.0);
        assert!(near < exact && far < near && far > 0.0);
        // d = 0.001, tol = 0.005 => 1 - 0.04
        assert_relative_eq!(near, 0.96, epsilon = 1e-9);
        assert_eq!(c.score_fiat(100.5), 0.0);
    }

    #[test]
    fn test_symmetric_band() {
        let c = classifier();
        assert_relative_eq!(c.score_fiat(99.8), c.score_fiat(100.2), epsilon = 1e-9);
    }

    #[test]
    fn test_dust_and_ceiling() {
        let c = classifier();
        // 999 sats at $10,010,010/BTC would be exactly $100
        assert_eq!(c.classify(sats(999), 10_010_010.01), 0.0);
        assert_eq!(c.classify(sats(0), 50_000.0), 0.0);
        assert_eq!(c.classify(sats(1_000_000_001), 10.0), 0.0);
        assert!(c.classify(sats(1_000_000_000), 10.0) > 0.0);
    }

    #[test]
    fn test_outside_template_span() {
        let c = classifier();
        assert_eq!(c.score_fiat(0.5), 0.0);
        assert_eq!(c.score_fiat(20_000.0), 0.0);
        let (lo, hi) = c.fiat_range();
        assert_relative_eq!(lo, 0.995, epsilon = 1e-12);
        assert_relative_eq!(hi, 10_050.0, epsilon = 1e-9);
    }

    #[test]
    fn test_between_templates_picks_closer() {
        let c = classifier();
        // Just above $20 and far below $25
        assert_relative_eq!(c.score_fiat(20.0), 0.55, epsilon = 1e-12);
        assert!(c.score_fiat(20.05) > 0.0);
        assert_eq!(c.score_fiat(22.5), 0.0);
        assert!(c.score_fiat(24.95) > 0.0);
    }

    #[test]
    fn test_rate_windows_cover_every_nonzero_rate() {
        let c = classifier();
        let value = sats(231_428);
        let windows: Vec<_> = c.rate_windows(value).collect();
        assert_eq!(windows.len(), c.templates().len());
        assert!(windows.windows(2).all(|w| w[0].1 < w[1].0));

        // Scan a coarse range and check every non-zero score lies in a window
        let mut rate = 300.0;
        while rate < 10_000_000.0 {
            if c.classify(value, rate) > 0.0 {
                assert!(windows.iter().any(|&(lo, hi)| rate >= lo && rate <= hi));
            }
            rate *= 1.0003;
        }
    }

    #[test]
    fn test_rate_windows_empty_for_dust() {
        let c = classifier();
        assert_eq!(c.rate_windows(sats(10)).count(), 0);
    }

    #[test]
    fn test_templates_sorted_on_build() {
        let mut config = ClassifierConfig::default();
        config.templates.reverse();
        let c = RoundAmountClassifier::new(&config).unwrap();
        assert!(c.templates().windows(2).all(|w| w[0].usd < w[1].usd));
        assert_eq!(c.version(), "usd-round-v1");
    }

    #[test]
    fn test_deterministic() {
        let c = classifier();
        let a = c.classify(sats(123_457), 81_004.7);
        let b = c.classify(sats(123_457), 81_004.7);
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
