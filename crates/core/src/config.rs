//! Configuration structures for the utxo-oracle system.
//!
//! Every value here is a run-start constant: it is read once when the pipeline
//! is built and never mutated during a run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ConsensusAxis;

/// Version tag of the built-in round-amount template set.
pub const DEFAULT_TEMPLATE_SET_VERSION: &str = "usd-round-v1";

/// Main configuration for the oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Trial-rate grid configuration.
    pub grid: GridConfig,
    /// Round-amount classifier configuration.
    pub classifier: ClassifierConfig,
    /// Per-block estimator configuration.
    pub estimator: EstimatorConfig,
    /// Smoothing configuration.
    pub smoothing: SmoothingConfig,
    /// Consensus configuration.
    pub consensus: ConsensusConfig,
    /// Transaction filter policy applied while decoding.
    pub filters: TxFilterConfig,
    /// Run-loop configuration.
    pub run: RunConfig,
}

impl OracleConfig {
    /// Load a configuration from a JSON file. Missing sections take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.classifier.validate()?;
        self.estimator.validate()?;
        self.smoothing.validate()?;
        self.consensus.validate()?;
        self.run.validate()
    }
}

/// Upper bound on `GridConfig::max_rate_usd`; keeps milli-dollar arithmetic in range.
pub const MAX_GRID_RATE_USD: u64 = 1_000_000_000;

/// Trial-rate grid configuration.
///
/// The grid is built in integer milli-dollars: each point is the previous one
/// plus `previous / step_divisor`, so spacing is roughly `1 / step_divisor`
/// (0.1% by default, well inside the classifier tolerance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Lowest trial rate (USD per BTC).
    pub min_rate_usd: u64,
    /// Highest trial rate (USD per BTC).
    pub max_rate_usd: u64,
    /// Relative step denominator.
    pub step_divisor: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            min_rate_usd: 10,
            max_rate_usd: 10_000_000,
            step_divisor: 1_000,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_rate_usd == 0 || self.max_rate_usd <= self.min_rate_usd {
            return Err(Error::config("grid bounds must satisfy 0 < min_rate_usd < max_rate_usd"));
        }
        if self.max_rate_usd > MAX_GRID_RATE_USD {
            return Err(Error::config(format!(
                "max_rate_usd must be at most {MAX_GRID_RATE_USD}"
            )));
        }
        if self.step_divisor == 0 || self.min_rate_usd * 1_000 < self.step_divisor {
            return Err(Error::config(
                "step_divisor must be positive and at most min_rate_usd * 1000",
            ));
        }
        Ok(())
    }
}

/// A round fiat amount and its weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundTemplate {
    /// Amount in USD.
    pub usd: f64,
    /// Maximum confidence an exact match earns, in (0, 1].
    pub weight: f64,
}

impl RoundTemplate {
    pub const fn new(usd: f64, weight: f64) -> Self {
        Self { usd, weight }
    }
}

/// Built-in template set (`usd-round-v1`).
///
/// $100 is the most common round payment and anchors the set; the 1-2-5
/// denominations get high weight and the quarter values lower weight.
pub fn default_templates() -> Vec<RoundTemplate> {
    vec![
        RoundTemplate::new(1.0, 0.30),
        RoundTemplate::new(2.0, 0.15),
        RoundTemplate::new(5.0, 0.40),
        RoundTemplate::new(10.0, 0.60),
        RoundTemplate::new(20.0, 0.55),
        RoundTemplate::new(25.0, 0.30),
        RoundTemplate::new(50.0, 0.55),
        RoundTemplate::new(100.0, 1.00),
        RoundTemplate::new(200.0, 0.65),
        RoundTemplate::new(250.0, 0.30),
        RoundTemplate::new(500.0, 0.60),
        RoundTemplate::new(1_000.0, 0.60),
        RoundTemplate::new(2_000.0, 0.30),
        RoundTemplate::new(5_000.0, 0.20),
        RoundTemplate::new(10_000.0, 0.15),
    ]
}

/// Round-amount classifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Outputs below this many sats are never classified.
    pub dust_threshold_sats: u64,
    /// Outputs above this many sats are never classified.
    pub ceiling_sats: u64,
    /// Relative distance at which confidence reaches zero.
    pub relative_tolerance: f64,
    /// Round amounts tested against.
    pub templates: Vec<RoundTemplate>,
    /// Version tag reported alongside results.
    pub template_set_version: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            dust_threshold_sats: 1_000,
            ceiling_sats: 1_000_000_000,
            relative_tolerance: 0.005,
            templates: default_templates(),
            template_set_version: DEFAULT_TEMPLATE_SET_VERSION.to_string(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dust_threshold_sats == 0 || self.ceiling_sats <= self.dust_threshold_sats {
            return Err(Error::config(
                "classifier thresholds must satisfy 0 < dust_threshold_sats < ceiling_sats",
            ));
        }
        if !(self.relative_tolerance > 0.0 && self.relative_tolerance < 0.5) {
            return Err(Error::config("relative_tolerance must be in (0, 0.5)"));
        }
        if self.templates.is_empty() {
            return Err(Error::config("template set is empty"));
        }
        for t in &self.templates {
            if !(t.usd > 0.0 && t.usd.is_finite()) || !(t.weight > 0.0 && t.weight <= 1.0) {
                return Err(Error::config(format!(
                    "invalid template ${} (weight {})",
                    t.usd, t.weight
                )));
            }
        }
        Ok(())
    }
}

/// How the per-block rate is picked from the accumulated histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateSelection {
    /// The bucket with maximal weight (ties to the lower rate).
    Peak,
    /// Weighted mean of the buckets within `radius` of the peak.
    Centroid { radius: usize },
}

/// Largest accepted centroid radius, in grid buckets.
pub const MAX_CENTROID_RADIUS: usize = 1_000;

/// Per-block estimator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Rate selection rule.
    pub selection: RateSelection,
    /// Skip outputs that are exact multiples of `round_btc_modulus_sats`.
    pub exclude_round_btc: bool,
    /// Modulus for round-BTC detection.
    pub round_btc_modulus_sats: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            selection: RateSelection::Centroid { radius: 2 },
            exclude_round_btc: true,
            round_btc_modulus_sats: 100_000,
        }
    }
}

impl EstimatorConfig {
    fn validate(&self) -> Result<()> {
        if self.exclude_round_btc && self.round_btc_modulus_sats == 0 {
            return Err(Error::config("round_btc_modulus_sats must be positive"));
        }
        if let RateSelection::Centroid { radius } = self.selection {
            if radius > MAX_CENTROID_RADIUS {
                return Err(Error::config(format!(
                    "centroid radius must be at most {MAX_CENTROID_RADIUS}"
                )));
            }
        }
        Ok(())
    }
}

/// Smoothing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Centered window width; odd and at least 3.
    pub window: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { window: 9 }
    }
}

impl SmoothingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window < 3 || self.window % 2 == 0 {
            return Err(Error::config("smoothing window must be an odd integer >= 3"));
        }
        Ok(())
    }
}

/// Consensus configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Axis the consensus is computed over.
    pub axis: ConsensusAxis,
    /// Estimates further than this fraction from the weighted median get no weight.
    pub max_deviation: Option<f64>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            axis: ConsensusAxis::Smoothed,
            max_deviation: Some(0.25),
        }
    }
}

impl ConsensusConfig {
    fn validate(&self) -> Result<()> {
        match self.max_deviation {
            Some(d) if !(d > 0.0 && d.is_finite()) => {
                Err(Error::config("max_deviation must be positive"))
            }
            _ => Ok(()),
        }
    }
}

/// Transaction filter policy.
///
/// Defaults select simple payment-like transactions: few inputs, exactly two
/// outputs (payment plus change), no coinbase, no data carrier outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxFilterConfig {
    /// Drop the coinbase transaction.
    pub exclude_coinbase: bool,
    /// Maximum number of inputs.
    pub max_inputs: Option<u32>,
    /// Minimum number of outputs.
    pub min_outputs: u32,
    /// Maximum number of outputs.
    pub max_outputs: Option<u32>,
    /// Drop transactions with an OP_RETURN output.
    pub exclude_op_return: bool,
    /// Maximum witness items per input.
    pub max_witness_items: Option<u32>,
    /// Maximum witness bytes per item and per input.
    pub max_witness_bytes: Option<u32>,
    /// Drop transactions spending an output created earlier in the same block.
    pub exclude_same_block_spends: bool,
}

impl Default for TxFilterConfig {
    fn default() -> Self {
        Self {
            exclude_coinbase: true,
            max_inputs: Some(5),
            min_outputs: 2,
            max_outputs: Some(2),
            exclude_op_return: true,
            max_witness_items: Some(100),
            max_witness_bytes: Some(500),
            exclude_same_block_spends: true,
        }
    }
}

impl TxFilterConfig {
    /// Keep every transaction.
    pub fn permissive() -> Self {
        Self {
            exclude_coinbase: false,
            max_inputs: None,
            min_outputs: 0,
            max_outputs: None,
            exclude_op_return: false,
            max_witness_items: None,
            max_witness_bytes: None,
            exclude_same_block_spends: false,
        }
    }
}

/// Run-loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of worker threads (0 = available parallelism).
    pub workers: usize,
    /// Capacity of the queue between the block source and the workers.
    pub queue_capacity: usize,
    /// Capacity of the decoded-block cache.
    pub cache_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: 64,
            cache_capacity: 256,
        }
    }
}

impl RunConfig {
    fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be positive"));
        }
        Ok(())
    }

    /// Worker count with 0 resolved to the available parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
