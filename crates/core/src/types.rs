//! Core data types for the utxo-oracle system.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Block height.
pub type Height = u64;

/// Block header timestamp in seconds since Unix epoch (UTC).
pub type TimestampSecs = u32;

/// Satoshis per bitcoin.
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Total money supply in satoshis; no single output can exceed it.
pub const MAX_MONEY_SATS: u64 = 21_000_000 * SATS_PER_BTC;

/// UTC calendar date of a block timestamp.
#[inline]
pub fn utc_date(ts: TimestampSecs) -> Option<NaiveDate> {
    DateTime::from_timestamp(i64::from(ts), 0).map(|dt| dt.date_naive())
}

/// A transaction output amount in satoshis.
///
/// Always within `0..=MAX_MONEY_SATS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct OutputValue(u64);

impl OutputValue {
    /// Create an output value, rejecting amounts above the money supply.
    pub fn from_sats(sats: u64) -> Option<Self> {
        (sats <= MAX_MONEY_SATS).then_some(Self(sats))
    }

    /// Amount in satoshis.
    #[inline]
    pub fn sats(self) -> u64 {
        self.0
    }

    /// Amount in BTC.
    #[inline]
    pub fn btc(self) -> f64 {
        self.0 as f64 / SATS_PER_BTC as f64
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u64> for OutputValue {
    type Error = String;

    fn try_from(sats: u64) -> std::result::Result<Self, Self::Error> {
        Self::from_sats(sats).ok_or_else(|| format!("{sats} sats exceeds the money supply"))
    }
}

impl From<OutputValue> for u64 {
    fn from(value: OutputValue) -> Self {
        value.0
    }
}

/// An undecoded block as delivered by a block source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// Height declared by the source.
    pub height: Height,
    /// Consensus-serialized block bytes.
    pub payload: Vec<u8>,
}

impl RawBlock {
    pub fn new(height: Height, payload: Vec<u8>) -> Self {
        Self { height, payload }
    }
}

/// A decoded block reduced to what value analysis needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub height: Height,
    /// Header timestamp.
    pub timestamp: TimestampSecs,
    /// Output values of every transaction that passed the filter policy.
    pub outputs: Vec<OutputValue>,
    /// Number of transactions in the block.
    pub tx_count: u32,
    /// Number of transactions rejected by the filter policy.
    pub filtered_tx_count: u32,
}

impl Block {
    /// Create a block with no filtering statistics.
    pub fn new(height: Height, timestamp: TimestampSecs, outputs: Vec<OutputValue>) -> Self {
        Self {
            height,
            timestamp,
            outputs,
            tx_count: 0,
            filtered_tx_count: 0,
        }
    }

    /// Attach transaction statistics.
    pub fn with_tx_stats(mut self, tx_count: u32, filtered_tx_count: u32) -> Self {
        self.tx_count = tx_count;
        self.filtered_tx_count = filtered_tx_count;
        self
    }
}

/// Result of estimating a single block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimateOutcome {
    /// At least one output matched a round-dollar template.
    Signal {
        /// Selected USD/BTC rate.
        raw_price: f64,
        /// Accumulated classifier weight at the winning rate.
        total_confidence: f64,
    },
    /// No output matched any template at any trial rate.
    NoSignal,
}

/// Price estimate for one block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockEstimate {
    /// Block height.
    pub height: Height,
    /// Header timestamp.
    pub timestamp: TimestampSecs,
    /// Outputs that were eligible for classification.
    pub output_count: u32,
    /// Estimation outcome.
    pub outcome: EstimateOutcome,
}

impl BlockEstimate {
    /// Raw price, or `None` for a no-signal block.
    #[inline]
    pub fn raw_price(&self) -> Option<f64> {
        match self.outcome {
            EstimateOutcome::Signal { raw_price, .. } => Some(raw_price),
            EstimateOutcome::NoSignal => None,
        }
    }

    /// Confidence at the winning rate; zero for a no-signal block.
    #[inline]
    pub fn confidence(&self) -> f64 {
        match self.outcome {
            EstimateOutcome::Signal {
                total_confidence, ..
            } => total_confidence,
            EstimateOutcome::NoSignal => 0.0,
        }
    }

    #[inline]
    pub fn is_signal(&self) -> bool {
        matches!(self.outcome, EstimateOutcome::Signal { .. })
    }
}

/// Per-block estimates in strictly increasing height order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<BlockEstimate>", into = "Vec<BlockEstimate>")]
pub struct EstimateSeries(Vec<BlockEstimate>);

impl EstimateSeries {
    /// Build a series, rejecting duplicate or decreasing heights.
    pub fn new(estimates: Vec<BlockEstimate>) -> Result<Self> {
        for pair in estimates.windows(2) {
            if pair[1].height <= pair[0].height {
                return Err(Error::OutOfOrder {
                    previous: pair[0].height,
                    found: pair[1].height,
                });
            }
        }
        Ok(Self(estimates))
    }

    pub fn as_slice(&self) -> &[BlockEstimate] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockEstimate> {
        self.0.iter()
    }

    /// Estimates that carry a price.
    pub fn signals(&self) -> impl Iterator<Item = &BlockEstimate> {
        self.0.iter().filter(|e| e.is_signal())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first_height(&self) -> Option<Height> {
        self.0.first().map(|e| e.height)
    }

    pub fn last_height(&self) -> Option<Height> {
        self.0.last().map(|e| e.height)
    }

    /// Number of no-signal blocks.
    pub fn no_signal_count(&self) -> usize {
        self.0.iter().filter(|e| !e.is_signal()).count()
    }
}

impl TryFrom<Vec<BlockEstimate>> for EstimateSeries {
    type Error = Error;

    fn try_from(estimates: Vec<BlockEstimate>) -> Result<Self> {
        Self::new(estimates)
    }
}

impl From<EstimateSeries> for Vec<BlockEstimate> {
    fn from(series: EstimateSeries) -> Self {
        series.0
    }
}

/// Smoothed trend over the signal blocks of an estimate series.
///
/// Every vector has the same length and is aligned with the signal estimates
/// the series was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSeries {
    /// Heights, passed through unmodified.
    pub heights_smooth: Vec<Height>,
    /// Timestamps, passed through unmodified.
    pub timestamps_smooth: Vec<TimestampSecs>,
    /// Smoothed prices.
    pub prices_smooth: Vec<f64>,
    /// Confidence of the block at each point.
    pub confidences: Vec<f64>,
}

impl SmoothedSeries {
    pub fn len(&self) -> usize {
        self.heights_smooth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights_smooth.is_empty()
    }
}

/// Which axis a consensus is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusAxis {
    /// Per-block raw estimates.
    Raw,
    /// Smoothed trend values.
    Smoothed,
}

/// The single reported price for a window of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Consensus price; `None` when the window carries no confidence at all.
    pub price: Option<f64>,
    /// First height of the window.
    pub window_start_height: Option<Height>,
    /// Last height of the window.
    pub window_end_height: Option<Height>,
    /// Blocks that received non-zero weight.
    pub contributing_blocks: u32,
    /// Sum of the weights that entered the average.
    pub total_confidence: f64,
}

impl ConsensusResult {
    /// An undefined consensus over the given window.
    pub fn undefined(window_start_height: Option<Height>, window_end_height: Option<Height>) -> Self {
        Self {
            price: None,
            window_start_height,
            window_end_height,
            contributing_blocks: 0,
            total_confidence: 0.0,
        }
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        self.price.is_some()
    }
}
