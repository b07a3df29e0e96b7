//! Serialized result record.
//!
//! The only artifact handed to the presentation layer. Serialization is
//! deterministic: the same run output always produces the same bytes.

use std::path::Path;

use chrono::NaiveDate;
use oracle_core::{Error, Height, Result, TimestampSecs};
use serde::{Deserialize, Serialize};

use crate::pipeline::RunOutput;

/// Per-block and smoothed series plus the consensus price of one run.
///
/// The record carries two height axes. `heights`, `timestamps`, `prices`
/// and `confidences` have one entry per estimated block, no-signal blocks
/// included. `heights_smooth`, `timestamps_smooth` and `prices_smooth` have
/// one entry per signal block only, so `heights_smooth` is exactly the
/// subsequence of `heights` whose `prices` entry is non-null. Plot smoothed
/// prices against `heights_smooth` or `timestamps_smooth`, never by index
/// into the per-block axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Heights of every estimated block.
    pub heights: Vec<Height>,
    /// Header timestamps, aligned with `heights`.
    pub timestamps: Vec<TimestampSecs>,
    /// Raw prices, `null` for no-signal blocks.
    pub prices: Vec<Option<f64>>,
    /// Confidence at the winning rate, 0 for no-signal blocks.
    pub confidences: Vec<f64>,
    /// Heights of the signal blocks.
    pub heights_smooth: Vec<Height>,
    /// Timestamps of the signal blocks.
    pub timestamps_smooth: Vec<TimestampSecs>,
    /// Smoothed prices, aligned with `heights_smooth`.
    pub prices_smooth: Vec<f64>,
    /// Consensus price, `null` when undefined.
    pub consensus_price: Option<f64>,
    pub window_start_height: Option<Height>,
    pub window_end_height: Option<Height>,
    /// Blocks skipped because they failed to decode.
    pub decode_failures: u64,
    pub no_signal_blocks: u64,
    /// The run was cancelled; the series are a prefix.
    pub cancelled: bool,
    pub template_set_version: String,
    /// UTC day the run was bounded to.
    pub date: Option<NaiveDate>,
}

impl ResultRecord {
    pub fn from_output(output: &RunOutput) -> Self {
        let series = output.series.as_slice();
        Self {
            heights: series.iter().map(|e| e.height).collect(),
            timestamps: series.iter().map(|e| e.timestamp).collect(),
            prices: series.iter().map(|e| e.raw_price()).collect(),
            confidences: series.iter().map(|e| e.confidence()).collect(),
            heights_smooth: output.smoothed.heights_smooth.clone(),
            timestamps_smooth: output.smoothed.timestamps_smooth.clone(),
            prices_smooth: output.smoothed.prices_smooth.clone(),
            consensus_price: output.consensus.price,
            window_start_height: output.consensus.window_start_height,
            window_end_height: output.consensus.window_end_height,
            decode_failures: output.summary.decode_failures,
            no_signal_blocks: output.summary.no_signal,
            cancelled: output.summary.cancelled,
            template_set_version: output.template_set_version.clone(),
            date: output.date,
        }
    }

    /// Check that aligned series have equal lengths and heights increase.
    pub fn validate(&self) -> Result<()> {
        let n = self.heights.len();
        if self.timestamps.len() != n || self.prices.len() != n || self.confidences.len() != n {
            return Err(Error::data("per-block series lengths differ"));
        }
        let m = self.heights_smooth.len();
        if self.timestamps_smooth.len() != m || self.prices_smooth.len() != m {
            return Err(Error::data("smoothed series lengths differ"));
        }
        for heights in [&self.heights, &self.heights_smooth] {
            if let Some(pair) = heights.windows(2).find(|w| w[1] <= w[0]) {
                return Err(Error::OutOfOrder {
                    previous: pair[0],
                    found: pair[1],
                });
            }
        }
        let signal_heights = self
            .heights
            .iter()
            .zip(&self.prices)
            .filter(|(_, price)| price.is_some())
            .map(|(height, _)| height);
        if !signal_heights.eq(self.heights_smooth.iter()) {
            return Err(Error::data(
                "smoothed heights are not the signal blocks of the per-block axis",
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let record: Self = serde_json::from_str(json)?;
        record.validate()?;
        Ok(record)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}
