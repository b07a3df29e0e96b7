//! Block decoding.
//!
//! Parses a consensus-serialized block, applies the transaction filter policy
//! and reduces the result to the non-zero output values of the kept
//! transactions.

use std::collections::HashSet;

use bitcoin::block::Header;
use bitcoin::consensus::encode::{self, deserialize_partial};
use oracle_core::{config::TxFilterConfig, Block, Error, Height, OutputValue, RawBlock, TimestampSecs};
use thiserror::Error;
use tracing::trace;

use crate::filter::TxFilter;

/// Why a block payload could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload ends before the block does")]
    Truncated,

    #[error("malformed block: {0}")]
    Malformed(String),

    #[error("block has no transactions")]
    NoTransactions,

    #[error("{0} trailing bytes after the last transaction")]
    TrailingBytes(usize),

    #[error("output value {sats} exceeds the money supply")]
    ValueOutOfRange { sats: u64 },

    #[error("unsupported segwit flag {0:#04x}")]
    UnsupportedSegwitFlag(u8),
}

impl DecodeError {
    /// Attach the block height.
    pub fn at_height(self, height: Height) -> Error {
        Error::decode(height, self.to_string())
    }
}

impl From<encode::Error> for DecodeError {
    fn from(err: encode::Error) -> Self {
        match err {
            encode::Error::Io(_) => DecodeError::Truncated,
            encode::Error::UnsupportedSegwitFlag(flag) => DecodeError::UnsupportedSegwitFlag(flag),
            other => DecodeError::Malformed(other.to_string()),
        }
    }
}

/// Read the header timestamp without decoding the block.
pub fn peek_timestamp(payload: &[u8]) -> Result<TimestampSecs, DecodeError> {
    let (header, _) = deserialize_partial::<Header>(payload)?;
    Ok(header.time)
}

/// Decodes block payloads under a fixed filter policy.
#[derive(Debug, Clone)]
pub struct BlockDecoder {
    filter: TxFilter,
}

impl BlockDecoder {
    pub fn new(config: TxFilterConfig) -> Self {
        Self {
            filter: TxFilter::new(config),
        }
    }

    pub fn filter(&self) -> &TxFilter {
        &self.filter
    }

    /// Decode a source block, tagging errors with its height.
    pub fn decode_raw(&self, raw: &RawBlock) -> oracle_core::Result<Block> {
        self.decode(&raw.payload, raw.height)
            .map_err(|e| e.at_height(raw.height))
    }

    /// Decode `payload` as the block at `height`.
    pub fn decode(&self, payload: &[u8], height: Height) -> Result<Block, DecodeError> {
        let (block, consumed) = deserialize_partial::<bitcoin::Block>(payload)?;
        if consumed < payload.len() {
            return Err(DecodeError::TrailingBytes(payload.len() - consumed));
        }
        if block.txdata.is_empty() {
            return Err(DecodeError::NoTransactions);
        }

        let want_txids = self.filter.needs_txids();
        let mut created = HashSet::new();
        let mut outputs = Vec::new();
        let mut filtered = 0u32;

        for (index, tx) in block.txdata.iter().enumerate() {
            let mut values = Vec::with_capacity(tx.output.len());
            for out in &tx.output {
                let sats = out.value.to_sat();
                let value =
                    OutputValue::from_sats(sats).ok_or(DecodeError::ValueOutOfRange { sats })?;
                values.push(value);
            }

            match self.filter.check(tx, &created) {
                None => outputs.extend(values.into_iter().filter(|v| !v.is_zero())),
                Some(reason) => {
                    filtered += 1;
                    trace!(height, index, reason = reason.as_str(), "transaction filtered");
                }
            }
            if want_txids {
                created.insert(tx.compute_txid());
            }
        }

        let tx_count = block.txdata.len() as u32;
        Ok(Block::new(height, block.header.time, outputs).with_tx_stats(tx_count, filtered))
    }
}
