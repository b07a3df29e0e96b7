//! Block ingestion for the utxo-oracle system.
//!
//! This crate handles:
//! - Block sources (in-memory, persisted block files)
//! - Consensus-format block decoding down to output values (via `bitcoin`)
//! - Transaction filter policy
//! - Caller-owned decoded-block cache
//! - Block payload writing for fixtures and tooling

pub mod cache;
pub mod decoder;
pub mod filter;
pub mod source;
pub mod writer;

pub use cache::{BlockCache, CacheStats};
pub use decoder::{peek_timestamp, BlockDecoder, DecodeError};
pub use filter::{RejectReason, TxFilter};
pub use source::{BlockFileFormat, BlockSource, DirectorySource, MemorySource};
pub use writer::{
    coinbase_tx, op_return_output, p2wpkh_output, payment_tx, spending_input, synthetic_txid,
    transaction, BlockWriter,
};
