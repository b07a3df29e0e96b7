//! Core types and configuration for the utxo-oracle system.
//!
//! This crate provides shared types used across all other crates:
//! - Chain data types (raw blocks, decoded blocks, output values)
//! - Estimation results (per-block estimates, smoothed series, consensus)
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::OracleConfig;
pub use error::{Error, Result};
pub use types::*;
