//! Price estimation for the utxo-oracle system.
//!
//! This crate handles:
//! - The fixed trial-rate grid
//! - Round-amount classification of output values
//! - Per-block rate histograms and rate selection
//! - Confidence-weighted smoothing across blocks
//! - Consensus aggregation over a window of blocks

pub mod grid;
pub mod classifier;
pub mod histogram;
pub mod estimator;
pub mod smoother;
pub mod consensus;

pub use grid::RateGrid;
pub use classifier::RoundAmountClassifier;
pub use histogram::RateHistogram;
pub use estimator::PriceEstimator;
pub use smoother::Smoother;
pub use consensus::ConsensusAggregator;
