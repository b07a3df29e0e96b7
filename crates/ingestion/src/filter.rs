//! Transaction filter policy.
//!
//! Selects payment-like transactions whose outputs are likely to carry
//! fiat-priced amounts. Filters look at structure only (counts, sizes, the
//! OP_RETURN marker); scripts are never interpreted.

use std::collections::HashSet;

use bitcoin::{Transaction, Txid};
use oracle_core::config::TxFilterConfig;

/// Why a transaction was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Coinbase,
    TooManyInputs,
    OutputCount,
    OpReturn,
    WitnessItems,
    WitnessSize,
    SameBlockSpend,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Coinbase => "coinbase",
            RejectReason::TooManyInputs => "too_many_inputs",
            RejectReason::OutputCount => "output_count",
            RejectReason::OpReturn => "op_return",
            RejectReason::WitnessItems => "witness_items",
            RejectReason::WitnessSize => "witness_size",
            RejectReason::SameBlockSpend => "same_block_spend",
        }
    }
}

/// Applies a [`TxFilterConfig`] to decoded transactions.
#[derive(Debug, Clone)]
pub struct TxFilter {
    config: TxFilterConfig,
}

impl TxFilter {
    pub fn new(config: TxFilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TxFilterConfig {
        &self.config
    }

    /// Whether the decoder has to compute txids for this policy.
    pub fn needs_txids(&self) -> bool {
        self.config.exclude_same_block_spends
    }

    /// First reason `tx` fails the policy, if any.
    ///
    /// `created` holds the txids of every earlier transaction in the block.
    pub fn check(&self, tx: &Transaction, created: &HashSet<Txid>) -> Option<RejectReason> {
        let c = &self.config;
        let is_coinbase = tx.is_coinbase();

        if c.exclude_coinbase && is_coinbase {
            return Some(RejectReason::Coinbase);
        }
        if c.max_inputs.is_some_and(|max| tx.input.len() > max as usize) {
            return Some(RejectReason::TooManyInputs);
        }

        let outputs = tx.output.len();
        let above_max = c.max_outputs.is_some_and(|max| outputs > max as usize);
        if outputs < c.min_outputs as usize || above_max {
            return Some(RejectReason::OutputCount);
        }

        if c.exclude_op_return && tx.output.iter().any(|o| o.script_pubkey.is_op_return()) {
            return Some(RejectReason::OpReturn);
        }

        for input in &tx.input {
            if c.max_witness_items.is_some_and(|max| input.witness.len() > max as usize) {
                return Some(RejectReason::WitnessItems);
            }
            if let Some(max) = c.max_witness_bytes {
                let max = max as usize;
                let mut total = 0usize;
                for item in input.witness.iter() {
                    total += item.len();
                    if item.len() > max || total > max {
                        return Some(RejectReason::WitnessSize);
                    }
                }
            }
        }

        if c.exclude_same_block_spends
            && !is_coinbase
            && tx.input.iter().any(|i| created.contains(&i.previous_output.txid))
        {
            return Some(RejectReason::SameBlockSpend);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{
        coinbase_tx, op_return_output, p2wpkh_output, payment_tx, spending_input,
        synthetic_txid, transaction,
    };
    use bitcoin::Witness;

    fn payment(inputs: u64, outputs: u64) -> Transaction {
        transaction(
            (0..inputs).map(|i| spending_input(synthetic_txid(i), 0)).collect(),
            (0..outputs).map(|i| p2wpkh_output(10_000 + i)).collect(),
        )
    }

    #[test]
    fn test_default_accepts_simple_payment() {
        let filter = TxFilter::new(TxFilterConfig::default());
        assert_eq!(filter.check(&payment(1, 2), &HashSet::new()), None);
    }

    #[test]
    fn test_input_count() {
        let filter = TxFilter::new(TxFilterConfig::default());
        assert_eq!(filter.check(&payment(5, 2), &HashSet::new()), None);
        assert_eq!(
            filter.check(&payment(6, 2), &HashSet::new()),
            Some(RejectReason::TooManyInputs)
        );
    }

    #[test]
    fn test_output_count() {
        let filter = TxFilter::new(TxFilterConfig::default());
        assert_eq!(
            filter.check(&payment(1, 1), &HashSet::new()),
            Some(RejectReason::OutputCount)
        );
        assert_eq!(
            filter.check(&payment(1, 3), &HashSet::new()),
            Some(RejectReason::OutputCount)
        );
    }

    #[test]
    fn test_coinbase() {
        let filter = TxFilter::new(TxFilterConfig::default());
        let mut tx = coinbase_tx(312_500_000, 1);
        tx.output.push(p2wpkh_output(1));
        assert_eq!(filter.check(&tx, &HashSet::new()), Some(RejectReason::Coinbase));
    }

    #[test]
    fn test_op_return() {
        let filter = TxFilter::new(TxFilterConfig::default());
        let mut tx = payment(1, 1);
        tx.output.push(op_return_output(&[1, 2, 3, 4]));
        assert_eq!(filter.check(&tx, &HashSet::new()), Some(RejectReason::OpReturn));
    }

    #[test]
    fn test_witness_limits() {
        let filter = TxFilter::new(TxFilterConfig::default());
        let mut tx = payment(1, 2);
        tx.input[0].witness = Witness::from_slice(&[vec![0u8; 72], vec![0u8; 33]]);
        assert_eq!(filter.check(&tx, &HashSet::new()), None);

        tx.input[0].witness = Witness::from_slice(&vec![vec![1u8]; 101]);
        assert_eq!(filter.check(&tx, &HashSet::new()), Some(RejectReason::WitnessItems));

        tx.input[0].witness = Witness::from_slice(&[vec![0u8; 300], vec![0u8; 300]]);
        assert_eq!(filter.check(&tx, &HashSet::new()), Some(RejectReason::WitnessSize));

        tx.input[0].witness = Witness::from_slice(&[vec![0u8; 501]]);
        assert_eq!(filter.check(&tx, &HashSet::new()), Some(RejectReason::WitnessSize));
    }

    #[test]
    fn test_same_block_spend() {
        let filter = TxFilter::new(TxFilterConfig::default());
        let tx = payment_tx(synthetic_txid(7), &[10_000, 20_000]);
        let mut created = HashSet::new();
        assert_eq!(filter.check(&tx, &created), None);
        created.insert(synthetic_txid(7));
        assert_eq!(filter.check(&tx, &created), Some(RejectReason::SameBlockSpend));
    }

    #[test]
    fn test_permissive_accepts_everything() {
        let filter = TxFilter::new(TxFilterConfig::permissive());
        let mut tx = payment(20, 7);
        tx.output.push(op_return_output(b"memo"));
        let created: HashSet<_> = tx.input.iter().map(|i| i.previous_output.txid).collect();
        assert_eq!(filter.check(&tx, &created), None);
        assert_eq!(filter.check(&coinbase_tx(1, 1), &created), None);
        assert!(!filter.needs_txids());
    }
}
