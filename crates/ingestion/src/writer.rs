//! Block payload builder.
//!
//! Assembles `bitcoin` blocks and consensus-encodes them into payloads the
//! decoder accepts. Used for fixtures and to persist synthetic chains; headers
//! carry no proof of work.

use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::Hash;
use bitcoin::{
    absolute, transaction, Amount, Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence,
    Transaction, TxIn, TxMerkleNode, TxOut, Txid, WPubkeyHash, Witness,
};
use oracle_core::{Height, RawBlock, TimestampSecs};

/// A deterministic fake txid.
pub fn synthetic_txid(n: u64) -> Txid {
    let mut bytes = [0xEE; 32];
    bytes[..8].copy_from_slice(&n.to_le_bytes());
    Txid::from_byte_array(bytes)
}

/// P2WPKH output with a filler key hash.
pub fn p2wpkh_output(sats: u64) -> TxOut {
    TxOut {
        value: Amount::from_sat(sats),
        script_pubkey: ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0xAB; 20])),
    }
}

/// Zero-value data carrier output.
pub fn op_return_output(data: &[u8]) -> TxOut {
    let mut script = vec![0x6a, data.len() as u8];
    script.extend_from_slice(data);
    TxOut {
        value: Amount::ZERO,
        script_pubkey: ScriptBuf::from_bytes(script),
    }
}

/// Segwit input spending `prev:vout` with a signature and a compressed key.
pub fn spending_input(prev: Txid, vout: u32) -> TxIn {
    TxIn {
        previous_output: OutPoint::new(prev, vout),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
        witness: Witness::from_slice(&[vec![0x30; 71], vec![0x02; 33]]),
    }
}

/// Version 2 transaction with no lock time.
pub fn transaction(input: Vec<TxIn>, output: Vec<TxOut>) -> Transaction {
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input,
        output,
    }
}

/// Coinbase paying `reward_sats` to one output.
pub fn coinbase_tx(reward_sats: u64, height_tag: u32) -> Transaction {
    let mut script_sig = vec![0x04];
    script_sig.extend_from_slice(&height_tag.to_le_bytes());
    let input = TxIn {
        previous_output: OutPoint::null(),
        script_sig: ScriptBuf::from_bytes(script_sig),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    };
    transaction(vec![input], vec![p2wpkh_output(reward_sats)])
}

/// One segwit input spending `prev:0` and one P2WPKH output per value.
pub fn payment_tx(prev: Txid, values: &[u64]) -> Transaction {
    transaction(
        vec![spending_input(prev, 0)],
        values.iter().map(|&v| p2wpkh_output(v)).collect(),
    )
}

/// Builds a block from transactions.
#[derive(Debug, Clone)]
pub struct BlockWriter {
    prev_blockhash: BlockHash,
    timestamp: TimestampSecs,
    txdata: Vec<Transaction>,
}

impl BlockWriter {
    pub fn new(timestamp: TimestampSecs) -> Self {
        Self {
            prev_blockhash: BlockHash::all_zeros(),
            timestamp,
            txdata: Vec::new(),
        }
    }

    pub fn prev_blockhash(mut self, hash: BlockHash) -> Self {
        self.prev_blockhash = hash;
        self
    }

    pub fn transaction(mut self, tx: Transaction) -> Self {
        self.txdata.push(tx);
        self
    }

    pub fn transactions(mut self, txs: impl IntoIterator<Item = Transaction>) -> Self {
        self.txdata.extend(txs);
        self
    }

    /// The block, with its merkle root filled in.
    pub fn build(self) -> Block {
        let mut block = Block {
            header: Header {
                version: BlockVersion::TWO,
                prev_blockhash: self.prev_blockhash,
                merkle_root: TxMerkleNode::all_zeros(),
                time: self.timestamp,
                bits: CompactTarget::from_consensus(0x1703_a30c),
                nonce: 0,
            },
            txdata: self.txdata,
        };
        if let Some(root) = block.compute_merkle_root() {
            block.header.merkle_root = root;
        }
        block
    }

    pub fn serialize(self) -> Vec<u8> {
        serialize(&self.build())
    }

    pub fn into_raw(self, height: Height) -> RawBlock {
        RawBlock::new(height, self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_header_layout() {
        let payload = BlockWriter::new(1_700_000_000)
            .transaction(coinbase_tx(625_000_000, 1))
            .serialize();
        assert_eq!(&payload[68..72], &1_700_000_000u32.to_le_bytes());
        // One transaction
        assert_eq!(payload[80], 1);
    }

    #[test]
    fn test_merkle_root_committed() {
        let block = BlockWriter::new(0)
            .transaction(coinbase_tx(625_000_000, 1))
            .transaction(payment_tx(synthetic_txid(1), &[10_000, 20_000]))
            .build();
        assert!(block.check_merkle_root());
    }

    #[test]
    fn test_payment_is_segwit_coinbase_is_not() {
        let payment = payment_tx(synthetic_txid(1), &[10_000, 20_000]);
        assert!(!payment.is_coinbase());
        assert_eq!(payment.input[0].witness.len(), 2);

        let coinbase = coinbase_tx(625_000_000, 840_000);
        assert!(coinbase.is_coinbase());
        assert!(coinbase.input[0].witness.is_empty());
    }

    #[test]
    fn test_op_return_script() {
        assert!(op_return_output(b"memo").script_pubkey.is_op_return());
        assert!(!p2wpkh_output(1).script_pubkey.is_op_return());
    }

    #[test]
    fn test_synthetic_txids_distinct() {
        assert_ne!(synthetic_txid(1), synthetic_txid(2));
    }
}
