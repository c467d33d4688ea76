//! Block type.

//---------------------------------------------------------------------------------------------------- Import
use serde::{Deserialize, Serialize};

use crate::transaction::{Transaction, TxId};

//---------------------------------------------------------------------------------------------------- Block
/// A block's content hash.
pub type BlockHash = [u8; 32];

/// A block of transactions.
///
/// Transaction slice order is authoritative: SQL commands are applied in
/// slice order when the block lands on the primary chain and rolled back in
/// reverse slice order when it leaves it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub prev: BlockHash,
    pub time: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block's content hash: BLAKE3 over the canonical header plus the
    /// ordered transaction IDs.
    pub fn hash(&self) -> BlockHash {
        let header = BlockPreimage {
            height: self.height,
            prev: self.prev,
            time: self.time,
            tx_ids: self.transactions.iter().map(Transaction::id).collect(),
        };
        let bytes = serde_json::to_vec(&header).expect("serializing a block header to JSON");
        blake3::hash(&bytes).into()
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.is_coinbase())
    }
}

#[derive(Serialize)]
struct BlockPreimage {
    height: u64,
    prev: BlockHash,
    time: u64,
    tx_ids: Vec<TxId>,
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_commits_to_transaction_order() {
        let tx = |time| Transaction {
            time,
            inputs: vec![],
            outputs: vec![crate::CurrencyOutput {
                amount: 1,
                pubkey_hash: vec![7],
            }],
            sql: None,
            signer: vec![],
            signature: vec![],
        };

        let block = Block {
            height: 1,
            prev: [0; 32],
            time: 100,
            transactions: vec![tx(1), tx(2)],
        };
        let mut reversed = block.clone();
        reversed.transactions.reverse();

        assert_ne!(block.hash(), reversed.hash());
    }
}
