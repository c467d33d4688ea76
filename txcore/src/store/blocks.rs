//! The block index seam: transaction→block mapping and branch-aware
//! spent-output lookups.

use std::collections::BTreeSet;

use sqlchain_types::{Block, BlockHash, Transaction, TxId};

use crate::error::StoreError;

/// The chain-side transaction index.
///
/// A transaction can live in several blocks across branches; lookups that
/// need a single answer resolve the branch through a `tip`.
pub trait BlockIndex {
    /// Hashes of every block containing `tx_id`, across all branches.
    fn transaction_blocks(&self, tx_id: &TxId) -> Result<Vec<BlockHash>, StoreError>;

    /// The one hash among `hashes` lying on the branch ending at `tip`.
    fn choose_hash_under_tip(
        &self,
        hashes: &[BlockHash],
        tip: &BlockHash,
    ) -> Result<Option<BlockHash>, StoreError>;

    /// The transaction `tx_id` as stored in `block`.
    fn transaction_from_block(
        &self,
        tx_id: &TxId,
        block: &BlockHash,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Output indexes of `tx_id` spent on the branch ending at `tip`.
    fn spent_outputs(&self, tx_id: &TxId, tip: &BlockHash) -> Result<BTreeSet<u32>, StoreError>;

    /// Indexes a block's transactions. Idempotent.
    fn block_added(&mut self, block: &Block) -> Result<(), StoreError>;

    /// Drops a block from the index entirely.
    fn block_removed(&mut self, block: &Block) -> Result<(), StoreError>;

    //------------------------------------------------------------------ provided
    /// The transaction `tx_id` as seen from the branch ending at `tip`.
    fn transaction_under_tip(
        &self,
        tx_id: &TxId,
        tip: &BlockHash,
    ) -> Result<Option<Transaction>, StoreError> {
        let blocks = self.transaction_blocks(tx_id)?;
        if blocks.is_empty() {
            return Ok(None);
        }
        let Some(hash) = self.choose_hash_under_tip(&blocks, tip)? else {
            return Ok(None);
        };
        self.transaction_from_block(tx_id, &hash)
    }
}
