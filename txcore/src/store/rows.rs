//! The row-to-transaction index seam.
//!
//! Conceptually each row is the head of a linked list of mutations;
//! `prev_sql_tx` is the link. This index stores the chain-side head per
//! [`RefId`]; the pool overlay (the latest pool mutation per row) is
//! resolved separately and consulted first.

use sqlchain_types::{Block, RefId, TxId};

use crate::error::StoreError;

/// Maps each row (or table) to the last chain transaction that mutated it.
pub trait RowIndex {
    fn get(&self, ref_id: &RefId) -> Result<Option<TxId>, StoreError>;

    fn set(&mut self, ref_id: &RefId, tx_id: TxId) -> Result<(), StoreError>;

    fn remove(&mut self, ref_id: &RefId) -> Result<(), StoreError>;

    //------------------------------------------------------------------ provided
    /// Advances row heads to a block's SQL transactions, in slice order
    /// (the last mutation of a row within the block wins).
    fn update_on_block_add(&mut self, block: &Block) -> Result<(), StoreError> {
        for tx in &block.transactions {
            if let Some(sql) = &tx.sql {
                self.set(&sql.reference_id, tx.id())?;
            }
        }
        Ok(())
    }
}
