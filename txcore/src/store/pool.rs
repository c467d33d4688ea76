//! The unapproved-pool (mempool) seam.

use std::ops::ControlFlow;

use sqlchain_types::{Block, CurrencyOutput, OutPoint, RefId, Transaction, TxId};

use crate::error::StoreError;

/// The pool of transactions awaiting inclusion.
///
/// Arrival order is the pool's total order: it defines the tie-break for
/// lineage resolution and conflict pruning, and every provided method that
/// returns multiple transactions returns them in arrival order.
pub trait UnapprovedPool {
    /// Admits a transaction at the end of the arrival order.
    fn add(&mut self, tx: Transaction) -> Result<(), StoreError>;

    /// Removes a transaction; returns it if it was present.
    fn delete(&mut self, tx_id: &TxId) -> Result<Option<Transaction>, StoreError>;

    fn get_if_exists(&self, tx_id: &TxId) -> Result<Option<Transaction>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;

    /// Up to `limit` transactions in arrival order.
    fn transactions(&self, limit: usize) -> Result<Vec<Transaction>, StoreError>;

    /// Visits transactions in arrival order; `Break` stops the iteration.
    fn for_each(
        &self,
        visit: &mut dyn FnMut(&TxId, &Transaction) -> ControlFlow<()>,
    ) -> Result<(), StoreError>;

    /// Drops any cached state.
    fn clean(&mut self) -> Result<(), StoreError>;

    //------------------------------------------------------------------ provided
    /// Removes every transaction of a mined block (promotion, no rollback).
    fn delete_from_block(&mut self, block: &Block) -> Result<(), StoreError> {
        for tx in &block.transactions {
            self.delete(&tx.id())?;
        }
        Ok(())
    }

    /// Re-admits transactions of a canceled block, preserving their block
    /// order; coinbase and already-present transactions are skipped.
    fn add_from_canceled(&mut self, txs: Vec<Transaction>) -> Result<(), StoreError> {
        for tx in txs {
            if !tx.is_coinbase() && self.get_if_exists(&tx.id())?.is_none() {
                self.add(tx)?;
            }
        }
        Ok(())
    }

    /// The latest pool transaction (by arrival) whose SQL command touches
    /// `ref_id`.
    fn find_sql_reference_transaction(
        &self,
        ref_id: &RefId,
    ) -> Result<Option<TxId>, StoreError> {
        let mut found = None;
        self.for_each(&mut |id, tx| {
            if let Some(sql) = &tx.sql {
                if sql.reference_id == *ref_id {
                    found = Some(*id);
                }
            }
            ControlFlow::Continue(())
        })?;
        Ok(found)
    }

    /// The output `outpoint` references when its source transaction sits in
    /// the pool.
    fn pool_output(&self, outpoint: &OutPoint) -> Result<Option<CurrencyOutput>, StoreError> {
        Ok(self
            .get_if_exists(&outpoint.tx)?
            .and_then(|tx| tx.outputs.get(outpoint.vout as usize).cloned()))
    }

    /// Whether `outpoint` is produced by a pool transaction and not spent by
    /// any pool transaction other than `exclude`.
    fn output_unspent_in_pool(
        &self,
        outpoint: &OutPoint,
        exclude: &TxId,
    ) -> Result<bool, StoreError> {
        if self.pool_output(outpoint)?.is_none() {
            return Ok(false);
        }
        let mut spent = false;
        self.for_each(&mut |id, tx| {
            if id != exclude && tx.inputs.iter().any(|i| i.outpoint() == *outpoint) {
                spent = true;
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })?;
        Ok(!spent)
    }

    /// Pool transactions consuming outputs of `tx_id`, in arrival order.
    fn currency_txs_prepared_by(&self, tx_id: &TxId) -> Result<Vec<TxId>, StoreError> {
        let mut dependents = Vec::new();
        self.for_each(&mut |id, tx| {
            if tx.inputs.iter().any(|i| i.prev_tx == *tx_id) {
                dependents.push(*id);
            }
            ControlFlow::Continue(())
        })?;
        Ok(dependents)
    }

    /// Pool transactions whose SQL command links `tx_id` as its base, in
    /// arrival order.
    fn sql_dependents_of(&self, tx_id: &TxId) -> Result<Vec<TxId>, StoreError> {
        let mut dependents = Vec::new();
        self.for_each(&mut |id, tx| {
            if let Some(sql) = &tx.sql {
                if sql.prev_sql_tx.as_ref() == Some(tx_id) {
                    dependents.push(*id);
                }
            }
            ControlFlow::Continue(())
        })?;
        Ok(dependents)
    }

    /// Whether every pool-resolved input of `tx` references a pool
    /// transaction that arrived before `before`.
    fn currency_inputs_were_before(
        &self,
        tx: &Transaction,
        before: &TxId,
    ) -> Result<bool, StoreError> {
        let Some(limit) = self.arrival_position(before)? else {
            return Ok(false);
        };
        for input in &tx.inputs {
            if let Some(position) = self.arrival_position(&input.prev_tx)? {
                if position >= limit {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Position of `tx_id` in the arrival order, if present.
    fn arrival_position(&self, tx_id: &TxId) -> Result<Option<usize>, StoreError> {
        let mut position = 0;
        let mut found = None;
        self.for_each(&mut |id, _| {
            if id == tx_id {
                found = Some(position);
                return ControlFlow::Break(());
            }
            position += 1;
            ControlFlow::Continue(())
        })?;
        Ok(found)
    }
}

/// IDs to drop from `txs` (given in arrival order) so that no two remaining
/// transactions share a confirmed input; the earliest arrival keeps each
/// contested outpoint.
pub fn detect_conflicts<'a>(txs: impl IntoIterator<Item = &'a Transaction>) -> Vec<TxId> {
    let mut claimed: Vec<OutPoint> = Vec::new();
    let mut losers = Vec::new();
    for tx in txs {
        let outpoints: Vec<OutPoint> = tx.inputs.iter().map(|i| i.outpoint()).collect();
        if outpoints.iter().any(|op| claimed.contains(op)) {
            losers.push(tx.id());
        } else {
            claimed.extend(outpoints);
        }
    }
    losers
}
