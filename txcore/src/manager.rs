//! The transaction manager: the single-writer orchestrator owning the SQL
//! engine, the stores, and the signature backend.
//!
//! All mutating operations take `&mut self`; block-event handlers,
//! reception, cancellation, and mining selection are mutually exclusive by
//! construction. Embedders that need concurrency serialize calls through a
//! single mutation queue.

use indexmap::{IndexMap, IndexSet};

use sqlchain_types::{pubkey_hash, Block, BlockHash, OutPoint, SqlUpdate, Transaction, TxId};

use crate::{
    builder,
    config::Config,
    engine::SqlEngine,
    error::CoreError,
    sql::QueryProcessor,
    store::{detect_conflicts, BlockIndex, RowIndex, UnapprovedPool, UtxoStore},
    verify::{self, SignatureBackend},
};

//---------------------------------------------------------------------------------------------------- Types
/// Outcome of a query submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Not a mutation; passed through to the engine, nothing recorded.
    ReadOnly,
    /// The mutation was executed and admitted to the pool.
    Executed(TxId),
}

/// Confirmed and unconfirmed balance of one address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddressBalance {
    /// Sum of confirmed unspent outputs.
    pub approved: u64,
    /// Pool delta; negative while an unconfirmed spend is pending.
    pub pending: i64,
}

impl AddressBalance {
    /// `approved + pending`, clamped at zero.
    pub fn total(&self) -> u64 {
        let total = i128::from(self.approved) + i128::from(self.pending);
        u64::try_from(total).unwrap_or(0)
    }
}

//---------------------------------------------------------------------------------------------------- TransactionManager
/// The orchestrator.
pub struct TransactionManager<E, U, P, B, R, S> {
    engine: E,
    utxo: U,
    pool: P,
    blocks: B,
    rows: R,
    sigs: S,
    config: Config,
}

impl<E, U, P, B, R, S> TransactionManager<E, U, P, B, R, S>
where
    E: SqlEngine,
    U: UtxoStore,
    P: UnapprovedPool,
    B: BlockIndex,
    R: RowIndex,
    S: SignatureBackend,
{
    pub fn new(engine: E, utxo: U, pool: P, blocks: B, rows: R, sigs: S, config: Config) -> Self {
        Self {
            engine,
            utxo,
            pool,
            blocks,
            rows,
            sigs,
            config,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn utxo(&self) -> &U {
        &self.utxo
    }

    pub fn blocks(&self) -> &B {
        &self.blocks
    }

    pub fn rows(&self) -> &R {
        &self.rows
    }

    //------------------------------------------------------------------ Submission
    /// Entry point of the signed-submission flow.
    ///
    /// Non-mutations pass through to the engine. Mutations require a pubkey
    /// credential ([`CoreError::PubKeyRequired`]); with a pubkey but no
    /// signature the transaction is assembled (rollback computed from the
    /// pre-image, lineage resolved) and handed back for signing via
    /// [`CoreError::SignatureRequired`]; with a signature and the previously
    /// returned transaction bytes, the signed transaction is received and
    /// its SQL executed.
    pub fn execute_query(&mut self, sql: &str) -> Result<QueryOutcome, CoreError> {
        let parsed = QueryProcessor::new(&mut self.engine).parse_query(sql)?;

        if !parsed.statement.kind().is_mutation() {
            self.engine.execute(&parsed.canonical)?;
            return Ok(QueryOutcome::ReadOnly);
        }

        let Some(pubkey) = parsed.credentials.pubkey.clone() else {
            return Err(CoreError::PubKeyRequired);
        };

        if let (Some(signature), Some(tx_bytes)) =
            (&parsed.credentials.signature, &parsed.credentials.tx_bytes)
        {
            let mut tx = Transaction::from_bytes(tx_bytes)
                .map_err(|e| CoreError::TxDecode(e.to_string()))?;
            // The countersigned bytes must replay this very statement.
            if tx.sql.as_ref().map(|s| s.canonical_query.as_str()) != Some(parsed.canonical.as_str())
            {
                return Err(CoreError::ResubmissionMismatch);
            }
            builder::attach_signature(&mut tx, &pubkey, signature);
            let tx_id = tx.id();
            self.received_new_transaction(tx, true)?;
            return Ok(QueryOutcome::Executed(tx_id));
        }

        // First round: build the unsigned transaction. The rollback is
        // synthesized from the pre-image here, before any execution.
        let update = QueryProcessor::new(&mut self.engine).make_sql_update(&parsed)?;
        let prepared = builder::new_sql_transaction(
            &self.utxo,
            &self.pool,
            &self.rows,
            &self.config,
            &pubkey,
            update,
            parsed.statement.kind(),
            None,
            crate::current_unix_timestamp(),
        )?;
        Err(CoreError::SignatureRequired {
            tx_bytes: prepared.tx.to_bytes(),
            sign_data: prepared.sign_data,
        })
    }

    /// Receives a finished transaction: quick-verifies, optionally executes
    /// its SQL optimistically, and admits it to the pool.
    ///
    /// Re-receiving a transaction already in the pool is an idempotent
    /// no-op. A SQL execution failure rejects the transaction without
    /// admitting it; no rollback is needed since execution did not complete.
    pub fn received_new_transaction(
        &mut self,
        tx: Transaction,
        execute_sql: bool,
    ) -> Result<(), CoreError> {
        let tx_id = tx.id();
        if self.pool.get_if_exists(&tx_id)?.is_some() {
            tracing::debug!(tx = %hex::encode(tx_id), "transaction already in pool");
            return Ok(());
        }

        verify::verify_quick(&tx, &self.utxo, &self.pool, &self.sigs)?;

        if execute_sql {
            if let Some(sql) = &tx.sql {
                self.engine.execute(&sql.canonical_query)?;
            }
        }

        self.pool.add(tx)?;
        tracing::info!(tx = %hex::encode(tx_id), "admitted transaction to pool");
        Ok(())
    }

    //------------------------------------------------------------------ Cancellation
    /// Cancels a pool transaction: dependents first (depth-first from
    /// leaves, later arrivals first, so rollbacks run LIFO), then its own
    /// SQL rollback, then removal from the pool.
    pub fn cancel_transaction(&mut self, tx_id: &TxId) -> Result<(), CoreError> {
        let tx = self
            .pool
            .get_if_exists(tx_id)?
            .ok_or(CoreError::NotInPool(*tx_id))?;

        let mut dependents: IndexSet<TxId> = IndexSet::new();
        dependents.extend(self.pool.currency_txs_prepared_by(tx_id)?);
        dependents.extend(self.pool.sql_dependents_of(tx_id)?);
        for dependent in dependents.iter().rev() {
            if self.pool.get_if_exists(dependent)?.is_some() {
                self.cancel_transaction(dependent)?;
            }
        }

        if let Some(sql) = &tx.sql {
            self.engine.execute(&sql.rollback_query)?;
        }
        self.pool.delete(tx_id)?;
        tracing::info!(tx = %hex::encode(tx_id), "canceled transaction");
        Ok(())
    }

    //------------------------------------------------------------------ Mining selection
    /// Pulls up to `n` pool transactions for a new block on `tip`.
    ///
    /// Each candidate is deep-verified with the in-progress batch as its
    /// predecessor window; failures are canceled (with rollback). A final
    /// conflict pass prunes input-overlapping survivors, keeping the
    /// earliest arrival. Cancellation cascades may evict batch members, so
    /// the batch is re-checked against pool membership before returning.
    pub fn transactions_for_new_block(
        &mut self,
        n: usize,
        tip: &BlockHash,
    ) -> Result<Vec<Transaction>, CoreError> {
        let limit = n.min(self.config.block_tx_limit);
        let candidates = self.pool.transactions(limit)?;

        let mut batch: IndexMap<TxId, Transaction> = IndexMap::new();
        let mut failed = Vec::new();
        for tx in candidates {
            let tx_id = tx.id();
            match verify::verify_deep(&tx, tip, &batch, &self.blocks, &self.sigs) {
                Ok(()) => {
                    batch.insert(tx_id, tx);
                }
                Err(error) => {
                    tracing::warn!(
                        tx = %hex::encode(tx_id),
                        %error,
                        "pool transaction failed deep verification",
                    );
                    failed.push(tx_id);
                }
            }
        }
        for tx_id in &failed {
            if self.pool.get_if_exists(tx_id)?.is_some() {
                self.cancel_transaction(tx_id)?;
            }
        }

        for tx_id in detect_conflicts(batch.values()) {
            batch.shift_remove(&tx_id);
            if self.pool.get_if_exists(&tx_id)?.is_some() {
                self.cancel_transaction(&tx_id)?;
            }
        }

        let mut selected = Vec::with_capacity(batch.len());
        for (tx_id, tx) in batch {
            if self.pool.get_if_exists(&tx_id)?.is_some() {
                selected.push(tx);
            }
        }
        Ok(selected)
    }

    //------------------------------------------------------------------ Block events
    /// A block was added to the chain; `on_top` means it extends the
    /// primary chain and its state must be applied.
    pub fn on_block_added(&mut self, block: &Block, on_top: bool) -> Result<(), CoreError> {
        self.blocks.block_added(block)?;
        if !on_top {
            tracing::info!(height = block.height, "indexed side-branch block");
            return Ok(());
        }
        self.apply_block_on_top(block)
    }

    /// Branch-switch counterpart of [`Self::on_block_added`] with
    /// `on_top = true`; the block is already indexed on its branch.
    pub fn on_block_added_to_primary_chain(&mut self, block: &Block) -> Result<(), CoreError> {
        self.blocks.block_added(block)?;
        self.apply_block_on_top(block)
    }

    /// A block was dropped from the chain entirely. Its transactions remain
    /// logically valid: they re-enter the pool *without* rollback (their
    /// SQL post-image stays live), and the UTXO delta is reverted.
    pub fn on_block_removed(&mut self, block: &Block) -> Result<(), CoreError> {
        self.blocks.block_removed(block)?;
        let txs = block
            .transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .cloned()
            .collect();
        self.pool.add_from_canceled(txs)?;
        self.utxo.update_on_block_cancel(block)?;
        tracing::info!(height = block.height, "re-admitted removed block to pool");
        Ok(())
    }

    /// A block left the primary chain during a branch switch. The only path
    /// that runs SQL rollback for chain transactions: statements are rolled
    /// back in reverse slice order (rollbacks are computed against the
    /// immediate pre-image and are only valid LIFO), coinbase skipped, and
    /// per-row index heads rewind along their `prev_sql_tx` links.
    pub fn on_block_removed_from_primary_chain(&mut self, block: &Block) -> Result<(), CoreError> {
        for tx in block.transactions.iter().rev() {
            if tx.is_coinbase() {
                continue;
            }
            if let Some(sql) = &tx.sql {
                self.engine.execute(&sql.rollback_query)?;
                self.rewind_row_head(tx.id(), sql)?;
            }
        }
        self.utxo.update_on_block_cancel(block)?;
        tracing::info!(height = block.height, "rolled back block from primary chain");
        Ok(())
    }

    /// Re-receives transactions of canceled blocks with SQL execution;
    /// individual failures (conflicts with the new chain) are logged and
    /// skipped.
    pub fn receive_transactions_from_canceled_blocks(
        &mut self,
        txs: Vec<Transaction>,
    ) -> Result<(), CoreError> {
        for tx in txs {
            if tx.is_coinbase() {
                continue;
            }
            let tx_id = tx.id();
            if let Err(error) = self.received_new_transaction(tx, true) {
                tracing::warn!(
                    tx = %hex::encode(tx_id),
                    %error,
                    "skipping re-reception of canceled-block transaction",
                );
            }
        }
        Ok(())
    }

    //------------------------------------------------------------------ Balance
    /// Confirmed + pending balance of `address` (a pubkey hash).
    ///
    /// Pending adds pool outputs to the address that no pool transaction
    /// spends, and subtracts the values of pool inputs whose source is a
    /// confirmed unspent output. Inputs resolvable only inside the pool do
    /// not reduce pending.
    pub fn address_balance(&self, address: &[u8]) -> Result<AddressBalance, CoreError> {
        let approved = self.utxo.address_balance(address)?;
        let pool_txs = self.pool.transactions(usize::MAX)?;

        let mut pending: i64 = 0;
        for tx in &pool_txs {
            let tx_id = tx.id();
            for (vout, output) in tx.outputs.iter().enumerate() {
                if output.pubkey_hash != address {
                    continue;
                }
                let outpoint = OutPoint {
                    tx: tx_id,
                    vout: vout as u32,
                };
                let spent_in_pool = pool_txs
                    .iter()
                    .any(|other| other.inputs.iter().any(|i| i.outpoint() == outpoint));
                if !spent_in_pool {
                    pending += i64::try_from(output.amount).unwrap_or(i64::MAX);
                }
            }
            for input in &tx.inputs {
                if pubkey_hash(&input.pubkey).as_slice() != address {
                    continue;
                }
                if let Some(value) = self.utxo.input_value(&input.outpoint())? {
                    pending -= i64::try_from(value).unwrap_or(i64::MAX);
                }
            }
        }

        Ok(AddressBalance { approved, pending })
    }

    //------------------------------------------------------------------ Internals
    /// Applies a block's state on top of the primary chain: SQL of
    /// transactions that were never in the pool executes now, pool
    /// transactions are promoted out without rollback, and the UTXO and
    /// row indexes advance.
    fn apply_block_on_top(&mut self, block: &Block) -> Result<(), CoreError> {
        for tx in &block.transactions {
            let Some(sql) = &tx.sql else { continue };
            if self.pool.get_if_exists(&tx.id())?.is_none() {
                self.engine.execute(&sql.canonical_query)?;
            }
        }
        self.pool.delete_from_block(block)?;
        self.utxo.update_on_block_add(block)?;
        self.rows.update_on_block_add(block)?;
        tracing::info!(
            height = block.height,
            txs = block.transactions.len(),
            "applied block on top of primary chain",
        );
        Ok(())
    }

    /// Rewinds one row head after rolling `tx_id` back.
    ///
    /// The head moves to `prev_sql_tx` only when the base mutated the same
    /// row; a table-level base (INSERT after CREATE TABLE) or a missing
    /// base unmaps the row.
    fn rewind_row_head(&mut self, tx_id: TxId, sql: &SqlUpdate) -> Result<(), CoreError> {
        if self.rows.get(&sql.reference_id)? != Some(tx_id) {
            return Ok(());
        }
        match sql.prev_sql_tx {
            None => self.rows.remove(&sql.reference_id)?,
            Some(prev) => {
                let same_row = self
                    .lookup_tx_anywhere(&prev)?
                    .and_then(|tx| tx.sql)
                    .is_some_and(|s| s.reference_id == sql.reference_id);
                if same_row {
                    self.rows.set(&sql.reference_id, prev)?;
                } else {
                    self.rows.remove(&sql.reference_id)?;
                }
            }
        }
        Ok(())
    }

    /// A transaction by ID, from the pool or any indexed block.
    fn lookup_tx_anywhere(&self, tx_id: &TxId) -> Result<Option<Transaction>, CoreError> {
        if let Some(tx) = self.pool.get_if_exists(tx_id)? {
            return Ok(Some(tx));
        }
        for hash in self.blocks.transaction_blocks(tx_id)? {
            if let Some(tx) = self.blocks.transaction_from_block(tx_id, &hash)? {
                return Ok(Some(tx));
            }
        }
        Ok(None)
    }
}
