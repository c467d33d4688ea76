//! In-memory implementations of the four store seams.

use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;

use indexmap::IndexMap;

use sqlchain_txcore::{
    store::{BlockIndex, RowIndex, UnapprovedPool, UnspentOutput, UtxoStore},
    StoreError,
};
use sqlchain_types::{Block, BlockHash, CurrencyOutput, OutPoint, RefId, Transaction, TxId};

//---------------------------------------------------------------------------------------------------- MemoryUtxoStore
/// The unspent-output set over a map, with a per-block delta journal so
/// cancellation restores the set exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryUtxoStore {
    unspent: IndexMap<OutPoint, CurrencyOutput>,
    journal: HashMap<BlockHash, BlockDelta>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct BlockDelta {
    spent: Vec<(OutPoint, CurrencyOutput)>,
    created: Vec<OutPoint>,
}

impl MemoryUtxoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UtxoStore for MemoryUtxoStore {
    fn get_unspent(&self, outpoint: &OutPoint) -> Result<Option<CurrencyOutput>, StoreError> {
        Ok(self.unspent.get(outpoint).cloned())
    }

    fn address_balance(&self, address: &[u8]) -> Result<u64, StoreError> {
        Ok(self
            .unspent
            .values()
            .filter(|out| out.pubkey_hash == address)
            .map(|out| out.amount)
            .sum())
    }

    fn new_transaction_inputs(
        &self,
        address: &[u8],
        amount: u64,
        pending_inputs: &[OutPoint],
    ) -> Result<Vec<UnspentOutput>, StoreError> {
        let mut selected = Vec::new();
        let mut total = 0u64;
        for (outpoint, output) in &self.unspent {
            if total >= amount {
                break;
            }
            if output.pubkey_hash == address && !pending_inputs.contains(outpoint) {
                total += output.amount;
                selected.push(UnspentOutput {
                    outpoint: *outpoint,
                    output: output.clone(),
                });
            }
        }
        Ok(selected)
    }

    fn update_on_block_add(&mut self, block: &Block) -> Result<(), StoreError> {
        let mut delta = BlockDelta::default();
        for tx in &block.transactions {
            for input in &tx.inputs {
                let outpoint = input.outpoint();
                let output = self.unspent.shift_remove(&outpoint).ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "spending unknown output {}:{}",
                        hex::encode(outpoint.tx),
                        outpoint.vout
                    ))
                })?;
                delta.spent.push((outpoint, output));
            }
            let tx_id = tx.id();
            for (vout, output) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint {
                    tx: tx_id,
                    vout: vout as u32,
                };
                self.unspent.insert(outpoint, output.clone());
                delta.created.push(outpoint);
            }
        }
        self.journal.insert(block.hash(), delta);
        Ok(())
    }

    fn update_on_block_cancel(&mut self, block: &Block) -> Result<(), StoreError> {
        let delta = self
            .journal
            .remove(&block.hash())
            .ok_or_else(|| StoreError::Corrupt("canceling a block with no delta".into()))?;
        for outpoint in &delta.created {
            self.unspent.shift_remove(outpoint);
        }
        for (outpoint, output) in delta.spent {
            self.unspent.insert(outpoint, output);
        }
        Ok(())
    }

    fn reindex(&mut self, blocks: &[Block]) -> Result<(), StoreError> {
        *self = Self::default();
        for block in blocks {
            self.update_on_block_add(block)?;
        }
        Ok(())
    }

    fn count_unspent(&self) -> Result<usize, StoreError> {
        Ok(self.unspent.len())
    }

    fn for_each_unspent(
        &self,
        visit: &mut dyn FnMut(&UnspentOutput) -> ControlFlow<()>,
    ) -> Result<(), StoreError> {
        for (outpoint, output) in &self.unspent {
            let unspent = UnspentOutput {
                outpoint: *outpoint,
                output: output.clone(),
            };
            if let ControlFlow::Break(()) = visit(&unspent) {
                break;
            }
        }
        Ok(())
    }
}

//---------------------------------------------------------------------------------------------------- MemoryPool
/// The unapproved pool over an insertion-ordered map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryPool {
    txs: IndexMap<TxId, Transaction>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UnapprovedPool for MemoryPool {
    fn add(&mut self, tx: Transaction) -> Result<(), StoreError> {
        self.txs.entry(tx.id()).or_insert(tx);
        Ok(())
    }

    fn delete(&mut self, tx_id: &TxId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.txs.shift_remove(tx_id))
    }

    fn get_if_exists(&self, tx_id: &TxId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.txs.get(tx_id).cloned())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.txs.len())
    }

    fn transactions(&self, limit: usize) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.txs.values().take(limit).cloned().collect())
    }

    fn for_each(
        &self,
        visit: &mut dyn FnMut(&TxId, &Transaction) -> ControlFlow<()>,
    ) -> Result<(), StoreError> {
        for (tx_id, tx) in &self.txs {
            if let ControlFlow::Break(()) = visit(tx_id, tx) {
                break;
            }
        }
        Ok(())
    }

    fn clean(&mut self) -> Result<(), StoreError> {
        // No cache beside the map itself.
        Ok(())
    }
}

//---------------------------------------------------------------------------------------------------- MemoryBlockIndex
/// The block index over plain maps, branch-aware via ancestry walks.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlockIndex {
    blocks: HashMap<BlockHash, Block>,
    tx_blocks: HashMap<TxId, Vec<BlockHash>>,
}

impl MemoryBlockIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockIndex for MemoryBlockIndex {
    fn transaction_blocks(&self, tx_id: &TxId) -> Result<Vec<BlockHash>, StoreError> {
        Ok(self.tx_blocks.get(tx_id).cloned().unwrap_or_default())
    }

    fn choose_hash_under_tip(
        &self,
        hashes: &[BlockHash],
        tip: &BlockHash,
    ) -> Result<Option<BlockHash>, StoreError> {
        let mut cursor = *tip;
        loop {
            if hashes.contains(&cursor) {
                return Ok(Some(cursor));
            }
            match self.blocks.get(&cursor) {
                Some(block) if block.height > 0 => cursor = block.prev,
                _ => return Ok(None),
            }
        }
    }

    fn transaction_from_block(
        &self,
        tx_id: &TxId,
        block: &BlockHash,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .blocks
            .get(block)
            .and_then(|b| b.transactions.iter().find(|tx| tx.id() == *tx_id))
            .cloned())
    }

    fn spent_outputs(&self, tx_id: &TxId, tip: &BlockHash) -> Result<BTreeSet<u32>, StoreError> {
        let mut spent = BTreeSet::new();
        let mut cursor = *tip;
        while let Some(block) = self.blocks.get(&cursor) {
            for input in block
                .transactions
                .iter()
                .flat_map(|tx| tx.inputs.iter())
                .filter(|input| input.prev_tx == *tx_id)
            {
                spent.insert(input.vout);
            }
            if block.height == 0 {
                break;
            }
            cursor = block.prev;
        }
        Ok(spent)
    }

    fn block_added(&mut self, block: &Block) -> Result<(), StoreError> {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return Ok(());
        }
        for tx in &block.transactions {
            self.tx_blocks.entry(tx.id()).or_default().push(hash);
        }
        self.blocks.insert(hash, block.clone());
        Ok(())
    }

    fn block_removed(&mut self, block: &Block) -> Result<(), StoreError> {
        let hash = block.hash();
        if self.blocks.remove(&hash).is_none() {
            return Ok(());
        }
        for tx in &block.transactions {
            let tx_id = tx.id();
            if let Some(hashes) = self.tx_blocks.get_mut(&tx_id) {
                hashes.retain(|h| h != &hash);
                if hashes.is_empty() {
                    self.tx_blocks.remove(&tx_id);
                }
            }
        }
        Ok(())
    }
}

//---------------------------------------------------------------------------------------------------- MemoryRowIndex
/// The chain-side row-to-transaction index over a map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryRowIndex {
    heads: HashMap<RefId, TxId>,
}

impl MemoryRowIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowIndex for MemoryRowIndex {
    fn get(&self, ref_id: &RefId) -> Result<Option<TxId>, StoreError> {
        Ok(self.heads.get(ref_id).copied())
    }

    fn set(&mut self, ref_id: &RefId, tx_id: TxId) -> Result<(), StoreError> {
        self.heads.insert(ref_id.clone(), tx_id);
        Ok(())
    }

    fn remove(&mut self, ref_id: &RefId) -> Result<(), StoreError> {
        self.heads.remove(ref_id);
        Ok(())
    }
}
