//! The unspent-output store seam.

use std::ops::ControlFlow;

use sqlchain_types::{Block, CurrencyInput, CurrencyOutput, OutPoint};

use crate::error::StoreError;

/// One unspent output together with its location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub output: CurrencyOutput,
}

/// The confirmed unspent-output set.
pub trait UtxoStore {
    /// The unspent output at `outpoint`, if any.
    fn get_unspent(&self, outpoint: &OutPoint) -> Result<Option<CurrencyOutput>, StoreError>;

    /// Sum of unspent outputs locked to `address`.
    fn address_balance(&self, address: &[u8]) -> Result<u64, StoreError>;

    /// Confirmed inputs of `address` sufficient for `amount`, excluding any
    /// outpoint in `pending_inputs` (already consumed by a pool
    /// transaction). May return less than `amount`; the caller extends from
    /// pending outputs or fails with insufficient funds.
    fn new_transaction_inputs(
        &self,
        address: &[u8],
        amount: u64,
        pending_inputs: &[OutPoint],
    ) -> Result<Vec<UnspentOutput>, StoreError>;

    /// Applies a block's delta: removes spent outputs, adds created ones.
    fn update_on_block_add(&mut self, block: &Block) -> Result<(), StoreError>;

    /// Reverts a block's delta.
    fn update_on_block_cancel(&mut self, block: &Block) -> Result<(), StoreError>;

    /// Rebuilds the set from the full chain, oldest block first.
    fn reindex(&mut self, blocks: &[Block]) -> Result<(), StoreError>;

    fn count_unspent(&self) -> Result<usize, StoreError>;

    /// Visits every unspent output; `Break` stops the iteration.
    fn for_each_unspent(
        &self,
        visit: &mut dyn FnMut(&UnspentOutput) -> ControlFlow<()>,
    ) -> Result<(), StoreError>;

    //------------------------------------------------------------------ provided
    /// The value of the output `outpoint` references, when it is confirmed
    /// unspent.
    fn input_value(&self, outpoint: &OutPoint) -> Result<Option<u64>, StoreError> {
        Ok(self.get_unspent(outpoint)?.map(|out| out.amount))
    }

    /// Indexes into `inputs` of entries *not* found unspent.
    fn outputs_not_spent(&self, inputs: &[CurrencyInput]) -> Result<Vec<usize>, StoreError> {
        let mut missing = Vec::new();
        for (i, input) in inputs.iter().enumerate() {
            if self.get_unspent(&input.outpoint())?.is_none() {
                missing.push(i);
            }
        }
        Ok(missing)
    }

    /// Extends an insufficient confirmed selection with pending outputs
    /// until `amount` is covered (or the pending set runs out).
    fn extend_new_transaction_inputs(
        &self,
        mut inputs: Vec<UnspentOutput>,
        amount: u64,
        pending_outputs: &[UnspentOutput],
    ) -> Result<Vec<UnspentOutput>, StoreError> {
        let mut total: u64 = inputs.iter().map(|i| i.output.amount).sum();
        for out in pending_outputs {
            if total >= amount {
                break;
            }
            total += out.output.amount;
            inputs.push(out.clone());
        }
        Ok(inputs)
    }
}
