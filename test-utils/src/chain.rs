//! Block and manager construction helpers.

use sqlchain_txcore::{
    builder::new_coinbase_transaction, CoreError, Config, QueryOutcome, TransactionManager,
};
use sqlchain_types::{Block, BlockHash, Transaction, TxId};

use crate::{
    engine::MockSqlEngine,
    signer::{sign, MockSigner},
    stores::{MemoryBlockIndex, MemoryPool, MemoryRowIndex, MemoryUtxoStore},
};

/// Previous-hash of a genesis block.
pub const GENESIS_PREV: BlockHash = [0; 32];

/// A manager over all in-memory backends.
pub type MemoryManager = TransactionManager<
    MockSqlEngine,
    MemoryUtxoStore,
    MemoryPool,
    MemoryBlockIndex,
    MemoryRowIndex,
    MockSigner,
>;

/// A fresh manager over empty in-memory backends.
pub fn memory_manager() -> MemoryManager {
    TransactionManager::new(
        MockSqlEngine::new(),
        MemoryUtxoStore::new(),
        MemoryPool::new(),
        MemoryBlockIndex::new(),
        MemoryRowIndex::new(),
        MockSigner,
        Config::new(),
    )
}

/// A block at `height` on top of `prev`, with a deterministic timestamp.
pub fn build_block(prev: BlockHash, height: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        height,
        prev,
        time: 1_000 + height,
        transactions,
    }
}

/// A genesis block whose coinbase pays `reward` to `to`.
pub fn genesis_block(to: &[u8], reward: u64) -> Block {
    build_block(GENESIS_PREV, 0, vec![new_coinbase_transaction(to, reward, 0)])
}

/// Drives the full signed-submission flow for a mutation: submit with the
/// pubkey credential, sign the returned digest, resubmit with signature and
/// transaction bytes.
///
/// # Panics
///
/// Panics if the first round does not ask for a signature or the second
/// round does not execute; tests want that loudly.
pub fn submit_signed(
    manager: &mut MemoryManager,
    pubkey: &[u8],
    sql: &str,
) -> Result<TxId, CoreError> {
    let first = format!("/*PUBKEY:{}*/ {sql}", hex::encode(pubkey));
    let (tx_bytes, sign_data) = match manager.execute_query(&first) {
        Err(CoreError::SignatureRequired {
            tx_bytes,
            sign_data,
        }) => (tx_bytes, sign_data),
        Err(other) => return Err(other),
        Ok(outcome) => panic!("expected a signature request, got {outcome:?}"),
    };

    let signature = sign(pubkey, &sign_data);
    let second = format!(
        "/*PUBKEY:{}*/ /*SIGNATURE:{}*/ /*TXDATA:{}*/ {sql}",
        hex::encode(pubkey),
        hex::encode(&signature),
        hex::encode(&tx_bytes),
    );
    match manager.execute_query(&second)? {
        QueryOutcome::Executed(tx_id) => Ok(tx_id),
        QueryOutcome::ReadOnly => panic!("mutation resubmission came back read-only"),
    }
}
