#![doc = include_str!("../README.md")]

//---------------------------------------------------------------------------------------------------- Public API
mod chain;
mod engine;
mod signer;
mod stores;

pub use chain::{
    build_block, genesis_block, memory_manager, submit_signed, MemoryManager, GENESIS_PREV,
};
pub use engine::MockSqlEngine;
pub use signer::{keypair, sign, MockSigner};
pub use stores::{MemoryBlockIndex, MemoryPool, MemoryRowIndex, MemoryUtxoStore};
