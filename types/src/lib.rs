#![doc = include_str!("../README.md")]

//---------------------------------------------------------------------------------------------------- Public API
pub mod amount;

mod block;
mod transaction;

pub use block::{Block, BlockHash};
pub use transaction::{
    pubkey_hash, CurrencyInput, CurrencyOutput, OutPoint, RefId, SqlUpdate, Transaction, TxId,
};
