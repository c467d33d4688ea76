//! The store seams the core drives: the unspent-output set, the unapproved
//! pool, the block index, and the row-to-transaction index.
//!
//! Each trait exposes the primitives a backend must persist; the semantics
//! the core relies on (pool-chain input resolution, lineage lookup,
//! conflict detection, per-row head maintenance) are provided methods built
//! on those primitives, so every backend inherits identical behavior.
//!
//! Iteration uses a visitor contract that may abort early via
//! [`std::ops::ControlFlow`]; treat it as a lazy finite sequence.

mod blocks;
mod pool;
mod rows;
mod utxo;

pub use blocks::BlockIndex;
pub use pool::{detect_conflicts, UnapprovedPool};
pub use rows::RowIndex;
pub use utxo::{UnspentOutput, UtxoStore};
