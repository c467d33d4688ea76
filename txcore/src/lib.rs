#![doc = include_str!("../README.md")]

//---------------------------------------------------------------------------------------------------- Public API
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod lineage;
pub mod manager;
pub mod signal;
pub mod sql;
pub mod store;
pub mod verify;

pub use config::{Config, ConfigBuilder};
pub use error::{CoreError, EngineError, ProcessError, StoreError, VerifyError};
pub use manager::{AddressBalance, QueryOutcome, TransactionManager};

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current UNIX timestamp.
pub fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the UNIX epoch")
        .as_secs()
}
