//! Error types of the transaction core.
//!
//! Layered the way the components fail: the SQL engine and the stores have
//! their own opaque error types, the query processor and the verifier add
//! their rule failures on top, and [`CoreError`] is what the orchestrator
//! surfaces to callers. [`CoreError::PubKeyRequired`] and
//! [`CoreError::SignatureRequired`] are not failures but control signals of
//! the signed-submission protocol (see [`crate::signal`]).

use sqlchain_types::{RefId, TxId};

use crate::sql::ParseError;

/// An opaque SQL-engine failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("unknown table: {0}")]
    TableMissing(String),
    #[error("the engine rejected the statement: {0}")]
    Rejected(String),
    #[error("engine failure: {0}")]
    Other(String),
}

/// A store failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store failure: {0}")]
    Backend(String),
    #[error("store is corrupt: {0}")]
    Corrupt(String),
}

/// A query-processor failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("syntax check failed: {0}")]
    Syntax(EngineError),
    #[error("table {0} has no primary key")]
    NoPrimaryKey(String),
    #[error("the WHERE condition of {table} is not on its primary key ({column})")]
    NoPrimaryKeyInCondition { table: String, column: String },
    #[error("updating the primary key column is forbidden")]
    PrimaryKeyMutationForbidden,
    #[error("table {0} has no auto-increment primary key to predict")]
    NoAutoIncrement(String),
    #[error("no row of {table} has {key} as its primary key")]
    RowNotFound { table: String, key: String },
    #[error("the statement cannot be rolled back")]
    NotInvertible,
    #[error("the statement is not a mutation")]
    NotMutation,
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// A transaction-verification failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("output {vout} of {} is already spent", hex::encode(.prev_tx))]
    InputAlreadySpent { prev_tx: TxId, vout: u32 },
    #[error("output {vout} of {} was not found unspent", hex::encode(.prev_tx))]
    InputNotFound { prev_tx: TxId, vout: u32 },
    #[error("a signature does not verify over the transaction's sign data")]
    BadSignature,
    #[error("an input pubkey does not hash to the referenced output's address")]
    PubkeyMismatch,
    #[error("a previous output needed for the sign data is missing")]
    MissingSignData,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The transaction manager's error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("query processing failed: {0}")]
    Process(#[from] ProcessError),
    #[error("transaction verification failed: {0}")]
    VerificationFailed(#[from] VerifyError),
    #[error("insufficient funds: {required} required, {available} available")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("no base transaction found for {0}")]
    BaseTransactionNotFound(RefId),
    #[error("transaction {} is not in the pool", hex::encode(.0))]
    NotInPool(TxId),
    /// Control signal: the submission carries no public key.
    #[error("a public key is required to submit this statement")]
    PubKeyRequired,
    /// Control signal: the submission carries no signature. The payload is
    /// the exact transaction bytes to countersign and the digest to sign.
    #[error("a signature over the transaction's sign data is required")]
    SignatureRequired {
        tx_bytes: Vec<u8>,
        sign_data: [u8; 32],
    },
    #[error("resubmitted transaction bytes do not decode: {0}")]
    TxDecode(String),
    #[error("resubmitted transaction does not carry the submitted statement")]
    ResubmissionMismatch,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}
