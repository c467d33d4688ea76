//! The SQL-engine seam.

use std::collections::BTreeMap;

use crate::error::EngineError;

/// The opaque SQL executor the core drives.
///
/// Every call is blocking and auto-committed; the core never holds the
/// engine in a mid-transaction state. Implementations wrap whatever engine
/// the node embeds.
pub trait SqlEngine {
    /// Executes a statement.
    fn execute(&mut self, sql: &str) -> Result<(), EngineError>;

    /// Checks a statement for semantic validity without executing it
    /// (an `EXPLAIN` probe).
    fn explain(&self, sql: &str) -> Result<(), EngineError>;

    /// The declared primary-key column of `table`, if any.
    fn primary_key(&self, table: &str) -> Result<Option<String>, EngineError>;

    /// Runs a single-row select, returning the row as a column→value map,
    /// or `None` when no row matches.
    fn select_row(&self, sql: &str) -> Result<Option<BTreeMap<String, String>>, EngineError>;

    /// Predicts the next auto-increment key of `table`; `None` when the
    /// table has no auto-increment primary key.
    fn next_key_value(&self, table: &str) -> Result<Option<String>, EngineError>;
}
