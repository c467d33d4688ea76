//! SQL-lineage resolution: locating the base transaction of a mutation.
//!
//! The base transaction is the most recent transaction that mutated the same
//! [`RefId`]; the pool overlay is consulted before the chain-side row index,
//! and within the pool the latest arrival wins.

use sqlchain_types::{RefId, TxId};

use crate::{
    error::CoreError,
    sql::StatementKind,
    store::{RowIndex, UnapprovedPool},
};

/// Resolves the `prev_sql_tx` link for a mutation of `ref_id`.
///
/// Lookup order: unapproved pool (latest arrival wins), then the chain-side
/// row index. An INSERT immediately after CREATE TABLE may fall back to the
/// table-level [`RefId`] as its base. A missing base is
/// [`CoreError::BaseTransactionNotFound`] for UPDATE/DELETE, `Ok(None)` for
/// statements that create the row (or the table) they reference.
pub fn resolve_base_transaction<P, R>(
    pool: &P,
    rows: &R,
    kind: StatementKind,
    ref_id: &RefId,
) -> Result<Option<TxId>, CoreError>
where
    P: UnapprovedPool + ?Sized,
    R: RowIndex + ?Sized,
{
    if let Some(base) = lookup(pool, rows, ref_id)? {
        return Ok(Some(base));
    }

    match kind {
        // A row insert may chain onto the creation of its table.
        StatementKind::Insert => lookup(pool, rows, &ref_id.table_level()),
        StatementKind::Update | StatementKind::Delete => {
            Err(CoreError::BaseTransactionNotFound(ref_id.clone()))
        }
        _ => Ok(None),
    }
}

fn lookup<P, R>(pool: &P, rows: &R, ref_id: &RefId) -> Result<Option<TxId>, CoreError>
where
    P: UnapprovedPool + ?Sized,
    R: RowIndex + ?Sized,
{
    if let Some(tx_id) = pool.find_sql_reference_transaction(ref_id)? {
        return Ok(Some(tx_id));
    }
    Ok(rows.get(ref_id)?)
}
