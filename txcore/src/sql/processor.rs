//! The query processor: derives a statement's canonical form, primary-key
//! reference, pre-image snapshot, and rollback statement.
//!
//! Rollback statements are synthesized from the pre-image *before* the
//! canonical SQL executes. Execution is optimistic (the post-image is live
//! in the database before the transaction is mined), and the stored rollback
//! is what makes that reversible.

use std::collections::BTreeMap;

use sqlchain_types::{RefId, SqlUpdate};

use super::{parse, quote_literal, Credentials, Statement};
use crate::{
    engine::SqlEngine,
    error::{EngineError, ProcessError},
};

//---------------------------------------------------------------------------------------------------- ParsedQuery
/// A processed statement, ready for rollback synthesis and execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedQuery {
    pub statement: Statement,
    /// Canonical form after any primary-key splice.
    pub canonical: String,
    /// The table's primary-key column; `None` for non-DML.
    pub key_column: Option<String>,
    /// The primary-key value this statement touches; `None` for non-DML.
    pub key_value: Option<String>,
    /// Pre-image of the affected row, captured for UPDATE/DELETE.
    pub row_before: Option<BTreeMap<String, String>>,
    /// Credentials carried in leading comment blocks.
    pub credentials: Credentials,
}

//---------------------------------------------------------------------------------------------------- QueryProcessor
/// Wraps the engine handle for the duration of one submission.
pub struct QueryProcessor<'a, E: SqlEngine> {
    engine: &'a mut E,
}

impl<'a, E: SqlEngine> QueryProcessor<'a, E> {
    pub fn new(engine: &'a mut E) -> Self {
        Self { engine }
    }

    /// Parses and processes one statement.
    ///
    /// For DML this runs the engine's EXPLAIN probe, discovers the table's
    /// primary key, captures the pre-image row (UPDATE/DELETE), and predicts
    /// a missing INSERT key via the table's auto-increment, rewriting the
    /// statement so the predicted key is part of the canonical form that
    /// gets signed and replayed.
    pub fn parse_query(&self, sql: &str) -> Result<ParsedQuery, ProcessError> {
        let parsed = parse(sql)?;
        let mut statement = parsed.statement;
        let credentials = parsed.credentials;

        if !statement.kind().is_dml() {
            let canonical = statement.canonical();
            return Ok(ParsedQuery {
                statement,
                canonical,
                key_column: None,
                key_value: None,
                row_before: None,
                credentials,
            });
        }

        // Semantic check before any rewrite.
        self.engine
            .explain(&statement.canonical())
            .map_err(ProcessError::Syntax)?;

        let table = statement
            .table()
            .expect("DML statements always carry a table")
            .to_string();
        let key_column = self
            .engine
            .primary_key(&table)?
            .ok_or_else(|| ProcessError::NoPrimaryKey(table.clone()))?;

        // An INSERT missing its key gets the predicted auto-increment
        // spliced in; the rewrite is part of what gets signed and replayed.
        let missing_key = matches!(statement, Statement::Insert { .. })
            && statement.insert_value(&key_column).is_none();
        if missing_key {
            let predicted = self
                .engine
                .next_key_value(&table)?
                .ok_or_else(|| ProcessError::NoAutoIncrement(table.clone()))?;
            statement.splice_insert_column(&key_column, &predicted);
        }

        let mut row_before = None;
        let key_value = match &statement {
            Statement::Update {
                assignments, cond, ..
            } => {
                if cond.column != key_column {
                    return Err(ProcessError::NoPrimaryKeyInCondition {
                        table,
                        column: key_column,
                    });
                }
                if assignments.iter().any(|a| a.column == key_column) {
                    return Err(ProcessError::PrimaryKeyMutationForbidden);
                }
                row_before = Some(self.read_row(&table, &key_column, &cond.value)?);
                cond.value.clone()
            }
            Statement::Delete { cond, .. } => {
                if cond.column != key_column {
                    return Err(ProcessError::NoPrimaryKeyInCondition {
                        table,
                        column: key_column,
                    });
                }
                row_before = Some(self.read_row(&table, &key_column, &cond.value)?);
                cond.value.clone()
            }
            Statement::Insert { .. } => statement
                .insert_value(&key_column)
                .map(ToString::to_string)
                .ok_or_else(|| ProcessError::NoAutoIncrement(table.clone()))?,
            _ => unreachable!("only DML reaches this point"),
        };

        let canonical = statement.canonical();
        Ok(ParsedQuery {
            statement,
            canonical,
            key_column: Some(key_column),
            key_value: Some(key_value),
            row_before,
            credentials,
        })
    }

    /// Synthesizes the [`SqlUpdate`] record: the canonical query, its row
    /// reference, and the rollback statement that restores the pre-image.
    ///
    /// `prev_sql_tx` is left unresolved; the lineage resolver fills it when
    /// the transaction is assembled.
    pub fn make_sql_update(&self, parsed: &ParsedQuery) -> Result<SqlUpdate, ProcessError> {
        let (reference_id, rollback_query) = match &parsed.statement {
            Statement::Insert { table, .. } => {
                let (key_column, key_value) = parsed_key(parsed)?;
                (
                    RefId::row(table, key_value),
                    format!(
                        "DELETE FROM {table} WHERE {key_column}={}",
                        quote_literal(key_value)
                    ),
                )
            }
            Statement::Update {
                table,
                assignments,
                cond,
            } => {
                let row = parsed
                    .row_before
                    .as_ref()
                    .ok_or(ProcessError::NotMutation)?;
                let sets = assignments
                    .iter()
                    .map(|a| {
                        let before = row.get(&a.column).ok_or_else(|| {
                            EngineError::Other(format!("pre-image misses column {}", a.column))
                        })?;
                        Ok(format!("{}={}", a.column, quote_literal(before)))
                    })
                    .collect::<Result<Vec<_>, EngineError>>()?
                    .join(",");
                (
                    RefId::row(table, &cond.value),
                    format!(
                        "UPDATE {table} SET {sets} WHERE {}={}",
                        cond.column,
                        quote_literal(&cond.value)
                    ),
                )
            }
            Statement::Delete { table, cond } => {
                let row = parsed
                    .row_before
                    .as_ref()
                    .ok_or(ProcessError::NotMutation)?;
                let cols = row.keys().map(String::as_str).collect::<Vec<_>>().join(",");
                let vals = row
                    .values()
                    .map(|v| quote_literal(v))
                    .collect::<Vec<_>>()
                    .join(",");
                (
                    RefId::row(table, &cond.value),
                    format!("INSERT INTO {table} ({cols}) VALUES ({vals})"),
                )
            }
            Statement::CreateTable { table, .. } => {
                (RefId::table(table), format!("DROP TABLE {table}"))
            }
            // DROP TABLE is not invertible without a schema snapshot.
            Statement::DropTable { .. } => return Err(ProcessError::NotInvertible),
            _ => return Err(ProcessError::NotMutation),
        };

        Ok(SqlUpdate {
            canonical_query: parsed.canonical.clone(),
            reference_id,
            rollback_query,
            prev_sql_tx: None,
        })
    }

    /// Parses, synthesizes the rollback, then executes the canonical SQL.
    pub fn execute_query(&mut self, sql: &str) -> Result<(ParsedQuery, SqlUpdate), ProcessError> {
        let parsed = self.parse_query(sql)?;
        let update = self.make_sql_update(&parsed)?;
        self.engine.execute(&parsed.canonical)?;
        Ok((parsed, update))
    }

    fn read_row(
        &self,
        table: &str,
        key_column: &str,
        key_value: &str,
    ) -> Result<BTreeMap<String, String>, ProcessError> {
        let select = format!(
            "SELECT * FROM {table} WHERE {key_column}={}",
            quote_literal(key_value)
        );
        self.engine
            .select_row(&select)?
            .ok_or_else(|| ProcessError::RowNotFound {
                table: table.to_string(),
                key: key_value.to_string(),
            })
    }
}

fn parsed_key(parsed: &ParsedQuery) -> Result<(&str, &str), ProcessError> {
    match (&parsed.key_column, &parsed.key_value) {
        (Some(column), Some(value)) => Ok((column, value)),
        _ => Err(ProcessError::NotMutation),
    }
}
