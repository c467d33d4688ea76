//! An in-memory SQL engine speaking the core's restricted dialect.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use sqlchain_txcore::{
    engine::SqlEngine,
    sql::{parse, Statement},
    EngineError,
};

/// A tiny table store. Rows are keyed by their primary-key value; equality
/// of two engines is equality of their full table state, which lets tests
/// assert rollback round-trips exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MockSqlEngine {
    tables: IndexMap<String, MockTable>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct MockTable {
    columns: Vec<String>,
    primary_key: Option<String>,
    auto_increment: bool,
    rows: BTreeMap<String, BTreeMap<String, String>>,
}

impl MockSqlEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A row by table and primary-key value, for test assertions.
    pub fn row(&self, table: &str, key: &str) -> Option<&BTreeMap<String, String>> {
        self.tables.get(table)?.rows.get(key)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }

    fn parse(sql: &str) -> Result<Statement, EngineError> {
        parse(sql)
            .map(|parsed| parsed.statement)
            .map_err(|e| EngineError::Rejected(e.to_string()))
    }

    fn table(&self, name: &str) -> Result<&MockTable, EngineError> {
        self.tables
            .get(name)
            .ok_or_else(|| EngineError::TableMissing(name.to_string()))
    }

    fn check_columns<'a>(
        table: &MockTable,
        mut columns: impl Iterator<Item = &'a str>,
    ) -> Result<(), EngineError> {
        match columns.find(|c| !table.columns.iter().any(|tc| tc == c)) {
            Some(unknown) => Err(EngineError::Rejected(format!("unknown column {unknown}"))),
            None => Ok(()),
        }
    }
}

impl SqlEngine for MockSqlEngine {
    fn execute(&mut self, sql: &str) -> Result<(), EngineError> {
        match Self::parse(sql)? {
            Statement::CreateTable { table, columns } => {
                if self.tables.contains_key(&table) {
                    return Err(EngineError::Rejected(format!(
                        "table {table} already exists"
                    )));
                }
                let primary_key = columns.iter().find(|c| c.primary_key).map(|c| c.name.clone());
                let auto_increment = columns.iter().any(|c| c.primary_key && c.auto_increment);
                self.tables.insert(
                    table,
                    MockTable {
                        columns: columns.into_iter().map(|c| c.name).collect(),
                        primary_key,
                        auto_increment,
                        rows: BTreeMap::new(),
                    },
                );
            }
            Statement::DropTable { table } => {
                if self.tables.shift_remove(&table).is_none() {
                    return Err(EngineError::TableMissing(table));
                }
            }
            Statement::Insert { table, columns } => {
                let t = self
                    .tables
                    .get_mut(&table)
                    .ok_or(EngineError::TableMissing(table))?;
                Self::check_columns(t, columns.iter().map(|(c, _)| c.as_str()))?;
                let primary_key = t
                    .primary_key
                    .clone()
                    .ok_or_else(|| EngineError::Rejected("table has no primary key".into()))?;
                let key = columns
                    .iter()
                    .find(|(c, _)| *c == primary_key)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| EngineError::Rejected("insert misses the primary key".into()))?;
                if t.rows.contains_key(&key) {
                    return Err(EngineError::Rejected(format!("duplicate key {key}")));
                }
                let mut row: BTreeMap<String, String> = t
                    .columns
                    .iter()
                    .map(|c| (c.clone(), String::new()))
                    .collect();
                for (column, value) in columns {
                    row.insert(column, value);
                }
                t.rows.insert(key, row);
            }
            Statement::Update {
                table,
                assignments,
                cond,
            } => {
                let t = self
                    .tables
                    .get_mut(&table)
                    .ok_or(EngineError::TableMissing(table))?;
                Self::check_columns(
                    t,
                    assignments
                        .iter()
                        .map(|a| a.column.as_str())
                        .chain([cond.column.as_str()]),
                )?;
                let keys: Vec<String> = t
                    .rows
                    .iter()
                    .filter(|(_, row)| row.get(&cond.column) == Some(&cond.value))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in keys {
                    let mut row = t.rows.remove(&key).expect("key was just listed");
                    for a in &assignments {
                        row.insert(a.column.clone(), a.value.clone());
                    }
                    // The primary key may itself have been reassigned.
                    let new_key = t
                        .primary_key
                        .as_ref()
                        .and_then(|pk| row.get(pk).cloned())
                        .unwrap_or(key);
                    t.rows.insert(new_key, row);
                }
            }
            Statement::Delete { table, cond } => {
                let t = self
                    .tables
                    .get_mut(&table)
                    .ok_or(EngineError::TableMissing(table))?;
                Self::check_columns(t, [cond.column.as_str()].into_iter())?;
                t.rows
                    .retain(|_, row| row.get(&cond.column) != Some(&cond.value));
            }
            // Reads are no-ops through the execute path.
            Statement::SelectRow { .. } | Statement::Select { .. } | Statement::Other { .. } => {}
        }
        Ok(())
    }

    fn explain(&self, sql: &str) -> Result<(), EngineError> {
        match Self::parse(sql)? {
            Statement::Insert { table, columns } => {
                let t = self.table(&table)?;
                Self::check_columns(t, columns.iter().map(|(c, _)| c.as_str()))
            }
            Statement::Update {
                table,
                assignments,
                cond,
            } => {
                let t = self.table(&table)?;
                Self::check_columns(
                    t,
                    assignments
                        .iter()
                        .map(|a| a.column.as_str())
                        .chain([cond.column.as_str()]),
                )
            }
            Statement::Delete { table, cond } => {
                let t = self.table(&table)?;
                Self::check_columns(t, [cond.column.as_str()].into_iter())
            }
            Statement::DropTable { table } | Statement::SelectRow { table, .. } => {
                self.table(&table).map(|_| ())
            }
            Statement::CreateTable { .. } | Statement::Select { .. } | Statement::Other { .. } => {
                Ok(())
            }
        }
    }

    fn primary_key(&self, table: &str) -> Result<Option<String>, EngineError> {
        Ok(self.table(table)?.primary_key.clone())
    }

    fn select_row(&self, sql: &str) -> Result<Option<BTreeMap<String, String>>, EngineError> {
        let Statement::SelectRow { table, cond } = Self::parse(sql)? else {
            return Err(EngineError::Rejected("unsupported select shape".into()));
        };
        let t = self.table(&table)?;
        Ok(match cond {
            Some(cond) => t
                .rows
                .values()
                .find(|row| row.get(&cond.column) == Some(&cond.value))
                .cloned(),
            None => t.rows.values().next().cloned(),
        })
    }

    fn next_key_value(&self, table: &str) -> Result<Option<String>, EngineError> {
        let t = self.table(table)?;
        if !t.auto_increment {
            return Ok(None);
        }
        let max = t
            .rows
            .keys()
            .filter_map(|k| k.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Ok(Some((max + 1).to_string()))
    }
}
