//! The restricted SQL dialect: tokenizer, parser/canonicalizer, and the
//! query processor.
//!
//! The canonical textual form produced here is the chain-persisted form of
//! every statement; two nodes must agree on it byte-for-byte for the same
//! input, so canonicalization is fully deterministic: uppercase keywords,
//! bare identifiers, every literal rendered as a single-quoted escaped
//! string, comma-joined lists.

mod parser;
mod processor;
mod tokenizer;

pub use parser::{
    parse, Assignment, ColumnDef, Condition, Credentials, ParsedStatement, Statement,
    StatementKind,
};
pub use processor::{ParsedQuery, QueryProcessor};
pub use tokenizer::{tokenize, Token};

pub(crate) use parser::quote_literal;

/// A tokenizer or parser failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected character {0:?} at byte {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated comment")]
    UnterminatedComment,
    #[error("unexpected end of statement")]
    UnexpectedEnd,
    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("UPDATE and DELETE require a WHERE clause")]
    MissingWhere,
    #[error("WHERE must be a single `column = literal` condition")]
    UnsupportedWhere,
    #[error("INSERT column and value counts differ")]
    ColumnValueMismatch,
    #[error("duplicate column {0:?}")]
    DuplicateColumn(String),
    #[error("malformed {0} credential comment")]
    BadCredential(String),
}
