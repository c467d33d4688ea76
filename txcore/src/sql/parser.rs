//! Parser and canonicalizer for the restricted SQL dialect.

use super::{
    tokenizer::{tokenize, Token},
    ParseError,
};

//---------------------------------------------------------------------------------------------------- StatementKind
/// Statement classification.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
    CreateTable,
    DropTable,
    Select,
    Other,
}

impl StatementKind {
    /// Whether the statement mutates database state (and is therefore
    /// recorded on chain).
    pub const fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Update | Self::Delete | Self::CreateTable | Self::DropTable
        )
    }

    /// Row-level DML: INSERT, UPDATE, DELETE.
    pub const fn is_dml(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

//---------------------------------------------------------------------------------------------------- Statement parts
/// A single `column = literal` condition, the only WHERE shape the core
/// accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub value: String,
}

/// A `SET column = literal` assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub column: String,
    pub value: String,
}

/// A column definition inside CREATE TABLE.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// Canonicalized definition tail, e.g. `INT PRIMARY KEY AUTO_INCREMENT`.
    pub def: String,
    pub primary_key: bool,
    pub auto_increment: bool,
}

//---------------------------------------------------------------------------------------------------- Statement
/// A parsed statement.
///
/// Literal values are stored unquoted; [`Statement::canonical`] renders every
/// literal back as a single-quoted escaped string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Insert {
        table: String,
        /// `(column, value)` pairs in written order.
        columns: Vec<(String, String)>,
    },
    Update {
        table: String,
        assignments: Vec<Assignment>,
        cond: Condition,
    },
    Delete {
        table: String,
        cond: Condition,
    },
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
    },
    DropTable {
        table: String,
    },
    /// `SELECT * FROM t [WHERE col = lit]`, the shape the core itself issues
    /// for pre-image reads.
    SelectRow {
        table: String,
        cond: Option<Condition>,
    },
    /// Any other SELECT, classified but not structured.
    Select {
        text: String,
    },
    /// Anything else, classified but not structured.
    Other {
        text: String,
    },
}

impl Statement {
    pub const fn kind(&self) -> StatementKind {
        match self {
            Self::Insert { .. } => StatementKind::Insert,
            Self::Update { .. } => StatementKind::Update,
            Self::Delete { .. } => StatementKind::Delete,
            Self::CreateTable { .. } => StatementKind::CreateTable,
            Self::DropTable { .. } => StatementKind::DropTable,
            Self::SelectRow { .. } | Self::Select { .. } => StatementKind::Select,
            Self::Other { .. } => StatementKind::Other,
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Insert { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. }
            | Self::CreateTable { table, .. }
            | Self::DropTable { table }
            | Self::SelectRow { table, .. } => Some(table),
            Self::Select { .. } | Self::Other { .. } => None,
        }
    }

    pub const fn where_condition(&self) -> Option<&Condition> {
        match self {
            Self::Update { cond, .. } | Self::Delete { cond, .. } => Some(cond),
            Self::SelectRow { cond, .. } => cond.as_ref(),
            _ => None,
        }
    }

    /// The value an INSERT assigns to `column`, if present.
    pub fn insert_value(&self, column: &str) -> Option<&str> {
        match self {
            Self::Insert { columns, .. } => columns
                .iter()
                .find(|(c, _)| c == column)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Prepends a predicted primary-key column to an INSERT.
    ///
    /// The splice lands at position 0 so the canonical form lists the key
    /// first; it is a no-op on any other statement kind.
    pub fn splice_insert_column(&mut self, column: &str, value: &str) {
        if let Self::Insert { columns, .. } = self {
            columns.insert(0, (column.to_string(), value.to_string()));
        }
    }

    /// The deterministic textual form: the chain-persisted representation.
    pub fn canonical(&self) -> String {
        match self {
            Self::Insert { table, columns } => {
                let cols = columns
                    .iter()
                    .map(|(c, _)| c.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                let vals = columns
                    .iter()
                    .map(|(_, v)| quote_literal(v))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("INSERT INTO {table} ({cols}) VALUES ({vals})")
            }
            Self::Update {
                table,
                assignments,
                cond,
            } => {
                let sets = assignments
                    .iter()
                    .map(|a| format!("{}={}", a.column, quote_literal(&a.value)))
                    .collect::<Vec<_>>()
                    .join(",");
                format!(
                    "UPDATE {table} SET {sets} WHERE {}",
                    render_condition(cond)
                )
            }
            Self::Delete { table, cond } => {
                format!("DELETE FROM {table} WHERE {}", render_condition(cond))
            }
            Self::CreateTable { table, columns } => {
                let defs = columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.def))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("CREATE TABLE {table} ({defs})")
            }
            Self::DropTable { table } => format!("DROP TABLE {table}"),
            Self::SelectRow { table, cond } => match cond {
                Some(cond) => format!("SELECT * FROM {table} WHERE {}", render_condition(cond)),
                None => format!("SELECT * FROM {table}"),
            },
            Self::Select { text } | Self::Other { text } => text.clone(),
        }
    }
}

fn render_condition(cond: &Condition) -> String {
    format!("{}={}", cond.column, quote_literal(&cond.value))
}

/// Renders a literal as a single-quoted string, escaping `'` and `\`.
pub(crate) fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

//---------------------------------------------------------------------------------------------------- Credentials
/// Credentials embedded in leading comment blocks:
/// `/*PUBKEY:<hex>*/`, `/*SIGNATURE:<hex>*/`, `/*TXDATA:<hex>*/`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub pubkey: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
    pub tx_bytes: Option<Vec<u8>>,
}

/// A parse result: the statement plus any credentials found in front of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedStatement {
    pub statement: Statement,
    pub credentials: Credentials,
}

//---------------------------------------------------------------------------------------------------- parse
/// Parses one statement, classifying it and capturing leading credential
/// comments.
pub fn parse(sql: &str) -> Result<ParsedStatement, ParseError> {
    let (credentials, rest) = strip_leading_comments(sql)?;
    let statement = parse_statement(rest)?;
    Ok(ParsedStatement {
        statement,
        credentials,
    })
}

fn parse_statement(sql: &str) -> Result<Statement, ParseError> {
    let text = sql.trim();
    match leading_keyword(text).as_str() {
        "INSERT" => Parser::run(text, Parser::insert),
        "UPDATE" => Parser::run(text, Parser::update),
        "DELETE" => Parser::run(text, Parser::delete),
        "CREATE" | "DROP" => parse_ddl(text),
        "SELECT" => parse_select(text),
        _ => Ok(Statement::Other { text: text.into() }),
    }
}

/// CREATE/DROP statements other than `… TABLE` classify as [`Statement::Other`].
fn parse_ddl(text: &str) -> Result<Statement, ParseError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser::new(tokens);
    let head = parser.expect_ident()?.to_ascii_uppercase();
    if !parser.peek_keyword("TABLE") {
        return Ok(Statement::Other { text: text.into() });
    }
    parser.expect_keyword("TABLE")?;
    if head == "CREATE" {
        parser.create_table_body()
    } else {
        parser.drop_table_body()
    }
}

/// SELECTs the core can structure (`SELECT * FROM t [WHERE col = lit]`)
/// parse into [`Statement::SelectRow`]; everything else stays classified
/// text.
fn parse_select(text: &str) -> Result<Statement, ParseError> {
    let fallback = || Statement::Select { text: text.into() };
    let Ok(tokens) = tokenize(text) else {
        return Ok(fallback());
    };
    let mut parser = Parser::new(tokens);
    match parser.select_row() {
        Ok(statement) => Ok(statement),
        Err(_) => Ok(fallback()),
    }
}

fn leading_keyword(sql: &str) -> String {
    sql.trim_start()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Strips leading `/* … */` and `--` comments, decoding any credential
/// blocks among them.
fn strip_leading_comments(sql: &str) -> Result<(Credentials, &str), ParseError> {
    let mut credentials = Credentials::default();
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("/*") {
            let Some(end) = after.find("*/") else {
                return Err(ParseError::UnterminatedComment);
            };
            let body = after[..end].trim();
            if let Some(value) = body.strip_prefix("PUBKEY:") {
                credentials.pubkey = Some(decode_credential("PUBKEY", value)?);
            } else if let Some(value) = body.strip_prefix("SIGNATURE:") {
                credentials.signature = Some(decode_credential("SIGNATURE", value)?);
            } else if let Some(value) = body.strip_prefix("TXDATA:") {
                credentials.tx_bytes = Some(decode_credential("TXDATA", value)?);
            }
            rest = after[end + 2..].trim_start();
        } else if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, r)| r).trim_start();
        } else {
            return Ok((credentials, rest));
        }
    }
}

fn decode_credential(name: &str, value: &str) -> Result<Vec<u8>, ParseError> {
    hex::decode(value.trim()).map_err(|_| ParseError::BadCredential(name.into()))
}

//---------------------------------------------------------------------------------------------------- Parser
/// Token cursor.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    const fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn run(
        text: &str,
        body: impl FnOnce(&mut Self) -> Result<Statement, ParseError>,
    ) -> Result<Statement, ParseError> {
        let mut parser = Self::new(tokenize(text)?);
        body(&mut parser)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::UnexpectedToken {
                expected: expected.into(),
                found: token.describe(),
            },
            None => ParseError::UnexpectedEnd,
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(_)) => {
                let Some(Token::Ident(name)) = self.next() else {
                    unreachable!()
                };
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn expect_token(&mut self, token: &Token, what: &str) -> Result<(), ParseError> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    /// A string or numeric literal, unquoted.
    fn literal(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Str(_) | Token::Num(_)) => {
                let Some(Token::Str(value) | Token::Num(value)) = self.next() else {
                    unreachable!()
                };
                Ok(value)
            }
            _ => Err(self.unexpected("a literal")),
        }
    }

    /// Consumes an optional trailing `;` and requires end of input.
    fn end(&mut self) -> Result<(), ParseError> {
        if self.peek() == Some(&Token::Semicolon) {
            self.pos += 1;
        }
        if self.peek().is_some() {
            return Err(self.unexpected("end of statement"));
        }
        Ok(())
    }

    //------------------------------------------------------------------ statements
    fn insert(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.expect_ident()?;

        self.expect_token(&Token::LParen, "`(`")?;
        let mut names = Vec::new();
        loop {
            let name = self.expect_ident()?;
            if names.contains(&name) {
                return Err(ParseError::DuplicateColumn(name));
            }
            names.push(name);
            match self.next() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => break,
                _ => return Err(ParseError::UnexpectedEnd),
            }
        }

        self.expect_keyword("VALUES")?;
        self.expect_token(&Token::LParen, "`(`")?;
        let mut values = Vec::new();
        loop {
            values.push(self.literal()?);
            match self.next() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => break,
                _ => return Err(ParseError::UnexpectedEnd),
            }
        }
        self.end()?;

        if names.len() != values.len() {
            return Err(ParseError::ColumnValueMismatch);
        }
        Ok(Statement::Insert {
            table,
            columns: names.into_iter().zip(values).collect(),
        })
    }

    fn update(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("UPDATE")?;
        let table = self.expect_ident()?;
        self.expect_keyword("SET")?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_ident()?;
            if assignments.iter().any(|a: &Assignment| a.column == column) {
                return Err(ParseError::DuplicateColumn(column));
            }
            self.expect_token(&Token::Eq, "`=`")?;
            let value = self.literal()?;
            assignments.push(Assignment { column, value });
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }

        let cond = self.where_clause()?;
        Ok(Statement::Update {
            table,
            assignments,
            cond,
        })
    }

    fn delete(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table = self.expect_ident()?;
        let cond = self.where_clause()?;
        Ok(Statement::Delete { table, cond })
    }

    /// The mandatory restricted WHERE clause: exactly `column = literal`.
    fn where_clause(&mut self) -> Result<Condition, ParseError> {
        if !self.peek_keyword("WHERE") {
            return Err(ParseError::MissingWhere);
        }
        self.pos += 1;
        let column = self.expect_ident()?;
        self.expect_token(&Token::Eq, "`=`")?;
        let value = self.literal()?;
        // Anything after the single condition (AND, OR, …) is out of dialect.
        self.end().map_err(|_| ParseError::UnsupportedWhere)?;
        Ok(Condition { column, value })
    }

    fn create_table_body(&mut self) -> Result<Statement, ParseError> {
        let table = self.expect_ident()?;
        self.expect_token(&Token::LParen, "`(`")?;

        let mut columns = Vec::new();
        loop {
            let name = self.expect_ident()?;
            if columns.iter().any(|c: &ColumnDef| c.name == name) {
                return Err(ParseError::DuplicateColumn(name));
            }
            let (def, done) = self.column_def_tail()?;
            let upper = def.to_ascii_uppercase();
            let primary_key = upper.contains("PRIMARY KEY");
            let auto_increment =
                upper.contains("AUTO_INCREMENT") || upper.contains("AUTOINCREMENT");
            columns.push(ColumnDef {
                name,
                def,
                primary_key,
                auto_increment,
            });
            if done {
                break;
            }
        }
        self.end()?;
        Ok(Statement::CreateTable { table, columns })
    }

    /// Collects one column definition's tail up to a top-level `,` or the
    /// closing `)`; returns the canonical rendering and whether the closing
    /// paren was reached.
    fn column_def_tail(&mut self) -> Result<(String, bool), ParseError> {
        let mut out = String::new();
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Some(Token::Comma) if depth == 0 => {
                    self.pos += 1;
                    return Ok((out, false));
                }
                Some(Token::RParen) if depth == 0 => {
                    self.pos += 1;
                    return Ok((out, true));
                }
                Some(Token::LParen) => {
                    depth += 1;
                    out.push('(');
                    self.pos += 1;
                }
                Some(Token::RParen) => {
                    depth -= 1;
                    out.push(')');
                    self.pos += 1;
                }
                Some(Token::Comma) => {
                    out.push(',');
                    self.pos += 1;
                }
                Some(Token::Ident(_) | Token::Num(_)) => {
                    let word = match self.next() {
                        Some(Token::Ident(w)) => w.to_ascii_uppercase(),
                        Some(Token::Num(w)) => w,
                        _ => unreachable!(),
                    };
                    if !out.is_empty() && !out.ends_with(['(', ',']) {
                        out.push(' ');
                    }
                    out.push_str(&word);
                }
                _ => return Err(self.unexpected("a column definition")),
            }
        }
    }

    fn drop_table_body(&mut self) -> Result<Statement, ParseError> {
        let table = self.expect_ident()?;
        self.end()?;
        Ok(Statement::DropTable { table })
    }

    fn select_row(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("SELECT")?;
        self.expect_token(&Token::Star, "`*`")?;
        self.expect_keyword("FROM")?;
        let table = self.expect_ident()?;
        let cond = if self.peek_keyword("WHERE") {
            Some(self.where_clause()?)
        } else {
            self.end()?;
            None
        };
        Ok(Statement::SelectRow { table, cond })
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn stmt(sql: &str) -> Statement {
        parse(sql).unwrap().statement
    }

    #[test]
    fn insert_canonical() {
        let s = stmt("insert into t (v) values ('x')");
        assert_eq!(s.kind(), StatementKind::Insert);
        assert_eq!(s.canonical(), "INSERT INTO t (v) VALUES ('x')");
    }

    #[test]
    fn insert_splice_prepends_key() {
        let mut s = stmt("INSERT INTO t (v) VALUES ('x')");
        s.splice_insert_column("id", "1");
        assert_eq!(s.canonical(), "INSERT INTO t (id,v) VALUES ('1','x')");
        assert_eq!(s.insert_value("id"), Some("1"));
    }

    #[test]
    fn insert_quotes_numeric_literals() {
        let s = stmt("INSERT INTO t (id, v) VALUES (1, 'x')");
        assert_eq!(s.canonical(), "INSERT INTO t (id,v) VALUES ('1','x')");
    }

    #[test]
    fn update_canonical() {
        let s = stmt("update t set v = 'y' where id = 1");
        assert_eq!(s.canonical(), "UPDATE t SET v='y' WHERE id='1'");
        assert_eq!(
            s.where_condition(),
            Some(&Condition {
                column: "id".into(),
                value: "1".into(),
            })
        );
    }

    #[test]
    fn delete_canonical() {
        assert_eq!(
            stmt("DELETE FROM `t` WHERE `id` = '1';").canonical(),
            "DELETE FROM t WHERE id='1'"
        );
    }

    #[test]
    fn create_table_canonical() {
        let s = stmt("create table t (id INT primary key auto_increment, v text)");
        assert_eq!(
            s.canonical(),
            "CREATE TABLE t (id INT PRIMARY KEY AUTO_INCREMENT,v TEXT)"
        );
        let Statement::CreateTable { columns, .. } = &s else {
            panic!("not a CREATE TABLE");
        };
        assert!(columns[0].primary_key && columns[0].auto_increment);
        assert!(!columns[1].primary_key);
    }

    #[test]
    fn create_table_nested_parens() {
        let s = stmt("CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(20), price DECIMAL(10,2))");
        assert_eq!(
            s.canonical(),
            "CREATE TABLE t (id INT PRIMARY KEY,name VARCHAR(20),price DECIMAL(10,2))"
        );
    }

    #[test]
    fn drop_table() {
        assert_eq!(stmt("drop table t").canonical(), "DROP TABLE t");
        assert_eq!(stmt("DROP INDEX i").kind(), StatementKind::Other);
    }

    #[test]
    fn select_row_structured() {
        let s = stmt("SELECT * FROM t WHERE id='1'");
        assert_eq!(s.kind(), StatementKind::Select);
        assert_eq!(s.canonical(), "SELECT * FROM t WHERE id='1'");
        let complex = stmt("SELECT a, b FROM t JOIN u");
        assert_eq!(complex.kind(), StatementKind::Select);
        assert_eq!(complex.canonical(), "SELECT a, b FROM t JOIN u");
    }

    #[test]
    fn canonical_is_a_fixed_point() {
        for sql in [
            "insert into t (v) values ('x')",
            "update t set v='y', w = 2 where id = 1",
            "DELETE FROM t WHERE id=1",
            "create table t (id INT primary key, v text)",
            "drop table t",
        ] {
            let canonical = stmt(sql).canonical();
            assert_eq!(stmt(&canonical).canonical(), canonical);
        }
    }

    #[test]
    fn quote_literal_escapes() {
        assert_eq!(quote_literal("x"), "'x'");
        assert_eq!(quote_literal("it's"), r"'it\'s'");
        assert_eq!(quote_literal(r"a\b"), r"'a\\b'");
        // Escaped literals round-trip through the tokenizer.
        let s = stmt(&format!("INSERT INTO t (v) VALUES ({})", quote_literal("it's")));
        assert_eq!(s.insert_value("v"), Some("it's"));
    }

    #[test]
    fn where_restrictions() {
        assert_eq!(
            parse("UPDATE t SET v='y'").unwrap_err(),
            ParseError::MissingWhere
        );
        assert_eq!(
            parse("DELETE FROM t WHERE a='1' AND b='2'").unwrap_err(),
            ParseError::UnsupportedWhere
        );
    }

    #[test]
    fn insert_mismatch_and_duplicates() {
        assert_eq!(
            parse("INSERT INTO t (a,b) VALUES ('1')").unwrap_err(),
            ParseError::ColumnValueMismatch
        );
        assert_eq!(
            parse("INSERT INTO t (a,a) VALUES ('1','2')").unwrap_err(),
            ParseError::DuplicateColumn("a".into())
        );
    }

    #[test]
    fn credentials_extracted_and_stripped() {
        let parsed = parse("/*PUBKEY:0a0b*/ /*SIGNATURE:ff*/ /*note*/ DELETE FROM t WHERE id='1'")
            .unwrap();
        assert_eq!(parsed.credentials.pubkey, Some(vec![0x0a, 0x0b]));
        assert_eq!(parsed.credentials.signature, Some(vec![0xff]));
        assert_eq!(parsed.credentials.tx_bytes, None);
        assert_eq!(parsed.statement.canonical(), "DELETE FROM t WHERE id='1'");

        assert_eq!(
            parse("/*PUBKEY:zz*/ DROP TABLE t").unwrap_err(),
            ParseError::BadCredential("PUBKEY".into())
        );
    }

    #[test]
    fn classification_of_unstructured_text() {
        assert_eq!(stmt("SHOW TABLES").kind(), StatementKind::Other);
        assert_eq!(stmt("").kind(), StatementKind::Other);
    }
}
