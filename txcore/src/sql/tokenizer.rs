//! Tokenizer for the restricted SQL dialect.

use super::ParseError;

//---------------------------------------------------------------------------------------------------- Token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A bare or backtick-quoted identifier.
    Ident(String),
    /// A quoted string literal, unescaped.
    Str(String),
    /// A numeric literal, kept as written.
    Num(String),
    LParen,
    RParen,
    Comma,
    Eq,
    Star,
    Semicolon,
}

impl Token {
    /// Short description for error messages.
    pub(super) fn describe(&self) -> String {
        match self {
            Self::Ident(s) => format!("identifier {s:?}"),
            Self::Str(s) => format!("string {s:?}"),
            Self::Num(s) => format!("number {s}"),
            Self::LParen => "`(`".into(),
            Self::RParen => "`)`".into(),
            Self::Comma => "`,`".into(),
            Self::Eq => "`=`".into(),
            Self::Star => "`*`".into(),
            Self::Semicolon => "`;`".into(),
        }
    }
}

//---------------------------------------------------------------------------------------------------- tokenize
/// Tokenizes `sql`, skipping whitespace and comments.
pub fn tokenize(sql: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some(&(idx, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '-' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '-')) => {
                        // `--` line comment.
                        for (_, c) in chars.by_ref() {
                            if c == '\n' {
                                break;
                            }
                        }
                    }
                    _ => return Err(ParseError::UnexpectedChar('-', idx)),
                }
            }
            '/' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '*')) => {
                        chars.next();
                        skip_block_comment(&mut chars)?;
                    }
                    _ => return Err(ParseError::UnexpectedChar('/', idx)),
                }
            }
            '\'' | '"' => {
                chars.next();
                tokens.push(Token::Str(read_string(&mut chars, ch)?));
            }
            '`' => {
                chars.next();
                tokens.push(Token::Ident(read_quoted_ident(&mut chars)?));
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            ';' => {
                chars.next();
                tokens.push(Token::Semicolon);
            }
            c if c.is_ascii_digit() => {
                tokens.push(Token::Num(read_number(&mut chars)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                tokens.push(Token::Ident(read_ident(&mut chars)));
            }
            c => return Err(ParseError::UnexpectedChar(c, idx)),
        }
    }

    Ok(tokens)
}

//---------------------------------------------------------------------------------------------------- Readers
type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn skip_block_comment(chars: &mut Chars<'_>) -> Result<(), ParseError> {
    let mut star = false;
    for (_, c) in chars.by_ref() {
        if star && c == '/' {
            return Ok(());
        }
        star = c == '*';
    }
    Err(ParseError::UnterminatedComment)
}

fn read_string(chars: &mut Chars<'_>, quote: char) -> Result<String, ParseError> {
    let mut value = String::new();
    let mut escaped = false;
    for (_, c) in chars.by_ref() {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok(value);
        } else {
            value.push(c);
        }
    }
    Err(ParseError::UnterminatedString)
}

fn read_quoted_ident(chars: &mut Chars<'_>) -> Result<String, ParseError> {
    let mut value = String::new();
    for (_, c) in chars.by_ref() {
        if c == '`' {
            if value.is_empty() || !is_valid_ident(&value) {
                return Err(ParseError::InvalidIdentifier(value));
            }
            return Ok(value);
        }
        value.push(c);
    }
    Err(ParseError::UnterminatedString)
}

fn read_number(chars: &mut Chars<'_>) -> String {
    let mut value = String::new();
    let mut dot = false;
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_digit() {
            value.push(c);
            chars.next();
        } else if c == '.' && !dot {
            dot = true;
            value.push(c);
            chars.next();
        } else {
            break;
        }
    }
    value
}

fn read_ident(chars: &mut Chars<'_>) -> String {
    let mut value = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            value.push(c);
            chars.next();
        } else {
            break;
        }
    }
    value
}

/// Identifiers the canonical form can emit bare.
pub(super) fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
