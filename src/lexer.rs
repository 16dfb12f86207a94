//! Hand-written lexer for the BIQL query language.
//!
//! Produces a positioned token stream. Unquoted words double as values, so
//! the lexer classifies each word after scanning it: fully numeric words
//! become number tokens, words containing `*` or `?` become pattern-value
//! tokens, keyword matches are case-insensitive, and everything else is an
//! identifier (possibly dotted, e.g. `metadata.EchoTime`). `#` starts a
//! comment running to end of line.

use crate::error::BiqlError;

/// Reserved words, matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    Distinct,
    From,
    Where,
    Group,
    By,
    Having,
    Order,
    Asc,
    Desc,
    As,
    And,
    Or,
    Not,
    In,
    Like,
    Null,
    Format,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Keyword> {
        match word.to_ascii_uppercase().as_str() {
            "SELECT" => Some(Keyword::Select),
            "DISTINCT" => Some(Keyword::Distinct),
            "FROM" => Some(Keyword::From),
            "WHERE" => Some(Keyword::Where),
            "GROUP" => Some(Keyword::Group),
            "BY" => Some(Keyword::By),
            "HAVING" => Some(Keyword::Having),
            "ORDER" => Some(Keyword::Order),
            "ASC" => Some(Keyword::Asc),
            "DESC" => Some(Keyword::Desc),
            "AS" => Some(Keyword::As),
            "AND" => Some(Keyword::And),
            "OR" => Some(Keyword::Or),
            "NOT" => Some(Keyword::Not),
            "IN" => Some(Keyword::In),
            "LIKE" => Some(Keyword::Like),
            "NULL" => Some(Keyword::Null),
            "FORMAT" => Some(Keyword::Format),
            _ => None,
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=` and `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `~=` (full-match regex)
    Match,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare or dotted identifier, raw text preserved.
    Identifier(String),
    /// Integer or decimal literal.
    Number(f64),
    /// Single- or double-quoted string with standard escapes applied.
    Str(String),
    /// Unquoted word containing `*`/`?` wildcards.
    Pattern(String),
    /// `/.../` regex literal, delimiters stripped.
    Regex(String),
    Keyword(Keyword),
    Operator(Operator),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    /// A lone `*` (projection wildcard, `COUNT(*)`).
    Star,
    /// A lone `?` (single-character wildcard).
    Question,
    Eof,
}

/// A token with its 1-based source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Characters that may continue an unquoted word. `-` and `.` are word
/// characters because entity values carry them and the grammar has no
/// arithmetic; `*` and `?` make the word a pattern.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '*' | '?')
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '*' | '?')
}

/// Integer or decimal form only; keeps words like `inf` or `2back` out of
/// the number token.
fn looks_numeric(raw: &str) -> bool {
    let body = raw.strip_prefix('-').unwrap_or(raw);
    !body.is_empty()
        && body.chars().any(|c| c.is_ascii_digit())
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|&c| c == '.').count() <= 1
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

/// Tokenize a query. The returned stream always ends with an `Eof` token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, BiqlError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
    };
    lexer.run()
}

impl Lexer {
    fn run(&mut self) -> Result<Vec<Token>, BiqlError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                });
                return Ok(tokens);
            };

            let kind = match c {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                ',' => self.single(TokenKind::Comma),
                ':' => self.single(TokenKind::Colon),
                '"' | '\'' => self.string(c)?,
                '/' => self.regex()?,
                '=' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                    }
                    TokenKind::Operator(Operator::Eq)
                }
                '!' => {
                    self.advance();
                    self.expect_eq(line, column, "!")?;
                    TokenKind::Operator(Operator::NotEq)
                }
                '~' => {
                    self.advance();
                    self.expect_eq(line, column, "~")?;
                    TokenKind::Operator(Operator::Match)
                }
                '<' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Operator(Operator::LtEq)
                    } else {
                        TokenKind::Operator(Operator::Lt)
                    }
                }
                '>' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Operator(Operator::GtEq)
                    } else {
                        TokenKind::Operator(Operator::Gt)
                    }
                }
                c if is_word_start(c) => self.word(),
                other => {
                    return Err(self.error(
                        line,
                        column,
                        format!("unexpected character '{}'", other),
                    ));
                }
            };
            tokens.push(Token { kind, line, column });
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn expect_eq(&mut self, line: usize, column: usize, prefix: &str) -> Result<(), BiqlError> {
        if self.peek() == Some('=') {
            self.advance();
            Ok(())
        } else {
            Err(self.error(line, column, format!("expected '=' after '{}'", prefix)))
        }
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, BiqlError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(line, column, "unterminated string literal".to_string()))
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(TokenKind::Str(text));
                }
                Some('\\') => {
                    self.advance();
                    let escaped = self.peek().ok_or_else(|| {
                        self.error(line, column, "unterminated string literal".to_string())
                    })?;
                    self.advance();
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                Some(c) => {
                    self.advance();
                    text.push(c);
                }
            }
        }
    }

    fn regex(&mut self) -> Result<TokenKind, BiqlError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening slash
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(line, column, "unterminated regex literal".to_string()))
                }
                Some('/') => {
                    self.advance();
                    return Ok(TokenKind::Regex(text));
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        // Escaped delimiter collapses; other escapes pass
                        // through to the regex engine untouched.
                        Some('/') => {
                            self.advance();
                            text.push('/');
                        }
                        Some(c) => {
                            self.advance();
                            text.push('\\');
                            text.push(c);
                        }
                        None => {
                            return Err(self.error(
                                line,
                                column,
                                "unterminated regex literal".to_string(),
                            ))
                        }
                    }
                }
                Some(c) => {
                    self.advance();
                    text.push(c);
                }
            }
        }
    }

    fn word(&mut self) -> TokenKind {
        let mut raw = String::new();
        while let Some(c) = self.peek() {
            if is_word_char(c) {
                raw.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if raw == "*" {
            return TokenKind::Star;
        }
        if raw == "?" {
            return TokenKind::Question;
        }
        if raw.contains('*') || raw.contains('?') {
            return TokenKind::Pattern(raw);
        }
        if looks_numeric(&raw) {
            if let Ok(number) = raw.parse::<f64>() {
                return TokenKind::Number(number);
            }
        }
        if !raw.contains('.') {
            if let Some(keyword) = Keyword::from_word(&raw) {
                return TokenKind::Keyword(keyword);
            }
        }
        TokenKind::Identifier(raw)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn error(&self, line: usize, column: usize, message: String) -> BiqlError {
        BiqlError::Syntax {
            line,
            column,
            message,
        }
    }
}
