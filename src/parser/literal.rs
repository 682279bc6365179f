//! Lexer and parser for the object literals the dashboard embeds in its
//! `<script>` blocks, e.g.
//!
//! ```text
//! { cols: [...], rows: [ { c: [ {v: new Date(2013,0,15,9,30)}, {v: 2.1} ] }, ] }
//! ```
//!
//! Keys may be bare identifiers or quoted; strings may use either quote style;
//! trailing commas before a closing bracket are accepted. The result is a
//! `serde_json::Value` tree.

use chrono::NaiveDate;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::text::{self, EMPTY_VALUE};

#[derive(Debug, Error, PartialEq)]
pub enum LiteralError {
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("unexpected {found} at offset {pos}, expected {expected}")]
    Unexpected {
        found: String,
        expected: &'static str,
        pos: usize,
    },
    #[error("unexpected end of literal, expected {0}")]
    Eof(&'static str),
    #[error("invalid date constructor at offset {pos}: {reason}")]
    BadDate { pos: usize, reason: String },
    #[error("nesting deeper than {} levels at offset {pos}", MAX_DEPTH)]
    TooDeep { pos: usize },
}

/// Deepest `{`/`[` nesting accepted in one literal.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    /// Quoted literal, quotes removed and escapes resolved.
    Str(String),
    /// Bare identifier, number or path-like run.
    Word(String),
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::LBrace => "'{'".into(),
            Tok::RBrace => "'}'".into(),
            Tok::LBracket => "'['".into(),
            Tok::RBracket => "']'".into(),
            Tok::LParen => "'('".into(),
            Tok::RParen => "')'".into(),
            Tok::Colon => "':'".into(),
            Tok::Comma => "','".into(),
            Tok::Str(s) => format!("string \"{}\"", s),
            Tok::Word(w) => format!("word `{}`", w),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    pos: usize,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '{' | '}' | '[' | ']' | '(' | ')' | ',' | ':' | ';' | '"' | '\'')
}

fn lex(src: &str) -> Result<Vec<Token>, LiteralError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        let single = match c {
            '{' => Some(Tok::LBrace),
            '}' => Some(Tok::RBrace),
            '[' => Some(Tok::LBracket),
            ']' => Some(Tok::RBracket),
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            ':' => Some(Tok::Colon),
            ',' => Some(Tok::Comma),
            _ => None,
        };
        if let Some(tok) = single {
            chars.next();
            tokens.push(Token { tok, pos });
            continue;
        }

        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' || c == '\'' {
            chars.next();
            let mut s = String::new();
            let mut closed = false;
            while let Some((_, ch)) = chars.next() {
                match ch {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => s.push('\n'),
                        Some((_, 't')) => s.push('\t'),
                        Some((_, 'u')) => {
                            let hex: String = (0..4).filter_map(|_| chars.next().map(|(_, h)| h)).collect();
                            if let Some(decoded) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                                s.push(decoded);
                            }
                        }
                        Some((_, other)) => s.push(other),
                        None => break,
                    },
                    q if q == c => {
                        closed = true;
                        break;
                    }
                    other => s.push(other),
                }
            }
            if !closed {
                return Err(LiteralError::UnterminatedString(pos));
            }
            tokens.push(Token { tok: Tok::Str(s), pos });
            continue;
        }

        if is_word_char(c) {
            let mut w = String::new();
            while let Some(&(_, ch)) = chars.peek() {
                if !is_word_char(ch) {
                    break;
                }
                w.push(ch);
                chars.next();
            }
            tokens.push(Token { tok: Tok::Word(w), pos });
            continue;
        }

        return Err(LiteralError::UnexpectedChar { ch: c, pos });
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.idx).map(|t| &t.tok)
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, LiteralError> {
        let t = self.tokens.get(self.idx).cloned().ok_or(LiteralError::Eof(expected))?;
        self.idx += 1;
        Ok(t)
    }

    fn expect(&mut self, want: Tok, expected: &'static str) -> Result<usize, LiteralError> {
        let t = self.next(expected)?;
        if t.tok != want {
            return Err(unexpected(&t, expected));
        }
        Ok(t.pos)
    }

    /// `key` is the object key this value is bound to, if any.
    fn value(&mut self, key: Option<&str>) -> Result<Value, LiteralError> {
        let t = self.next("a value")?;
        match t.tok {
            Tok::LBrace => self.nested(t.pos, Self::object),
            Tok::LBracket => self.nested(t.pos, Self::array),
            Tok::Str(s) => Ok(Value::String(quoted_value(&s, key))),
            Tok::Word(ref w) if w == "new" && self.peek() == Some(&Tok::Word("Date".into())) => {
                self.idx += 1;
                self.date(t.pos)
            }
            Tok::Word(ref w) if w == "newDate" => self.date(t.pos),
            Tok::Word(w) => Ok(bare_value(&w)),
            _ => Err(unexpected(&t, "a value")),
        }
    }

    fn nested(
        &mut self,
        pos: usize,
        inner: fn(&mut Self) -> Result<Value, LiteralError>,
    ) -> Result<Value, LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(LiteralError::TooDeep { pos });
        }
        self.depth += 1;
        let v = inner(self);
        self.depth -= 1;
        v
    }

    fn object(&mut self) -> Result<Value, LiteralError> {
        let mut map = Map::new();
        loop {
            if self.peek() == Some(&Tok::RBrace) {
                self.idx += 1;
                break;
            }
            let t = self.next("an object key")?;
            let key = match t.tok {
                Tok::Word(w) => w,
                Tok::Str(s) => s,
                _ => return Err(unexpected(&t, "an object key")),
            };
            self.expect(Tok::Colon, "':'")?;
            let v = self.value(Some(&key))?;
            map.insert(key, v);

            let t = self.next("',' or '}'")?;
            match t.tok {
                Tok::Comma => continue,
                Tok::RBrace => break,
                _ => return Err(unexpected(&t, "',' or '}'")),
            }
        }
        Ok(Value::Object(map))
    }

    fn array(&mut self) -> Result<Value, LiteralError> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&Tok::RBracket) {
                self.idx += 1;
                break;
            }
            items.push(self.value(None)?);

            let t = self.next("',' or ']'")?;
            match t.tok {
                Tok::Comma => continue,
                Tok::RBracket => break,
                _ => return Err(unexpected(&t, "',' or ']'")),
            }
        }
        Ok(Value::Array(items))
    }

    /// `new Date(Y, M, D[, H[, Min[, S]]])` with a zero-based month, read as UTC.
    fn date(&mut self, pos: usize) -> Result<Value, LiteralError> {
        self.expect(Tok::LParen, "'('")?;
        let mut args: Vec<i64> = Vec::new();
        loop {
            let t = self.next("a date component")?;
            match t.tok {
                Tok::RParen => break,
                Tok::Comma => continue,
                Tok::Word(ref w) => {
                    let n = w.parse::<i64>().map_err(|_| LiteralError::BadDate {
                        pos,
                        reason: format!("non-integer component `{}`", w),
                    })?;
                    args.push(n);
                }
                _ => return Err(unexpected(&t, "a date component")),
            }
        }
        let ts = timestamp_from_parts(&args).map_err(|reason| LiteralError::BadDate { pos, reason })?;
        Ok(Value::Number(ts.into()))
    }
}

fn unexpected(t: &Token, expected: &'static str) -> LiteralError {
    LiteralError::Unexpected {
        found: t.tok.describe(),
        expected,
        pos: t.pos,
    }
}

fn quoted_value(raw: &str, key: Option<&str>) -> String {
    if raw.is_empty() {
        return EMPTY_VALUE.to_string();
    }
    let s = text::compact(raw);
    match key {
        Some("v") => text::strip_separators(&s),
        _ => s,
    }
}

fn bare_value(w: &str) -> Value {
    match w {
        "null" | "undefined" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    let numeric_start = w
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.');
    if numeric_start {
        if let Ok(i) = w.parse::<i64>() {
            return Value::Number(i.into());
        }
        if let Some(n) = w.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text::normalize(w))
}

/// Unix timestamp for date-constructor arguments; the month is zero-based.
pub fn timestamp_from_parts(args: &[i64]) -> Result<i64, String> {
    if !(3..=6).contains(&args.len()) {
        return Err(format!("expected 3 to 6 components, got {}", args.len()));
    }
    let part = |i: usize| args.get(i).copied().unwrap_or(0);
    let to_u32 = |v: i64| u32::try_from(v).map_err(|_| format!("component {} out of range", v));
    let year = i32::try_from(part(0)).map_err(|_| format!("year {} out of range", part(0)))?;
    let month = part(1)
        .checked_add(1)
        .ok_or_else(|| format!("month {} out of range", part(1)))
        .and_then(to_u32)?;

    NaiveDate::from_ymd_opt(year, month, to_u32(part(2))?)
        .and_then(|d| d.and_hms_opt(to_u32(part(3)).ok()?, to_u32(part(4)).ok()?, to_u32(part(5)).ok()?))
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| format!("no such date/time {:?}", args))
}

/// Decode one embedded literal into a value tree.
pub fn parse(src: &str) -> Result<Value, LiteralError> {
    let tokens = lex(src)?;
    let mut p = Parser {
        tokens,
        idx: 0,
        depth: 0,
    };
    let v = p.value(None)?;
    if let Some(t) = p.tokens.get(p.idx) {
        return Err(unexpected(t, "end of literal"));
    }
    Ok(v)
}
