//! Byte-level PDF tokenizer.
//!
//! Splits a byte slice into tokens, skipping whitespace and `%` comments.
//! Every token carries the byte offset it started at. Running out of input
//! inside a token is reported as `StreamEndedUnexpectedly`.

use crate::error::{PdfError, Result};

/// Keywords recognized by the object grammar. Anything else is kept as
/// `Other` so the parser can report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    True,
    False,
    Null,
    Obj,
    EndObj,
    Stream,
    EndStream,
    R,
    Xref,
    Trailer,
    StartXref,
    Other(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"true" => Self::True,
            b"false" => Self::False,
            b"null" => Self::Null,
            b"obj" => Self::Obj,
            b"endobj" => Self::EndObj,
            b"stream" => Self::Stream,
            b"endstream" => Self::EndStream,
            b"R" => Self::R,
            b"xref" => Self::Xref,
            b"trailer" => Self::Trailer,
            b"startxref" => Self::StartXref,
            other => Self::Other(other.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::True => b"true",
            Self::False => b"false",
            Self::Null => b"null",
            Self::Obj => b"obj",
            Self::EndObj => b"endobj",
            Self::Stream => b"stream",
            Self::EndStream => b"endstream",
            Self::R => b"R",
            Self::Xref => b"xref",
            Self::Trailer => b"trailer",
            Self::StartXref => b"startxref",
            Self::Other(bytes) => bytes,
        }
    }
}

/// Lexical tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Real(f64),
    /// Name with `#xx` escapes decoded, without the leading `/`.
    Name(String),
    /// `( ... )` with escapes processed.
    LiteralString(Vec<u8>),
    /// `< ... >` decoded to bytes.
    HexString(Vec<u8>),
    DictBegin,
    DictEnd,
    ArrayBegin,
    ArrayEnd,
    Keyword(Keyword),
}

/// Token plus its starting byte offset.
pub type Spanned = (usize, Token);

/// PDF whitespace: NUL, HT, LF, FF, CR, SP.
pub const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

pub const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub(crate) const fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Name bytes become UTF-8 text when valid, Latin-1 otherwise.
pub(crate) fn name_from_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(name) => name,
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    }
}

/// Tokenizer over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position in the input.
    pub const fn tell(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Unconsumed input.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub const fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Skip whitespace and comments. A comment runs to the next CR or LF.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'%' {
                let rest = &self.data[self.pos..];
                match rest.iter().position(|&c| c == b'\r' || c == b'\n') {
                    Some(offset) => self.pos += offset + 1,
                    None => self.pos = self.data.len(),
                }
            } else if is_whitespace(b) {
                self.pos += 1;
            } else {
                return;
            }
        }
    }

    /// Next token, or `None` once only whitespace and comments remain.
    pub fn next_token(&mut self) -> Result<Option<Spanned>> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(b) = self.peek() else {
            return Ok(None);
        };

        let token = match b {
            b'/' => self.parse_name(),
            b'(' => self.parse_string()?,
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.pos += 2;
                    Token::DictBegin
                } else {
                    self.parse_hex_string()?
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    Token::DictEnd
                } else {
                    self.pos += 1;
                    Token::Keyword(Keyword::Other(b">".to_vec()))
                }
            }
            b'[' => {
                self.pos += 1;
                Token::ArrayBegin
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b')' | b'{' | b'}' => {
                self.pos += 1;
                Token::Keyword(Keyword::Other(vec![b]))
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.parse_number()?,
            _ => self.parse_keyword(),
        };
        Ok(Some((start, token)))
    }

    /// `/Name` with `#xx` escapes. A `#` not followed by two hex digits is
    /// kept as is.
    fn parse_name(&mut self) -> Token {
        self.pos += 1;
        let mut name = Vec::new();
        while let Some(b) = self.peek() {
            if !is_regular(b) {
                break;
            }
            if b == b'#'
                && let (Some(hi), Some(lo)) = (
                    self.peek_at(1).and_then(hex_value),
                    self.peek_at(2).and_then(hex_value),
                )
            {
                name.push((hi << 4) | lo);
                self.pos += 3;
                continue;
            }
            name.push(b);
            self.pos += 1;
        }
        Token::Name(name_from_bytes(name))
    }

    /// Integer or real: optional sign, digits, at most one decimal point.
    fn parse_number(&mut self) -> Result<Token> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        let mut has_dot = false;
        let mut digits = 0usize;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                digits += 1;
            } else if b == b'.' && !has_dot {
                has_dot = true;
            } else {
                break;
            }
            self.pos += 1;
        }

        let literal = &self.data[start..self.pos];
        // `-` and `.` on their own are not numbers.
        let text = String::from_utf8_lossy(literal);
        if digits == 0 {
            return Err(PdfError::malformed(
                start,
                format!("invalid number {text:?}"),
            ));
        }

        let overflow = || PdfError::NumericOverflow {
            pos: start,
            literal: text.to_string(),
        };
        if has_dot {
            let value: f64 = text.parse().map_err(|_| overflow())?;
            if !value.is_finite() {
                return Err(overflow());
            }
            Ok(Token::Real(value))
        } else {
            text.parse::<i64>().map(Token::Int).map_err(|_| overflow())
        }
    }

    /// `( ... )` literal string with balanced parentheses and escapes.
    fn parse_string(&mut self) -> Result<Token> {
        self.pos += 1;
        let mut result = Vec::new();
        let mut depth = 1usize;

        loop {
            match self.advance().ok_or(PdfError::StreamEndedUnexpectedly)? {
                b'(' => {
                    depth += 1;
                    result.push(b'(');
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    result.push(b')');
                }
                b'\\' => self.parse_escape(&mut result)?,
                c => result.push(c),
            }
        }

        Ok(Token::LiteralString(result))
    }

    fn parse_escape(&mut self, out: &mut Vec<u8>) -> Result<()> {
        match self.advance().ok_or(PdfError::StreamEndedUnexpectedly)? {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'(' => out.push(b'('),
            b')' => out.push(b')'),
            b'\\' => out.push(b'\\'),
            // Line continuation: the EOL and one optional follow-up EOL byte vanish.
            b'\r' | b'\n' => {
                if matches!(self.peek(), Some(b'\r' | b'\n')) {
                    self.pos += 1;
                }
            }
            c @ b'0'..=b'7' => {
                let mut value = u32::from(c - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            // Unknown escape: keep the character.
            c => out.push(c),
        }
        Ok(())
    }

    /// `< ... >` hex string. Whitespace is ignored; an odd final digit is
    /// padded with zero.
    fn parse_hex_string(&mut self) -> Result<Token> {
        self.pos += 1;
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            let pos = self.pos;
            match self.advance().ok_or(PdfError::StreamEndedUnexpectedly)? {
                b'>' => break,
                c if is_whitespace(c) => {}
                c => {
                    let nibble = hex_value(c).ok_or_else(|| {
                        PdfError::malformed(
                            pos,
                            format!("invalid character {:?} in hex string", char::from(c)),
                        )
                    })?;
                    match pending.take() {
                        Some(high) => result.push((high << 4) | nibble),
                        None => pending = Some(nibble),
                    }
                }
            }
        }

        if let Some(high) = pending {
            result.push(high << 4);
        }
        Ok(Token::HexString(result))
    }

    fn parse_keyword(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(is_regular) {
            self.pos += 1;
        }
        Token::Keyword(Keyword::from_bytes(&self.data[start..self.pos]))
    }
}
