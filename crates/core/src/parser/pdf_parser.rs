//! Recursive-descent object parser.
//!
//! Builds `PDFObject` trees from lexer tokens. `n g R` triples collapse into
//! references, dictionaries followed by `stream` become streams. Stream
//! length problems are recoverable: strict mode reports them, lenient mode
//! re-synchronizes on the next `endstream`.

use super::lexer::{Keyword, Lexer, Spanned, Token, is_regular, is_whitespace};
use crate::document::options::ParseOptions;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFDict, PDFObjRef, PDFObject, PDFStream};
use bytes::Bytes;
use std::sync::Arc;

const ENDSTREAM: &[u8] = b"endstream";

/// Resolves indirect `/Length` values while a stream is being parsed.
pub trait RefResolver {
    fn resolve_ref(&self, objref: PDFObjRef) -> Result<Arc<PDFObject>>;
}

/// Result of a step that may fail in a way lenient mode can recover from.
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    /// Strict mode reports this; lenient mode may recover.
    Recoverable(PdfError),
    /// Reported in every mode.
    Fatal(PdfError),
}

impl<T> Outcome<T> {
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Self::Ok(value) => f(value),
            Self::Recoverable(err) => Outcome::Recoverable(err),
            Self::Fatal(err) => Outcome::Fatal(err),
        }
    }

    /// Collapse into a `Result`, running `recover` on recoverable errors
    /// unless `strict` is set.
    pub fn or_recover(self, strict: bool, recover: impl FnOnce(PdfError) -> Result<T>) -> Result<T> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Recoverable(err) if !strict => recover(err),
            Self::Recoverable(err) | Self::Fatal(err) => Err(err),
        }
    }
}

/// PDF object parser over a byte slice.
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    /// Backing buffer for zero-copy stream payloads.
    shared: Option<&'a Bytes>,
    options: ParseOptions,
    resolver: Option<&'a dyn RefResolver>,
    depth: usize,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(data),
            shared: None,
            options: ParseOptions::default(),
            resolver: None,
            depth: 0,
        }
    }

    /// Parser whose stream payloads share `data` instead of copying it.
    pub fn from_bytes(data: &'a Bytes) -> Self {
        let mut parser = Self::new(data.as_ref());
        parser.shared = Some(data);
        parser
    }

    #[must_use]
    pub const fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: &'a dyn RefResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub const fn tell(&self) -> usize {
        self.lexer.tell()
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.lexer.set_pos(pos);
    }

    /// Unconsumed input.
    pub fn remaining(&self) -> &'a [u8] {
        self.lexer.remaining()
    }

    fn next_required(&mut self) -> Result<Spanned> {
        self.lexer
            .next_token()?
            .ok_or(PdfError::StreamEndedUnexpectedly)
    }

    /// Parse the next object.
    pub fn parse_object(&mut self) -> Result<PDFObject> {
        let (pos, token) = self.next_required()?;
        self.object_from_token(pos, token)
    }

    /// Parse a dictionary (or stream); the input must start with `<<`.
    pub fn parse_dictionary(&mut self) -> Result<PDFObject> {
        self.lexer.skip_whitespace();
        let pos = self.lexer.tell();
        match self.lexer.remaining() {
            [] => Err(PdfError::StreamEndedUnexpectedly),
            [b'<', b'<', ..] => {
                self.lexer.set_pos(pos + 2);
                self.nested(pos, Self::parse_dict_body)
            }
            _ => Err(PdfError::malformed(pos, "dictionary must begin with '<<'")),
        }
    }

    /// Parse exactly `<objid> <genno> R`.
    pub fn parse_reference(&mut self) -> Result<PDFObjRef> {
        let objid = self.expect_uint("object number")?;
        let genno = self.expect_uint("generation number")?;
        match self.next_required()? {
            (_, Token::Keyword(Keyword::R)) => Ok(PDFObjRef::new(objid, genno)),
            (pos, _) => Err(PdfError::malformed(pos, "expected 'R'")),
        }
    }

    /// Parse `<objid> <genno> obj <object> endobj`.
    ///
    /// Lenient mode accepts a missing `endobj`.
    pub fn parse_indirect_object(&mut self) -> Result<(PDFObjRef, PDFObject)> {
        let objid = self.expect_uint("object number")?;
        let genno = self.expect_uint("generation number")?;
        match self.next_required()? {
            (_, Token::Keyword(Keyword::Obj)) => {}
            (pos, _) => return Err(PdfError::malformed(pos, "expected 'obj'")),
        }
        let objref = PDFObjRef::new(objid, genno);
        let mut obj = self.parse_object()?;

        let save = self.lexer.tell();
        match self.lexer.next_token() {
            Ok(Some((_, Token::Keyword(Keyword::EndObj)))) => {}
            other if self.options.strict => {
                return Err(match other {
                    Err(err) => err,
                    Ok(None) => PdfError::StreamEndedUnexpectedly,
                    Ok(Some((pos, _))) => PdfError::malformed(pos, "expected 'endobj'"),
                });
            }
            _ => {
                tracing::debug!(%objref, "object has no endobj keyword");
                self.lexer.set_pos(save);
            }
        }

        if let PDFObject::Stream(stream) = &mut obj {
            stream.objref = Some(objref);
        }
        Ok((objref, obj))
    }

    fn expect_uint(&mut self, what: &str) -> Result<u32> {
        match self.next_required()? {
            (pos, Token::Int(n)) => u32::try_from(n)
                .map_err(|_| PdfError::malformed(pos, format!("{what} {n} out of range"))),
            (pos, _) => Err(PdfError::malformed(pos, format!("expected {what}"))),
        }
    }

    fn object_from_token(&mut self, pos: usize, token: Token) -> Result<PDFObject> {
        match token {
            Token::Int(n) => Ok(self.try_reference(n).map_or(PDFObject::Int(n), PDFObject::Ref)),
            Token::Real(value) => Ok(PDFObject::Real(value)),
            Token::Name(name) => Ok(PDFObject::Name(name)),
            Token::LiteralString(bytes) | Token::HexString(bytes) => Ok(PDFObject::string(bytes)),
            Token::ArrayBegin => self.nested(pos, Self::parse_array_body),
            Token::DictBegin => self.nested(pos, Self::parse_dict_body),
            Token::Keyword(Keyword::True) => Ok(PDFObject::Bool(true)),
            Token::Keyword(Keyword::False) => Ok(PDFObject::Bool(false)),
            Token::Keyword(Keyword::Null) => Ok(PDFObject::Null),
            Token::Keyword(kw) => Err(PdfError::malformed(
                pos,
                format!(
                    "unexpected keyword {:?}",
                    String::from_utf8_lossy(kw.as_bytes())
                ),
            )),
            Token::ArrayEnd | Token::DictEnd => {
                Err(PdfError::malformed(pos, "unexpected closing delimiter"))
            }
        }
    }

    fn nested(
        &mut self,
        pos: usize,
        body: fn(&mut Self) -> Result<PDFObject>,
    ) -> Result<PDFObject> {
        if self.depth >= self.options.max_depth {
            return Err(PdfError::malformed(
                pos,
                format!("nesting deeper than {} levels", self.options.max_depth),
            ));
        }
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result
    }

    /// After an integer, look ahead for `<genno> R`; restore the position
    /// when the triple does not match.
    fn try_reference(&mut self, objid: i64) -> Option<PDFObjRef> {
        let objid = u32::try_from(objid).ok()?;
        let save = self.lexer.tell();
        let genno = self.reference_tail();
        if genno.is_none() {
            self.lexer.set_pos(save);
        }
        genno.map(|genno| PDFObjRef::new(objid, genno))
    }

    fn reference_tail(&mut self) -> Option<u32> {
        let Ok(Some((_, Token::Int(genno)))) = self.lexer.next_token() else {
            return None;
        };
        let genno = u32::try_from(genno).ok()?;
        matches!(
            self.lexer.next_token(),
            Ok(Some((_, Token::Keyword(Keyword::R))))
        )
        .then_some(genno)
    }

    fn parse_array_body(&mut self) -> Result<PDFObject> {
        let mut items = Vec::new();
        loop {
            match self.next_required()? {
                (_, Token::ArrayEnd) => break,
                (pos, Token::DictEnd) => {
                    return Err(PdfError::malformed(pos, "'>>' inside array"));
                }
                (pos, token) => items.push(self.object_from_token(pos, token)?),
            }
        }
        Ok(PDFObject::Array(items))
    }

    fn parse_dict_body(&mut self) -> Result<PDFObject> {
        let mut dict = PDFDict::new();
        loop {
            let key = match self.next_required()? {
                (_, Token::DictEnd) => break,
                (_, Token::Name(key)) => key,
                (pos, _) => {
                    return Err(PdfError::malformed(pos, "dictionary key must be a name"));
                }
            };
            let value = match self.next_required()? {
                (pos, Token::DictEnd) => {
                    return Err(PdfError::malformed(
                        pos,
                        format!("missing value for key /{key}"),
                    ));
                }
                (pos, token) => self.object_from_token(pos, token)?,
            };
            dict.insert(key, value);
        }

        if self.at_stream_keyword() {
            return self.parse_stream_body(dict).map(PDFObject::from);
        }
        Ok(PDFObject::Dict(dict))
    }

    /// Consume `stream` if it is the next keyword after the dictionary.
    fn at_stream_keyword(&mut self) -> bool {
        let data = self.lexer.data();
        let mut pos = self.lexer.tell();
        while data.get(pos).copied().is_some_and(is_whitespace) {
            pos += 1;
        }
        let rest = &data[pos..];
        let found = rest.starts_with(b"stream") && rest.get(6).is_none_or(|&b| !is_regular(b));
        if found {
            self.lexer.set_pos(pos + 6);
        }
        found
    }

    fn parse_stream_body(&mut self, dict: PDFDict) -> Result<PDFStream> {
        let data = self.lexer.data();
        let mut pos = self.lexer.tell();
        // Some writers put spaces between `stream` and the EOL.
        while data.get(pos) == Some(&b' ') {
            pos += 1;
        }
        match data.get(pos) {
            Some(b'\n') => pos += 1,
            Some(b'\r') => {
                pos += 1;
                if data.get(pos) == Some(&b'\n') {
                    pos += 1;
                }
            }
            _ => {
                return Err(PdfError::malformed(
                    pos,
                    "stream data must be followed by a newline",
                ));
            }
        }

        let start = pos;
        let strict = self.options.strict;
        let (end, resume) = self
            .stream_length(&dict, start)
            .and_then(|len| check_declared_span(data, start, len))
            .or_recover(strict, |err| match scan_for_endstream(data, start) {
                Some(extent) => {
                    tracing::warn!(offset = start, error = %err, "re-synchronized stream on endstream marker");
                    Ok(extent)
                }
                None => Err(err),
            })?;
        self.lexer.set_pos(resume);

        let raw = match self.shared {
            Some(bytes) => bytes.slice(start..end),
            None => Bytes::copy_from_slice(&data[start..end]),
        };
        Ok(PDFStream::new(dict, raw))
    }

    fn stream_length(&self, dict: &PDFDict, start: usize) -> Outcome<usize> {
        let length = match dict.get("Length") {
            Some(PDFObject::Int(n)) => Some(*n),
            Some(PDFObject::Ref(objref)) => match self.resolver.map(|r| r.resolve_ref(*objref)) {
                Some(Ok(obj)) => obj.as_int().ok(),
                Some(Err(err)) => return Outcome::Fatal(err),
                None => None,
            },
            _ => None,
        };
        match length.and_then(|n| usize::try_from(n).ok()) {
            Some(len) => Outcome::Ok(len),
            None => Outcome::Recoverable(PdfError::UndefinedStreamLength { pos: start }),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Payload end for a marker at `marker`, dropping one EOL before it.
fn trim_eol(data: &[u8], start: usize, marker: usize) -> usize {
    let mut end = marker;
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && data[end - 1] == b'\r' {
        end -= 1;
    }
    end
}

/// Check that `endstream` follows the declared payload span.
///
/// A marker starting inside the declared span also bounds the payload, so
/// an over-long `/Length` is accepted.
fn check_declared_span(data: &[u8], start: usize, len: usize) -> Outcome<(usize, usize)> {
    let end = start.saturating_add(len);
    if end <= data.len() {
        let mut after = end;
        while data.get(after).copied().is_some_and(is_whitespace) {
            after += 1;
        }
        if data[after..].starts_with(ENDSTREAM) {
            return Outcome::Ok((end, after + ENDSTREAM.len()));
        }
    }

    let window_end = data.len().min(end.saturating_add(ENDSTREAM.len()));
    if let Some(idx) = find(&data[start..window_end], ENDSTREAM)
        && idx < len
    {
        let marker = start + idx;
        return Outcome::Ok((trim_eol(data, start, marker), marker + ENDSTREAM.len()));
    }

    Outcome::Recoverable(PdfError::StreamLengthMismatch {
        pos: start,
        declared: len,
    })
}

fn scan_for_endstream(data: &[u8], start: usize) -> Option<(usize, usize)> {
    let marker = start + find(&data[start..], ENDSTREAM)?;
    Some((trim_eol(data, start, marker), marker + ENDSTREAM.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_eol_variants() {
        assert_eq!(trim_eol(b"ab\r\nendstream", 0, 4), 2);
        assert_eq!(trim_eol(b"ab\nendstream", 0, 3), 2);
        assert_eq!(trim_eol(b"ab\rendstream", 0, 3), 2);
        assert_eq!(trim_eol(b"abendstream", 0, 2), 2);
        assert_eq!(trim_eol(b"\nendstream", 1, 1), 1);
    }

    #[test]
    fn outcome_recovery() {
        let outcome: Outcome<u8> = Outcome::Recoverable(PdfError::NoValidXRef);
        assert_eq!(outcome.or_recover(false, |_| Ok(7)).unwrap(), 7);
        let outcome: Outcome<u8> = Outcome::Recoverable(PdfError::NoValidXRef);
        assert!(outcome.or_recover(true, |_| Ok(7)).is_err());
        let outcome: Outcome<u8> = Outcome::Fatal(PdfError::NoValidXRef);
        assert!(outcome.or_recover(false, |_| Ok(7)).is_err());
    }

    #[test]
    fn reference_lookahead_restores_position() {
        let mut parser = ObjectParser::new(b"1 2 3 R");
        assert_eq!(parser.parse_object().unwrap(), PDFObject::Int(1));
        assert_eq!(
            parser.parse_object().unwrap(),
            PDFObject::Ref(PDFObjRef::new(2, 3))
        );
    }
}
