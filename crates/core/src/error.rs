//! Error types for the quire PDF core.

use thiserror::Error;

/// Primary error type for parsing, object resolution and decryption.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Input ran out before a token or object was complete.
    #[error("stream has ended unexpectedly")]
    StreamEndedUnexpectedly,

    /// Grammar violation at a byte offset.
    #[error("malformed object at byte {pos:#x}: {msg}")]
    MalformedObject { pos: usize, msg: String },

    /// Strict mode: a stream dictionary without a usable /Length.
    #[error("stream length not defined (stream data at byte {pos:#x})")]
    UndefinedStreamLength { pos: usize },

    /// Strict mode: `endstream` does not follow the declared /Length.
    #[error("stream at byte {pos:#x} does not end after its declared /Length {declared}")]
    StreamLengthMismatch { pos: usize, declared: usize },

    #[error("numeric literal {literal:?} at byte {pos:#x} is out of range")]
    NumericOverflow { pos: usize, literal: String },

    #[error("encryption not supported: {0}")]
    EncryptionUnsupported(String),

    #[error("no password matched the document's owner or user entry")]
    AuthenticationFailed,

    /// Encrypted content was requested before a successful authentication.
    #[error("document is encrypted and has not been unlocked")]
    DocumentLocked,

    #[error("object {objid} {genno} R not found")]
    ObjectNotFound { objid: u32, genno: u32 },

    #[error("no valid xref table found")]
    NoValidXRef,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("key not found: {0}")]
    KeyError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("decryption error: {0}")]
    DecryptionError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PdfError {
    pub(crate) fn malformed(pos: usize, msg: impl Into<String>) -> Self {
        Self::MalformedObject {
            pos,
            msg: msg.into(),
        }
    }

    /// Whether this error comes from running out of input.
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::StreamEndedUnexpectedly)
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
