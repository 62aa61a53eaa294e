//! quire - PDF object parsing, indirect object resolution and the standard
//! security handler.
//!
//! ```no_run
//! use quire_core::{Document, ParseOptions};
//!
//! let data = std::fs::read("file.pdf")?;
//! let mut doc = Document::load(data, ParseOptions::default())?;
//! if doc.is_locked() && !doc.authenticate("secret") {
//!     eprintln!("wrong password");
//! }
//! let catalog = doc.catalog()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod document;
pub mod error;
pub mod model;
pub mod parser;

pub use codec::filters::{FilterRegistry, StreamFilter};
pub use document::{
    CryptMethod, Document, EncryptionParams, ParseOptions, PasswordType, Permissions,
    StandardSecurityHandler, XRefEntry, XRefTable,
};
pub use error::{PdfError, Result};
pub use model::{PDFDict, PDFObjRef, PDFObject, PDFStream, PDFString, StringEncoding};
pub use parser::{Lexer, ObjectParser, Token};
