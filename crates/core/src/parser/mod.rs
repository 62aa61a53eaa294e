//! PDF object syntax.
//!
//! - `lexer`: byte-level tokenizer
//! - `pdf_parser`: recursive-descent object parser

pub mod lexer;
pub mod pdf_parser;

pub use lexer::{Keyword, Lexer, Token};
pub use pdf_parser::{ObjectParser, Outcome, RefResolver};
