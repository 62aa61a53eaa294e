//! Document structure and security.
//!
//! This module contains:
//! - `catalog` - indirect object graph with caching and cycle guard (Document)
//! - `xref` - cross-reference tables, streams and fallback scanning
//! - `security` - standard security handler (RC4, AES-128)
//! - `permissions` - `/P` access flags
//! - `options` - strict / lenient parsing

pub mod catalog;
pub mod options;
pub mod permissions;
pub mod security;
pub mod xref;

pub use catalog::Document;
pub use options::{DEFAULT_MAX_DEPTH, ParseOptions};
pub use permissions::Permissions;
pub use security::{
    CryptMethod, EncryptionParams, PASSWORD_PADDING, PasswordType, StandardSecurityHandler,
    password_bytes,
};
pub use xref::{XRefEntry, XRefTable};
