//! Ciphers and stream filters.
//!
//! - `aes`: AES-128-CBC for the AESV2 crypt filter
//! - `arcfour`: RC4 for the V2 crypt filter and key derivation
//! - `filters`: stream decoders (Flate, ASCIIHex, ASCII85)

pub mod aes;
pub mod arcfour;
pub mod filters;

pub use aes::{aes_cbc_decrypt, aes_cbc_encrypt, aes_decrypt_with_iv, aes_encrypt_with_iv, unpad_aes};
pub use arcfour::{Arcfour, rc4};
pub use filters::{FilterRegistry, StreamFilter};
