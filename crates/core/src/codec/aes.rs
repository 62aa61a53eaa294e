//! AES-128-CBC helpers for the AESV2 crypt filter.
//!
//! Ciphertext in a PDF is `IV || CBC(PKCS#7(plaintext))`.

use crate::error::{PdfError, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};

type Aes128CbcDec = Decryptor<aes::Aes128>;
type Aes128CbcEnc = Encryptor<aes::Aes128>;

pub const AES_BLOCK: usize = 16;

fn check_key_iv(key: &[u8], iv: &[u8]) -> Result<()> {
    if key.len() != 16 {
        return Err(PdfError::DecryptionError(format!(
            "AES-128 key must be 16 bytes, got {}",
            key.len()
        )));
    }
    if iv.len() != AES_BLOCK {
        return Err(PdfError::DecryptionError(format!(
            "AES IV must be 16 bytes, got {}",
            iv.len()
        )));
    }
    Ok(())
}

/// Decrypt block-aligned data with AES-128-CBC, no padding removal.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key_iv(key, iv)?;
    if data.len() % AES_BLOCK != 0 {
        return Err(PdfError::DecryptionError(format!(
            "AES ciphertext length {} is not a multiple of 16",
            data.len()
        )));
    }
    let mut buf = data.to_vec();
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| PdfError::DecryptionError(e.to_string()))?;
    Ok(buf)
}

/// Encrypt block-aligned data with AES-128-CBC, no padding added.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key_iv(key, iv)?;
    if data.len() % AES_BLOCK != 0 {
        return Err(PdfError::DecryptionError(format!(
            "AES plaintext length {} is not a multiple of 16",
            data.len()
        )));
    }
    let mut buf = data.to_vec();
    let len = buf.len();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|e| PdfError::DecryptionError(e.to_string()))?;
    Ok(buf)
}

/// Append PKCS#7 padding (always 1..=16 bytes).
pub fn pad_aes(data: &[u8]) -> Vec<u8> {
    let pad_len = AES_BLOCK - data.len() % AES_BLOCK;
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(data.len() + pad_len, pad_len as u8);
    out
}

/// Strip PKCS#7 padding. Malformed padding leaves `data` as is.
pub fn unpad_aes(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > AES_BLOCK || pad_len > data.len() {
        return data;
    }

    let start = data.len() - pad_len;
    if data[start..].iter().any(|&b| b as usize != pad_len) {
        return data;
    }
    &data[..start]
}

/// Decrypt `IV || ciphertext` and strip the padding.
///
/// A buffer holding only the IV decrypts to nothing.
pub fn aes_decrypt_with_iv(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < AES_BLOCK {
        return Err(PdfError::DecryptionError(format!(
            "AES data of {} bytes is shorter than its IV",
            data.len()
        )));
    }
    let (iv, body) = data.split_at(AES_BLOCK);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let plain = aes_cbc_decrypt(key, iv, body)?;
    Ok(unpad_aes(&plain).to_vec())
}

/// Pad `data`, encrypt it under `iv`, and prefix the IV.
pub fn aes_encrypt_with_iv(key: &[u8], iv: &[u8; AES_BLOCK], data: &[u8]) -> Result<Vec<u8>> {
    let body = aes_cbc_encrypt(key, iv, &pad_aes(data))?;
    let mut out = Vec::with_capacity(AES_BLOCK + body.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_then_unpad() {
        assert_eq!(pad_aes(b""), vec![16u8; 16]);
        let padded = pad_aes(b"abc");
        assert_eq!(padded.len(), 16);
        assert_eq!(unpad_aes(&padded), b"abc");
    }

    #[test]
    fn invalid_padding_is_kept() {
        let data = [1u8, 2, 3, 0];
        assert_eq!(unpad_aes(&data), &data);
        let data = [5u8, 5, 4, 5];
        assert_eq!(unpad_aes(&data), &data);
    }

    #[test]
    fn iv_only_is_empty() {
        assert_eq!(aes_decrypt_with_iv(&[0u8; 16], &[7u8; 16]).unwrap(), b"");
    }

    #[test]
    fn misaligned_ciphertext_errors() {
        let err = aes_decrypt_with_iv(&[0u8; 16], &[0u8; 21]).unwrap_err();
        assert!(matches!(err, PdfError::DecryptionError(_)));
    }
}
