//! RC4 and AES-128-CBC known-answer tests.

use quire_core::codec::{Arcfour, aes_cbc_decrypt, aes_cbc_encrypt, aes_decrypt_with_iv, aes_encrypt_with_iv, rc4};

#[test]
fn test_arcfour_key() {
    let mut cipher = Arcfour::new(b"Key").unwrap();
    assert_eq!(hex::encode(&cipher.process(b"Plaintext")), "bbf316e8d940af0ad3");
}

#[test]
fn test_arcfour_wiki() {
    let mut cipher = Arcfour::new(b"Wiki").unwrap();
    assert_eq!(hex::encode(&cipher.process(b"pedia")), "1021bf0420");
}

#[test]
fn test_arcfour_secret() {
    let mut cipher = Arcfour::new(b"Secret").unwrap();
    assert_eq!(hex::encode(&cipher.process(b"Attack at dawn")), "45a01f645fc35b383552544b9bf5");
}

#[test]
fn test_arcfour_keystream_continues_across_calls() {
    let mut cipher = Arcfour::new(b"Secret").unwrap();
    let mut out = cipher.process(b"Attack");
    out.extend(cipher.process(b" at dawn"));
    assert_eq!(out, rc4(b"Secret", b"Attack at dawn").unwrap());
}

#[test]
fn test_arcfour_key_bounds() {
    assert!(Arcfour::new(b"").is_err());
    assert!(Arcfour::new(&[7; 256]).is_ok());
    assert!(Arcfour::new(&[7; 257]).is_err());
}

// NIST SP 800-38A F.2.1, first block.
const NIST_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";
const NIST_IV: &str = "000102030405060708090a0b0c0d0e0f";
const NIST_PLAIN: &str = "6bc1bee22e409f96e93d7e117393172a";
const NIST_CIPHER: &str = "7649abac8119b246cee98e9b12e9197d";

#[test]
fn test_aes_cbc_nist_vector() {
    let key = hex::decode(NIST_KEY).unwrap();
    let iv = hex::decode(NIST_IV).unwrap();
    let encrypted = aes_cbc_encrypt(&key, &iv, &hex::decode(NIST_PLAIN).unwrap()).unwrap();
    assert_eq!(hex::encode(&encrypted), NIST_CIPHER);
    let decrypted = aes_cbc_decrypt(&key, &iv, &encrypted).unwrap();
    assert_eq!(hex::encode(&decrypted), NIST_PLAIN);
}

#[test]
fn test_aes_rejects_bad_sizes() {
    let key = hex::decode(NIST_KEY).unwrap();
    let iv = hex::decode(NIST_IV).unwrap();
    assert!(aes_cbc_decrypt(&key, &iv, &[0; 15]).is_err());
    assert!(aes_cbc_decrypt(&key[..5], &iv, &[0; 16]).is_err());
    assert!(aes_decrypt_with_iv(&key, &[0; 8]).is_err());
}

#[test]
fn test_aes_with_iv_prefix() {
    let key = hex::decode(NIST_KEY).unwrap();
    let iv: [u8; 16] = hex::decode(NIST_IV).unwrap().try_into().unwrap();
    let encrypted = aes_encrypt_with_iv(&key, &iv, b"sixteen byte msg").unwrap();
    // IV, one data block and a full padding block.
    assert_eq!(encrypted.len(), 48);
    assert_eq!(&encrypted[..16], &iv);
    assert_eq!(aes_decrypt_with_iv(&key, &encrypted).unwrap(), b"sixteen byte msg");

    // An IV alone is an empty payload.
    assert!(aes_decrypt_with_iv(&key, &iv).unwrap().is_empty());
}
