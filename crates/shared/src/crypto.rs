//! Symmetric encryption and hashing utilities.
//!
//! Values are sealed with AES-256-GCM under a key derived from a passphrase.
//! The output layout is `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! Each call builds its own cipher and nonce; nothing is shared between calls.
//!
//! Values sealed under the older key format (the MD5 hex digest of the
//! passphrase, used as 32 raw key bytes) still decrypt.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use md5::Md5;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Size of the AES-GCM nonce prepended to every ciphertext.
pub const NONCE_LEN: usize = 12;

/// Error type for encryption operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed")]
    Decryption,

    #[error("Ciphertext is too short: {0} bytes")]
    Malformed(usize),
}

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derives the 256-bit AES key for a passphrase.
pub fn derive_key(key_phrase: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    key.copy_from_slice(&Sha256::digest(key_phrase.as_bytes()));
    key
}

/// Older key format: the lowercase MD5 hex digest of the passphrase, taken as bytes.
pub fn derive_legacy_key(key_phrase: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    key.copy_from_slice(hex::encode(Md5::digest(key_phrase.as_bytes())).as_bytes());
    key
}

/// Encrypts `value` with a key derived from `key_phrase`.
pub fn encrypt(value: &[u8], key_phrase: &str) -> Result<Vec<u8>, CryptoError> {
    seal(&derive_key(key_phrase), value)
}

/// Decrypts a value produced by [`encrypt`] with the same passphrase.
///
/// Falls back to the legacy key when the current one fails to authenticate.
pub fn decrypt(ciphered: &[u8], key_phrase: &str) -> Result<Vec<u8>, CryptoError> {
    if ciphered.len() < NONCE_LEN {
        return Err(CryptoError::Malformed(ciphered.len()));
    }

    let (nonce, sealed) = ciphered.split_at(NONCE_LEN);
    open(&derive_key(key_phrase), nonce, sealed).or_else(|_| {
        let plain = open(&derive_legacy_key(key_phrase), nonce, sealed)?;
        debug!("decrypted value sealed with the legacy key");
        Ok(plain)
    })
}

fn seal(key: &[u8; 32], value: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), value)
        .map_err(|_| CryptoError::Encryption)?;

    let mut output = Vec::with_capacity(NONCE_LEN + sealed.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&sealed);
    Ok(output)
}

fn open(key: &[u8; 32], nonce: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Decryption)
}
