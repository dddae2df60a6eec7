//! The authenticated envelope the vault file is stored in.
//!
//! A token is URL-safe base64 text over
//! `version || nonce || ciphertext || tag`, sealed with XChaCha20-Poly1305.
//! The version byte is authenticated as associated data, so a token cannot be
//! relabelled. Every failure to open a token is reported as
//! [`Error::Authentication`]: a wrong password, a wrong salt, tampering and
//! truncation are indistinguishable to the caller.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng, Payload},
    XChaCha20Poly1305,
};
use tracing::debug;

use crate::keys::VaultKey;
use treevault_common::{Error, Result};

/// Current envelope format version.
pub const VERSION: u8 = 1;

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

const HEADER_SIZE: usize = 1 + NONCE_SIZE;

/// Seal plaintext into a self-contained token.
///
/// # Postconditions
/// - Returns ASCII token bytes
/// - A fresh random nonce is used, so sealing the same plaintext twice yields
///   different tokens
///
/// # Errors
/// - Returns error if the cipher fails (never expected with a valid key)
pub fn encrypt(key: &VaultKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: &[VERSION],
            },
        )
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut raw = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    raw.push(VERSION);
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&ciphertext);

    Ok(URL_SAFE.encode(raw).into_bytes())
}

/// Open a token produced by [`encrypt`].
///
/// Leading and trailing ASCII whitespace around the token is ignored.
///
/// # Errors
/// - [`Error::Authentication`] if the key is wrong, the token was modified,
///   is truncated, is not base64, or has an unknown version
pub fn decrypt(key: &VaultKey, token: &[u8]) -> Result<Vec<u8>> {
    let raw = URL_SAFE.decode(token.trim_ascii()).map_err(|e| {
        debug!("Envelope is not valid base64: {}", e);
        Error::Authentication
    })?;

    if raw.len() < HEADER_SIZE + TAG_SIZE {
        debug!("Envelope too short: {} bytes", raw.len());
        return Err(Error::Authentication);
    }

    let version = raw[0];
    if version != VERSION {
        debug!("Unsupported envelope version {}", version);
        return Err(Error::Authentication);
    }

    let (nonce_bytes, sealed) = raw[1..].split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    cipher
        .decrypt(
            GenericArray::from_slice(nonce_bytes),
            Payload {
                msg: sealed,
                aad: &[version],
            },
        )
        .map_err(|_| Error::Authentication)
}
