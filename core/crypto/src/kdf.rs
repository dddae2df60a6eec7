//! Key derivation using PBKDF2-HMAC-SHA256.
//!
//! The vault key is a pure function of the password and the salt, so the same
//! pair always opens the same vault and nothing besides the salt needs to be
//! stored alongside the ciphertext.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::keys::{Salt, VaultKey, KEY_LENGTH};
use treevault_common::{Error, Result};

/// Parameters for PBKDF2 key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Number of HMAC-SHA256 iterations.
    pub iterations: u32,
}

impl KdfParams {
    /// Iteration count every vault is written with.
    pub const DEFAULT_ITERATIONS: u32 = 100_000;

    /// Create parameters with an explicit iteration count.
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::with_iterations(Self::DEFAULT_ITERATIONS)
    }
}

/// Derive the vault key from a password and salt.
///
/// # Postconditions
/// - Returns a 32-byte key that zeroizes on drop
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - Returns error if the iteration count is zero
///
/// # Security
/// - Password is not stored or logged
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<VaultKey> {
    if params.iterations == 0 {
        return Err(Error::Crypto(
            "KDF iteration count must be positive".to_string(),
        ));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password, salt.as_bytes(), params.iterations, &mut key_bytes);

    Ok(VaultKey::from_bytes(key_bytes))
}
