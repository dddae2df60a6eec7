//! Cryptographic primitives for treevault.
//!
//! This module provides:
//! - Key derivation using PBKDF2-HMAC-SHA256
//! - The authenticated envelope (XChaCha20-Poly1305) the vault file is stored in
//! - Key and salt types with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - A wrong key never yields plaintext: decryption is authenticated

pub mod envelope;
pub mod kdf;
pub mod keys;

pub use envelope::{decrypt, encrypt};
pub use kdf::{derive_key, KdfParams};
pub use keys::{Salt, VaultKey, KEY_LENGTH};
