//! Common error types for treevault.

use thiserror::Error;

/// Top-level error type for treevault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic operation failed for a reason other than authentication.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// The vault could not be decrypted.
    ///
    /// Deliberately does not say whether the password or the salt was wrong.
    #[error("Authentication failed: wrong password or salt, or the vault was tampered with")]
    Authentication,

    /// Decryption succeeded but the payload is not a serialized tree.
    #[error("Corrupt vault: {0}")]
    CorruptVault(String),

    /// Invalid combination of options or missing inputs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The user aborted an edit after a malformed result.
    #[error("Edit cancelled, vault left unchanged")]
    Cancelled,

    /// The user interrupted an interactive step.
    #[error("Interrupted, vault left unchanged")]
    Interrupted,

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error ends the invocation as a user cancellation rather
    /// than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Interrupted)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
