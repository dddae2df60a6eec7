//! The vault file: reading, unlocking and saving it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::persist::write_atomic;
use crate::tree::VaultTree;
use treevault_common::{Result, SensitiveBytes};
use treevault_crypto::{decrypt, encrypt, VaultKey};

/// Access to one vault file.
pub struct VaultManager {
    path: PathBuf,
}

impl VaultManager {
    /// Manage the vault stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The vault file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the sealed vault, or `None` if the file does not exist yet.
    pub fn read(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(blob) => {
                debug!("Read {} bytes from {}", blob.len(), self.path.display());
                Ok(Some(blob))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Decrypt a sealed vault and parse the tree inside.
    ///
    /// # Errors
    /// - [`treevault_common::Error::Authentication`] for a wrong key or a
    ///   damaged file
    /// - [`treevault_common::Error::CorruptVault`] if the plaintext is not a tree
    pub fn unlock(&self, blob: &[u8], key: &VaultKey) -> Result<VaultTree> {
        let plaintext = SensitiveBytes::new(decrypt(key, blob)?);
        VaultTree::load(plaintext.as_bytes())
    }

    /// Encrypt `tree` under `key` and atomically replace the vault file.
    pub fn save(&self, tree: &VaultTree, key: &VaultKey) -> Result<()> {
        let plaintext = tree.to_bytes()?;
        let token = encrypt(key, plaintext.as_bytes())?;
        write_atomic(&self.path, &token)?;
        info!("Saved vault to {}", self.path.display());
        Ok(())
    }
}
