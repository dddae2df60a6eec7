//! Invocation configuration.
//!
//! Everything an invocation needs to know is collected into one immutable
//! [`Config`] before any key is derived, and passed down explicitly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::edit::Action;
use crate::session::SessionOptions;
use treevault_common::{Address, Error, Result};
use treevault_crypto::{KdfParams, Salt};

/// Where the current salt comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaltSource {
    /// Given on the command line.
    Literal(Vec<u8>),
    /// Read from a file.
    File(PathBuf),
}

impl SaltSource {
    /// Read the salt.
    ///
    /// With `trim`, ASCII whitespace around the contents of a salt file is
    /// dropped. Literal salts are used as given.
    pub fn load(&self, trim: bool) -> Result<Salt> {
        match self {
            SaltSource::Literal(bytes) => Ok(Salt::from_bytes(bytes.clone())),
            SaltSource::File(path) => {
                let bytes = fs::read(path).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => {
                        Error::Config(format!("salt file {} not found", path.display()))
                    }
                    _ => Error::Io(e),
                })?;
                if trim {
                    Ok(Salt::from_bytes(bytes.trim_ascii()))
                } else {
                    Ok(Salt::from_bytes(bytes))
                }
            }
        }
    }
}

/// How the replacement salt is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewSaltSource {
    /// Random bytes of this length, hex encoded.
    Generate(usize),
    /// Given on the command line.
    Literal(Vec<u8>),
}

/// A salt to re-encrypt the vault under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSalt {
    /// How the salt is produced.
    pub source: NewSaltSource,
    /// File to store the new salt in. Without one, a generated salt is
    /// reported back so it can be printed.
    pub save_to: Option<PathBuf>,
}

impl NewSalt {
    /// Produce the salt bytes.
    pub fn materialize(&self) -> Salt {
        match &self.source {
            NewSaltSource::Generate(len) => Salt::generate(*len),
            NewSaltSource::Literal(bytes) => Salt::from_bytes(bytes.clone()),
        }
    }
}

/// Raw options as the command line supplies them.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    /// Vault file.
    pub vault_path: PathBuf,
    /// Keys from the root to the node; empty for the whole tree.
    pub address: Vec<String>,
    /// Literal salt of the existing vault.
    pub salt: Option<String>,
    /// File holding the salt of the existing vault.
    pub salt_file: Option<PathBuf>,
    /// Literal replacement salt.
    pub new_salt: Option<String>,
    /// Generate a replacement salt from this many random bytes.
    pub new_salt_len: Option<usize>,
    /// Where to save the replacement salt.
    pub new_salt_file: Option<PathBuf>,
    /// Command template run on the node text.
    pub action: String,
    /// Use salt file contents verbatim.
    pub keep_salt_whitespace: bool,
    /// Directory for the plaintext temporary file.
    pub temp_dir: Option<PathBuf>,
    /// Never keep an unparsable edit of an empty node as text.
    pub strict_new_nodes: bool,
}

/// Validated, immutable configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Vault file.
    pub vault_path: PathBuf,
    /// Salt of the existing vault.
    pub salt: Option<SaltSource>,
    /// Re-encrypt under this salt.
    pub new_salt: Option<NewSalt>,
    /// Node to operate on.
    pub address: Address,
    /// Command run on the node text.
    pub action: Action,
    /// Key derivation parameters.
    pub kdf: KdfParams,
    /// Trim whitespace around salt file contents.
    pub trim_salt_file: bool,
    /// Directory for the plaintext temporary file.
    pub temp_dir: Option<PathBuf>,
    /// Keep unparsable text for an empty node as a string.
    pub new_node_text_fallback: bool,
}

impl Config {
    /// Validate `options` into a configuration.
    ///
    /// # Errors
    /// - [`Error::Config`] for conflicting or incomplete options
    pub fn from_options(options: ConfigOptions) -> Result<Self> {
        if options.vault_path.as_os_str().is_empty() {
            return Err(Error::Config("a vault path is required".to_string()));
        }

        if options.action.trim().is_empty() {
            return Err(Error::Config("the action must not be empty".to_string()));
        }

        let salt = match (options.salt, options.salt_file) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "give either a salt or a salt file, not both".to_string(),
                ))
            }
            (Some(literal), None) => Some(SaltSource::Literal(literal.into_bytes())),
            (None, Some(path)) => Some(SaltSource::File(path)),
            (None, None) => None,
        };

        let new_salt_source = match (options.new_salt, options.new_salt_len) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "give either a new salt or a new salt length, not both".to_string(),
                ))
            }
            (Some(literal), None) => Some(NewSaltSource::Literal(literal.into_bytes())),
            (None, Some(len)) => Some(NewSaltSource::Generate(len)),
            (None, None) => None,
        };

        let new_salt = match (new_salt_source, options.new_salt_file) {
            (Some(source), save_to) => Some(NewSalt { source, save_to }),
            (None, Some(_)) => {
                return Err(Error::Config(
                    "a new salt file needs a new salt or a new salt length".to_string(),
                ))
            }
            (None, None) => None,
        };

        if matches!(salt, Some(SaltSource::Literal(ref b)) if b.is_empty()) {
            warn!("Using an empty salt");
        }
        if let Some(new_salt) = &new_salt {
            match &new_salt.source {
                NewSaltSource::Generate(0) => warn!("Generating an empty salt"),
                NewSaltSource::Literal(b) if b.is_empty() => warn!("Using an empty new salt"),
                _ => {}
            }
        }

        Ok(Self {
            vault_path: options.vault_path,
            salt,
            new_salt,
            address: Address::from_components(options.address),
            action: Action::new(options.action),
            kdf: KdfParams::default(),
            trim_salt_file: !options.keep_salt_whitespace,
            temp_dir: options.temp_dir,
            new_node_text_fallback: !options.strict_new_nodes,
        })
    }

    /// Check the options that depend on whether the vault file exists.
    ///
    /// # Errors
    /// - [`Error::Config`] if an existing vault has no salt, or a new vault
    ///   has no salt at all
    pub fn check_inputs(&self, vault_exists: bool) -> Result<()> {
        if vault_exists && self.salt.is_none() {
            return Err(Error::Config(format!(
                "{} exists; its salt is required",
                self.vault_path.display()
            )));
        }
        if !vault_exists && self.salt.is_none() && self.new_salt.is_none() {
            return Err(Error::Config(format!(
                "{} does not exist; give a salt or a new salt to create it",
                self.vault_path.display()
            )));
        }
        Ok(())
    }

    /// Edit session knobs.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            new_node_text_fallback: self.new_node_text_fallback,
        }
    }

    /// Vault file path.
    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }
}
