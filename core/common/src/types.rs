//! Common types used throughout treevault.

use std::fmt;
use zeroize::Zeroize;

/// A path from the tree root to a node, as an ordered list of key names.
///
/// Keys are arbitrary strings: the tree is a JSON object, so any key JSON
/// allows is addressable, including ones containing `/` or `.`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    components: Vec<String>,
}

impl Address {
    /// The empty address, naming the whole tree.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create an address from key names, outermost first.
    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if this is the root address.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Address of the containing mapping, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// The last key name.
    pub fn leaf(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Append a key name.
    pub fn join(&self, key: impl Into<String>) -> Self {
        let mut components = self.components.clone();
        components.push(key.into());
        Self { components }
    }

    /// Get the key names.
    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

/// Sensitive data wrapper that zeroizes on drop.
///
/// Holds decrypted vault bytes and node plaintext between the envelope and
/// the external process.
#[derive(Clone, Zeroize, PartialEq, Eq)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SensitiveBytes {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}
