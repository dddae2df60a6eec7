//! In-memory representation of the decrypted vault.
//!
//! The tree is a JSON object whose values are strings, nested objects or any
//! other JSON value. Nodes are addressed by key paths; resolving a path
//! creates every missing key on the way as an empty object, and [`VaultTree::commit`]
//! is the only way to overwrite a node.

use serde_json::{Map, Value};

use crate::codec::NodeKind;
use treevault_common::{Address, Error, Result, SensitiveBytes};

/// A value located in the tree, tagged with how it is edited.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    address: Address,
    kind: NodeKind,
    value: Value,
}

impl Node {
    fn new(address: Address, value: Value) -> Self {
        Self {
            address,
            kind: NodeKind::of(&value),
            value,
        }
    }

    /// Where this node lives.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The editing kind assigned at resolution time.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The node's value at resolution time.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// The decrypted vault contents. The root is always an object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VaultTree {
    root: Map<String, Value>,
}

impl VaultTree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse decrypted vault bytes.
    ///
    /// Empty input is an empty tree.
    ///
    /// # Errors
    /// - [`Error::CorruptVault`] if the bytes are not JSON or the top level is
    ///   not an object
    pub fn load(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }

        match serde_json::from_slice(bytes) {
            Ok(Value::Object(root)) => Ok(Self { root }),
            Ok(_) => Err(Error::CorruptVault(
                "top-level value is not an object".to_string(),
            )),
            Err(e) => Err(Error::CorruptVault(e.to_string())),
        }
    }

    /// Serialize to the bytes [`VaultTree::load`] accepts.
    pub fn to_bytes(&self) -> Result<SensitiveBytes> {
        serde_json::to_vec(&self.root)
            .map(SensitiveBytes::new)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Get the root object.
    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Locate the node at `address`, creating every missing key along the
    /// way (including the last one) as an empty object.
    ///
    /// # Errors
    /// - [`Error::InvalidInput`] if the path runs through a value that is not
    ///   an object
    pub fn resolve(&mut self, address: &Address) -> Result<Node> {
        let value = match address.components().split_last() {
            None => Value::Object(self.root.clone()),
            Some((leaf, parents)) => {
                let parent = self.parent_mut(address, parents)?;
                parent
                    .entry(leaf.clone())
                    .or_insert_with(empty_object)
                    .clone()
            }
        };

        Ok(Node::new(address.clone(), value))
    }

    /// Overwrite the node at `address`.
    ///
    /// Committing to the root address replaces the whole tree and requires an
    /// object.
    pub fn commit(&mut self, address: &Address, value: Value) -> Result<()> {
        match address.components().split_last() {
            None => match value {
                Value::Object(root) => {
                    self.root = root;
                    Ok(())
                }
                _ => Err(Error::InvalidInput(
                    "the vault root must be a table".to_string(),
                )),
            },
            Some((leaf, parents)) => {
                let parent = self.parent_mut(address, parents)?;
                parent.insert(leaf.clone(), value);
                Ok(())
            }
        }
    }

    /// Walk to the object containing the addressed node.
    fn parent_mut(
        &mut self,
        address: &Address,
        parents: &[String],
    ) -> Result<&mut Map<String, Value>> {
        let mut current = &mut self.root;
        for (depth, key) in parents.iter().enumerate() {
            let child = current.entry(key.clone()).or_insert_with(empty_object);
            current = child.as_object_mut().ok_or_else(|| {
                Error::InvalidInput(format!(
                    "cannot resolve {}: {} is not a table",
                    address,
                    Address::from_components(&parents[..=depth])
                ))
            })?;
        }
        Ok(current)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}
