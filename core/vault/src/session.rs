//! The edit session: one node, one external program, as many attempts as the
//! user needs to produce text that decodes.

use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::{self, DecodeError, NodeKind};
use crate::edit::Editor;
use crate::tree::Node;
use treevault_common::{Error, Result};

/// Asks the user what to do after a malformed edit.
pub trait Confirm {
    /// Show `error` and return `true` to edit again, `false` to abort.
    fn retry(&mut self, error: &DecodeError) -> Result<bool>;
}

/// Result of an edit session.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// Nothing to write.
    Unchanged,
    /// The node's new value.
    Changed(Value),
}

/// Knobs for decoding edited text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Accept unparsable text for an empty node other than the root as a
    /// plain string.
    pub new_node_text_fallback: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            new_node_text_fallback: true,
        }
    }
}

/// Run the edit loop for `node`.
///
/// Every attempt starts again from the node's original text. Text returned
/// byte-for-byte unchanged is not decoded at all.
///
/// # Errors
/// - [`Error::Cancelled`] if the user declines to retry a malformed edit
/// - [`Error::Serialization`] if the node cannot be rendered as text
/// - anything the editor reports
pub fn edit_node(
    node: &Node,
    editor: &mut dyn Editor,
    confirm: &mut dyn Confirm,
    options: SessionOptions,
) -> Result<EditOutcome> {
    let original = codec::encode(node)?;

    loop {
        let edited = editor.edit(original.as_bytes(), node.kind())?;
        if edited == original {
            debug!("{} left untouched", node.address());
            return Ok(EditOutcome::Unchanged);
        }

        let decoded = match codec::decode(node.kind(), edited.as_bytes()) {
            // The root stays a table, so it never falls back to text.
            Err(_)
                if original.is_empty()
                    && options.new_node_text_fallback
                    && !node.address().is_root() =>
            {
                debug!("{} was empty, keeping the edit as text", node.address());
                codec::decode(NodeKind::Text, edited.as_bytes())
            }
            other => other,
        };

        match decoded {
            Ok(value) if &value == node.value() => {
                debug!("{} decodes to its previous value", node.address());
                return Ok(EditOutcome::Unchanged);
            }
            Ok(value) => return Ok(EditOutcome::Changed(value)),
            Err(err) => {
                warn!("Malformed edit of {}: {}", node.address(), err);
                if !confirm.retry(&err)? {
                    return Err(Error::Cancelled);
                }
            }
        }
    }
}
