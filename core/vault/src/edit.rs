//! Handing node text to an external program.
//!
//! The user's action is a shell command template. The node text is written
//! to a private temporary file, `{}` in the template is replaced with the
//! quoted path, the command runs in the foreground, and whatever is in the
//! file afterwards is the edit.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::codec::NodeKind;
use crate::interrupt;
use treevault_common::{Result, SensitiveBytes};

/// Placeholder replaced with the temporary file path.
pub const PLACEHOLDER: &str = "{}";

/// A command template with at least one placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    template: String,
}

impl Action {
    /// Build an action, appending the placeholder as a trailing argument if
    /// the template has none (`"vim"` becomes `"vim {}"`).
    pub fn new(template: impl Into<String>) -> Self {
        let mut template = template.into();
        if !template.contains(PLACEHOLDER) {
            if !template.is_empty() {
                template.push(' ');
            }
            template.push_str(PLACEHOLDER);
        }
        Self { template }
    }

    /// The template, placeholder included.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Shell command line with every placeholder replaced by `path`.
    pub fn command_line(&self, path: &Path) -> String {
        self.template
            .replace(PLACEHOLDER, &shell_quote(&path.to_string_lossy()))
    }
}

/// Quote a string as one POSIX shell word.
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', "'\\''"))
}

/// Something that lets the user change a node's text.
pub trait Editor {
    /// Present `text` and return the text as it is afterwards.
    fn edit(&mut self, text: &[u8], kind: NodeKind) -> Result<SensitiveBytes>;
}

/// Default location for plaintext temporary files: the per-user runtime
/// directory where there is one, the system temp directory otherwise.
pub fn default_temp_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}

/// Runs an [`Action`] through `sh -c`.
pub struct ShellEditor {
    action: Action,
    temp_dir: PathBuf,
}

impl ShellEditor {
    /// Create an editor writing its temporary files to `temp_dir`, or to
    /// [`default_temp_dir`] when `None`.
    pub fn new(action: Action, temp_dir: Option<PathBuf>) -> Self {
        Self {
            action,
            temp_dir: temp_dir.unwrap_or_else(default_temp_dir),
        }
    }
}

impl Editor for ShellEditor {
    fn edit(&mut self, text: &[u8], kind: NodeKind) -> Result<SensitiveBytes> {
        let _deferral = interrupt::defer();

        // Created 0600; removed when `file` drops, on every path out of here.
        let mut file = tempfile::Builder::new()
            .prefix("treevault-")
            .suffix(kind.file_suffix())
            .tempfile_in(&self.temp_dir)?;
        file.write_all(text)?;
        file.flush()?;

        let command_line = self.action.command_line(file.path());
        debug!("Running action: {}", command_line);

        let status = Command::new("sh").arg("-c").arg(&command_line).status()?;
        if !status.success() {
            warn!("Action exited with {}", status);
        }
        interrupt::check()?;

        // Read by path: editors often replace the file rather than rewrite it.
        let edited = fs::read(file.path())?;
        Ok(SensitiveBytes::new(edited))
    }
}
