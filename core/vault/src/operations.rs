//! One invocation, end to end: unlock, edit one node, write back if needed.

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{Config, NewSaltSource};
use crate::edit::Editor;
use crate::interrupt;
use crate::manager::VaultManager;
use crate::persist;
use crate::session::{self, Confirm, EditOutcome};
use crate::tree::VaultTree;
use treevault_common::{Error, Result};
use treevault_crypto::{derive_key, Salt, VaultKey};

/// Supplies passwords.
pub trait PasswordSource {
    /// The password the vault is currently encrypted under.
    fn current(&mut self) -> Result<Zeroizing<String>>;

    /// A new password, already confirmed by the user.
    fn new_password(&mut self) -> Result<Zeroizing<String>>;
}

/// What an invocation did.
#[derive(Debug)]
pub struct Report {
    /// The node was modified.
    pub changed: bool,
    /// The vault file was rewritten.
    pub wrote_vault: bool,
    /// A new salt that did not make it into a file; the caller must show it.
    pub unsaved_salt: Option<Salt>,
}

/// Run one invocation.
///
/// # Errors
/// - [`Error::Config`] if the vault's existence does not fit the salt options
/// - [`Error::Authentication`] for a wrong password or salt
/// - [`Error::Cancelled`] / [`Error::Interrupted`] if the user backs out
///
/// Nothing is written on any error path before the vault itself is saved. A
/// new salt file replaces the old one only after that.
pub fn run(
    config: &Config,
    passwords: &mut dyn PasswordSource,
    editor: &mut dyn Editor,
    confirm: &mut dyn Confirm,
) -> Result<Report> {
    let manager = VaultManager::new(config.vault_path());
    let blob = manager.read()?;
    config.check_inputs(blob.is_some())?;

    let salt = config
        .salt
        .as_ref()
        .map(|source| source.load(config.trim_salt_file))
        .transpose()?;
    let new_salt = config.new_salt.as_ref().map(|n| n.materialize());

    let (mut tree, current_key) = match &blob {
        Some(blob) => {
            let salt = require_salt(salt.as_ref())?;
            let password = passwords.current()?;
            let key = derive_key(password.as_bytes(), salt, &config.kdf)?;
            let tree = manager.unlock(blob, &key)?;
            debug!("Unlocked {}", manager.path().display());
            (tree, Some(key))
        }
        None => {
            info!(
                "{} does not exist, starting an empty vault",
                manager.path().display()
            );
            (VaultTree::new(), None)
        }
    };

    let node = tree.resolve(&config.address)?;
    let changed = match session::edit_node(&node, editor, confirm, config.session_options())? {
        EditOutcome::Changed(value) => {
            tree.commit(&config.address, value)?;
            true
        }
        EditOutcome::Unchanged => false,
    };

    if !changed && new_salt.is_none() {
        info!("No changes, vault not written");
        return Ok(Report {
            changed,
            wrote_vault: false,
            unsaved_salt: None,
        });
    }

    let write_key: VaultKey = match (&new_salt, current_key) {
        (Some(new_salt), _) => {
            let password = passwords.new_password()?;
            derive_key(password.as_bytes(), new_salt, &config.kdf)?
        }
        (None, Some(key)) => key,
        (None, None) => {
            let salt = require_salt(salt.as_ref())?;
            let password = passwords.new_password()?;
            derive_key(password.as_bytes(), salt, &config.kdf)?
        }
    };

    // Interrupts no longer stop the writes from here on.
    let _deferral = interrupt::defer();

    // The salt file may hold the only copy of the current salt, so the new
    // one replaces it only after the vault is safely written.
    let mut unsaved_salt = None;
    let mut staged_salt = None;
    if let (Some(salt), Some(planned)) = (new_salt, config.new_salt.as_ref()) {
        match &planned.save_to {
            Some(path) => staged_salt = Some((persist::stage(path, salt.as_bytes())?, salt)),
            None if matches!(planned.source, NewSaltSource::Generate(_)) => {
                unsaved_salt = Some(salt);
            }
            None => {}
        }
    }

    manager.save(&tree, &write_key)?;

    if let Some((staged, salt)) = staged_salt {
        let path = staged.target().to_path_buf();
        match staged.commit() {
            Ok(()) => info!("Saved new salt to {}", path.display()),
            Err(e) => {
                warn!("Could not save new salt to {}: {}", path.display(), e);
                unsaved_salt = Some(salt);
            }
        }
    }

    Ok(Report {
        changed,
        wrote_vault: true,
        unsaved_salt,
    })
}

fn require_salt(salt: Option<&Salt>) -> Result<&Salt> {
    salt.ok_or_else(|| Error::Config("a salt is required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DecodeError, NodeKind};
    use crate::config::ConfigOptions;
    use crate::edit::{shell_quote, ShellEditor};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use treevault_common::SensitiveBytes;
    use treevault_crypto::KdfParams;

    struct Passwords {
        current: &'static str,
        new: &'static str,
        asked_current: usize,
        asked_new: usize,
    }

    impl Passwords {
        fn new(current: &'static str, new: &'static str) -> Self {
            Self {
                current,
                new,
                asked_current: 0,
                asked_new: 0,
            }
        }
    }

    impl PasswordSource for Passwords {
        fn current(&mut self) -> Result<Zeroizing<String>> {
            self.asked_current += 1;
            Ok(Zeroizing::new(self.current.to_string()))
        }

        fn new_password(&mut self) -> Result<Zeroizing<String>> {
            self.asked_new += 1;
            Ok(Zeroizing::new(self.new.to_string()))
        }
    }

    struct Scripted(VecDeque<Option<Vec<u8>>>);

    impl Scripted {
        /// `None` entries hand the text back untouched.
        fn new(edits: Vec<Option<&str>>) -> Self {
            Self(
                edits
                    .into_iter()
                    .map(|e| e.map(|s| s.as_bytes().to_vec()))
                    .collect(),
            )
        }

        fn untouched() -> Self {
            Self::new(vec![None])
        }
    }

    impl Editor for Scripted {
        fn edit(&mut self, text: &[u8], _kind: NodeKind) -> Result<SensitiveBytes> {
            let next = self.0.pop_front().expect("no edit left");
            Ok(SensitiveBytes::new(next.unwrap_or_else(|| text.to_vec())))
        }
    }

    struct Answers(VecDeque<bool>, Vec<DecodeError>);

    impl Answers {
        fn none() -> Self {
            Self(VecDeque::new(), Vec::new())
        }

        fn new(answers: &[bool]) -> Self {
            Self(answers.iter().copied().collect(), Vec::new())
        }
    }

    impl Confirm for Answers {
        fn retry(&mut self, error: &DecodeError) -> Result<bool> {
            self.1.push(error.clone());
            Ok(self.0.pop_front().expect("unexpected prompt"))
        }
    }

    fn config(vault: &Path, options: ConfigOptions) -> Config {
        let mut config = Config::from_options(ConfigOptions {
            vault_path: vault.to_path_buf(),
            action: "cat".to_string(),
            ..options
        })
        .unwrap();
        config.kdf = KdfParams::with_iterations(1_000);
        config
    }

    fn salted(address: &[&str]) -> ConfigOptions {
        ConfigOptions {
            salt: Some("pepper".to_string()),
            address: address.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Seal `value` into `vault` under password `pw` and salt "pepper".
    fn seed(vault: &Path, value: Value, pw: &str) {
        let key = derive_key(
            pw.as_bytes(),
            &Salt::from_bytes(b"pepper".to_vec()),
            &KdfParams::with_iterations(1_000),
        )
        .unwrap();
        let tree = VaultTree::load(&serde_json::to_vec(&value).unwrap()).unwrap();
        VaultManager::new(vault).save(&tree, &key).unwrap();
    }

    fn contents(vault: &Path, salt: &[u8], pw: &str) -> Value {
        let key = derive_key(
            pw.as_bytes(),
            &Salt::from_bytes(salt.to_vec()),
            &KdfParams::with_iterations(1_000),
        )
        .unwrap();
        let manager = VaultManager::new(vault);
        let tree = manager
            .unlock(&manager.read().unwrap().unwrap(), &key)
            .unwrap();
        Value::Object(tree.root().clone())
    }

    fn vault_in(dir: &TempDir) -> PathBuf {
        dir.path().join("vault")
    }

    #[test]
    fn test_new_vault_with_generated_salt() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        let salt_path = dir.path().join("salt");
        let config = config(
            &vault,
            ConfigOptions {
                new_salt_len: Some(12),
                new_salt_file: Some(salt_path.clone()),
                ..Default::default()
            },
        );
        let mut passwords = Passwords::new("unused", "first");

        let report = run(&config, &mut passwords, &mut Scripted::untouched(), &mut Answers::none())
            .unwrap();

        assert!(report.wrote_vault);
        assert!(!report.changed);
        assert!(report.unsaved_salt.is_none());
        assert_eq!(passwords.asked_current, 0);
        assert_eq!(passwords.asked_new, 1);

        let salt = fs::read(&salt_path).unwrap();
        assert_eq!(salt.len(), 24);
        assert!(salt.iter().all(u8::is_ascii_hexdigit));
        assert_eq!(contents(&vault, &salt, "first"), json!({}));
    }

    #[test]
    fn test_generated_salt_without_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        let config = config(
            &vault,
            ConfigOptions {
                new_salt_len: Some(4),
                ..Default::default()
            },
        );

        let report = run(
            &config,
            &mut Passwords::new("", "pw"),
            &mut Scripted::untouched(),
            &mut Answers::none(),
        )
        .unwrap();

        let salt = report.unsaved_salt.unwrap();
        assert_eq!(salt.len(), 8);
        assert_eq!(contents(&vault, salt.as_bytes(), "pw"), json!({}));
    }

    #[test]
    fn test_unchanged_edit_does_not_write() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        seed(&vault, json!({"site.com": {"user": "a", "pass": "b"}}), "pw");
        let before = fs::read(&vault).unwrap();

        let config = config(&vault, salted(&["site.com", "pass"]));
        let mut passwords = Passwords::new("pw", "unused");
        let report = run(&config, &mut passwords, &mut Scripted::untouched(), &mut Answers::none())
            .unwrap();

        assert!(!report.wrote_vault);
        assert_eq!(passwords.asked_new, 0);
        assert_eq!(fs::read(&vault).unwrap(), before);
    }

    #[test]
    fn test_edit_leaf_keeps_siblings() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        seed(
            &vault,
            json!({"site.com": {"user": "a", "pass": "b"}, "other": {"pass": "z"}}),
            "pw",
        );

        let config = config(&vault, salted(&["site.com", "pass"]));
        let report = run(
            &config,
            &mut Passwords::new("pw", "unused"),
            &mut Scripted::new(vec![Some("c\n")]),
            &mut Answers::none(),
        )
        .unwrap();

        assert!(report.changed && report.wrote_vault);
        assert_eq!(
            contents(&vault, b"pepper", "pw"),
            json!({"site.com": {"user": "a", "pass": "c"}, "other": {"pass": "z"}})
        );
    }

    #[test]
    fn test_wrong_password_is_authentication_failure() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        seed(&vault, json!({"k": "v"}), "right");
        let before = fs::read(&vault).unwrap();

        let config = config(&vault, salted(&["k"]));
        let result = run(
            &config,
            &mut Passwords::new("wrong", "unused"),
            &mut Scripted::new(vec![]),
            &mut Answers::none(),
        );

        assert!(matches!(result, Err(Error::Authentication)));
        assert_eq!(fs::read(&vault).unwrap(), before);
    }

    #[test]
    fn test_wrong_salt_is_authentication_failure() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        seed(&vault, json!({"k": "v"}), "right");

        let config = config(
            &vault,
            ConfigOptions {
                salt: Some("paprika".to_string()),
                ..Default::default()
            },
        );
        let result = run(
            &config,
            &mut Passwords::new("right", "unused"),
            &mut Scripted::new(vec![]),
            &mut Answers::none(),
        );

        assert!(matches!(result, Err(Error::Authentication)));
    }

    #[test]
    fn test_malformed_edit_then_abort() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        seed(&vault, json!({"site": {"user": "a", "pass": "b"}}), "pw");
        let before = fs::read(&vault).unwrap();

        let config = config(&vault, salted(&["site"]));
        let mut answers = Answers::new(&[false]);
        let result = run(
            &config,
            &mut Passwords::new("pw", "unused"),
            &mut Scripted::new(vec![Some("user = \"a\"\npass = = \"b\"\n")]),
            &mut answers,
        );

        assert!(matches!(result, Err(Error::Cancelled)));
        let location = answers.1[0].location.clone().unwrap();
        assert_eq!(location.line, 2);
        assert_eq!(location.source_line, "pass = = \"b\"");
        assert_eq!(fs::read(&vault).unwrap(), before);
    }

    #[test]
    fn test_salt_rotation_writes_unchanged_tree() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        seed(&vault, json!({"k": "v"}), "old");
        let salt_path = dir.path().join("new-salt");

        let config = config(
            &vault,
            ConfigOptions {
                new_salt: Some("paprika".to_string()),
                new_salt_file: Some(salt_path.clone()),
                ..salted(&[])
            },
        );
        let report = run(
            &config,
            &mut Passwords::new("old", "new"),
            &mut Scripted::untouched(),
            &mut Answers::none(),
        )
        .unwrap();

        assert!(report.wrote_vault && !report.changed);
        assert_eq!(fs::read(&salt_path).unwrap(), b"paprika");
        assert_eq!(contents(&vault, b"paprika", "new"), json!({"k": "v"}));
    }

    #[test]
    fn test_new_vault_with_existing_salt_asks_new_password() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        let config = config(&vault, salted(&["site", "pass"]));
        let mut passwords = Passwords::new("unused", "pw");

        let report = run(
            &config,
            &mut passwords,
            &mut Scripted::new(vec![Some("hunter2\n")]),
            &mut Answers::none(),
        )
        .unwrap();

        assert!(report.wrote_vault);
        assert_eq!(passwords.asked_current, 0);
        assert_eq!(passwords.asked_new, 1);
        assert_eq!(
            contents(&vault, b"pepper", "pw"),
            json!({"site": {"pass": "hunter2"}})
        );
    }

    #[test]
    fn test_existing_vault_needs_salt() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        seed(&vault, json!({}), "pw");

        let config = config(&vault, ConfigOptions::default());
        let mut passwords = Passwords::new("pw", "pw");
        let result = run(&config, &mut passwords, &mut Scripted::new(vec![]), &mut Answers::none());

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(passwords.asked_current, 0);
    }

    #[test]
    fn test_corrupt_file_is_authentication_failure() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        fs::write(&vault, b"garbage").unwrap();

        let config = config(&vault, salted(&[]));
        let result = run(
            &config,
            &mut Passwords::new("pw", ""),
            &mut Scripted::new(vec![]),
            &mut Answers::none(),
        );

        assert!(matches!(result, Err(Error::Authentication)));
        assert_eq!(fs::read(&vault).unwrap(), b"garbage");
    }

    #[test]
    fn test_whole_tree_through_shell_action() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        seed(&vault, json!({"a": {"user": "x"}}), "pw");
        let replacement = dir.path().join("replacement.toml");
        fs::write(&replacement, "[a]\nuser = \"y\"\n\n[b]\npass = \"z\"\n").unwrap();

        let config = config(&vault, salted(&[]));
        let mut editor = ShellEditor::new(
            crate::edit::Action::new(format!(
                "cp {} {{}}",
                shell_quote(&replacement.to_string_lossy())
            )),
            Some(dir.path().to_path_buf()),
        );
        run(
            &config,
            &mut Passwords::new("pw", ""),
            &mut editor,
            &mut Answers::none(),
        )
        .unwrap();

        assert_eq!(
            contents(&vault, b"pepper", "pw"),
            json!({"a": {"user": "y"}, "b": {"pass": "z"}})
        );
        // Only the vault and the replacement remain: the temp file is gone.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_new_vault_without_edit_asks_nothing() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        let config = config(&vault, salted(&[]));
        let mut passwords = Passwords::new("unused", "unused");

        let report = run(&config, &mut passwords, &mut Scripted::untouched(), &mut Answers::none())
            .unwrap();

        assert!(!report.wrote_vault);
        assert_eq!(passwords.asked_new, 0);
        assert!(!vault.exists());
    }

    #[test]
    fn test_plain_text_for_whole_tree_is_retried() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        let config = config(&vault, salted(&[]));
        let mut answers = Answers::new(&[false]);

        let result = run(
            &config,
            &mut Passwords::new("unused", "pw"),
            &mut Scripted::new(vec![Some("hunter2\n")]),
            &mut answers,
        );

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(answers.1.len(), 1);
        assert!(!vault.exists());
    }

    #[test]
    fn test_failed_save_keeps_old_salt_file() {
        let dir = TempDir::new().unwrap();
        let salt_path = dir.path().join("salt");
        fs::write(&salt_path, b"pepper\n").unwrap();
        // The vault directory does not exist, so saving the vault fails.
        let vault = dir.path().join("missing").join("vault");

        let config = config(
            &vault,
            ConfigOptions {
                salt_file: Some(salt_path.clone()),
                new_salt_len: Some(16),
                new_salt_file: Some(salt_path.clone()),
                ..Default::default()
            },
        );
        let result = run(
            &config,
            &mut Passwords::new("unused", "pw"),
            &mut Scripted::untouched(),
            &mut Answers::none(),
        );

        assert!(result.is_err());
        assert_eq!(fs::read(&salt_path).unwrap(), b"pepper\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_rotation_in_place_replaces_salt_file() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        seed(&vault, json!({"k": "v"}), "pw");
        let salt_path = dir.path().join("salt");
        fs::write(&salt_path, b"pepper").unwrap();

        let config = config(
            &vault,
            ConfigOptions {
                salt_file: Some(salt_path.clone()),
                new_salt_len: Some(16),
                new_salt_file: Some(salt_path.clone()),
                ..Default::default()
            },
        );
        let report = run(
            &config,
            &mut Passwords::new("pw", "pw"),
            &mut Scripted::untouched(),
            &mut Answers::none(),
        )
        .unwrap();

        assert!(report.unsaved_salt.is_none());
        let salt = fs::read(&salt_path).unwrap();
        assert_eq!(salt.len(), 32);
        assert_eq!(contents(&vault, &salt, "pw"), json!({"k": "v"}));
    }

    struct Interrupting;

    impl Editor for Interrupting {
        fn edit(&mut self, _text: &[u8], _kind: NodeKind) -> Result<SensitiveBytes> {
            Err(Error::Interrupted)
        }
    }

    #[test]
    fn test_interrupted_edit_leaves_vault() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        seed(&vault, json!({"k": "v"}), "pw");
        let before = fs::read(&vault).unwrap();

        let config = config(&vault, salted(&["k"]));
        let mut passwords = Passwords::new("pw", "unused");
        let result = run(&config, &mut passwords, &mut Interrupting, &mut Answers::none());

        assert!(matches!(result, Err(Error::Interrupted)));
        assert_eq!(passwords.asked_new, 0);
        assert_eq!(fs::read(&vault).unwrap(), before);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
