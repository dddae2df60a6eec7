//! Vault engine for treevault.
//!
//! This module provides:
//! - The decrypted tree and its auto-vivifying addresses
//! - The text codec used to present one node for editing
//! - External editor sessions with retry on malformed edits
//! - Atomic persistence of the encrypted vault
//!
//! # Architecture
//! [`operations::run`] drives one invocation. Passwords, the editor and the
//! retry prompt are traits so the command line and tests can plug in their own.

pub mod codec;
pub mod config;
pub mod edit;
pub mod interrupt;
pub mod manager;
pub mod operations;
pub mod persist;
pub mod session;
pub mod tree;

pub use codec::{decode, encode, DecodeError, Location, NodeKind};
pub use config::{Config, ConfigOptions, NewSalt, NewSaltSource, SaltSource};
pub use edit::{Action, Editor, ShellEditor};
pub use manager::VaultManager;
pub use operations::{run, PasswordSource, Report};
pub use session::{edit_node, Confirm, EditOutcome, SessionOptions};
pub use tree::{Node, VaultTree};
