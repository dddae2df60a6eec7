//! Common utilities and types shared across treevault modules.
//!
//! This module provides the error type every crate returns and the small
//! value types (addresses, sensitive buffers) that cross crate boundaries.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Address, SensitiveBytes};
