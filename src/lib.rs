//! Encrypted, persistent key-value vault for sensitive application
//! data.
//!
//! Values are AES-256-CBC encrypted before they reach the (untrusted)
//! backing store. The symmetric key's own protection adapts to the
//! host: wrapped by a key pair in the secure hardware module where one
//! works, by an obfuscating software wrap otherwise, or held in memory
//! only. When a host gains hardware capability, the key migrates
//! automatically.
//!
//! Start at [`factory`] to build a vault, [`vault::StandardVault`] for
//! the read/write surface, and [`registry::VaultRegistry`] to enforce
//! namespace uniqueness across an application.

pub mod crypto;
pub mod errors;
pub mod factory;
pub mod hardware;
pub mod keys;
pub mod registry;
pub mod salt;
pub mod store;
pub mod vault;

pub use errors::{Result, VaultError};
