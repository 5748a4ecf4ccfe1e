//! Batch editor for [`StandardVault`].
//!
//! Accumulates typed puts, removals, and an optional clear-all, then
//! writes them as one batch. `apply` is fire-and-forget; `commit`
//! blocks until the batch is durable and reports success.

use std::collections::HashMap;

use tracing::warn;

use crate::errors::Result;

use super::{StandardVault, VaultValue};

pub struct VaultEditor<'a> {
    vault: &'a StandardVault,
    cleared: bool,
    removals: Vec<String>,
    bundle: HashMap<String, VaultValue>,
}

impl<'a> VaultEditor<'a> {
    pub(crate) fn new(vault: &'a StandardVault) -> Self {
        Self {
            vault,
            cleared: false,
            removals: Vec::new(),
            bundle: HashMap::new(),
        }
    }

    /// Erase every entry before applying the rest of this edit.
    pub fn clear(mut self) -> Self {
        self.cleared = true;
        self
    }

    pub fn put_string(mut self, key: &str, value: &str) -> Self {
        self.bundle
            .insert(key.to_string(), VaultValue::String(value.to_string()));
        self
    }

    pub fn put_boolean(mut self, key: &str, value: bool) -> Self {
        self.bundle
            .insert(key.to_string(), VaultValue::Boolean(value));
        self
    }

    pub fn put_int(mut self, key: &str, value: i32) -> Self {
        self.bundle.insert(key.to_string(), VaultValue::Int(value));
        self
    }

    pub fn put_long(mut self, key: &str, value: i64) -> Self {
        self.bundle.insert(key.to_string(), VaultValue::Long(value));
        self
    }

    pub fn put_float(mut self, key: &str, value: f32) -> Self {
        self.bundle.insert(key.to_string(), VaultValue::Float(value));
        self
    }

    pub fn put_string_set<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: Vec<String> = values.into_iter().map(Into::into).collect();
        self.bundle
            .insert(key.to_string(), VaultValue::StringSet(set));
        self
    }

    /// Remove `key`, dropping any put for it pending in this edit.
    pub fn remove(mut self, key: &str) -> Self {
        self.bundle.remove(key);
        self.removals.push(key.to_string());
        self
    }

    /// Persist the batch asynchronously. Failures are logged, not
    /// reported; use [`VaultEditor::commit`] when the caller needs the
    /// outcome.
    pub fn apply(self) {
        match self
            .vault
            .write_values(false, self.cleared, &self.removals, &self.bundle)
        {
            Ok(true) => {}
            Ok(false) => warn!("vault edit dropped (no key or store rejected the batch)"),
            Err(e) => warn!(error = %e, "vault edit failed"),
        }
    }

    /// Persist the batch and block until it is durable. `Ok(false)`
    /// means no key was available or the store rejected the write; in
    /// strict mode encryption failures surface as errors.
    pub fn commit(self) -> Result<bool> {
        self.vault
            .write_values(true, self.cleared, &self.removals, &self.bundle)
    }
}
