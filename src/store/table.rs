//! Store implementation
//!
//! HashMap-based store with RwLock for concurrency.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::error::{LedgerError, Result};

/// In-memory key-value map
#[derive(Debug, Default)]
pub struct Store {
    data: RwLock<HashMap<String, String>>,
}

impl Store {
    /// Create a new empty Store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key (read lock)
    ///
    /// Returns `KeyNotFound` if the key is absent.
    pub fn get(&self, key: &str) -> Result<String> {
        self.data
            .read()
            .get(key)
            .cloned()
            .ok_or(LedgerError::KeyNotFound)
    }

    /// Put a key-value pair (write lock)
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Delete a key (write lock); deleting an absent key succeeds
    pub fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.data.write().remove(key);
        Ok(())
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Sorted copy of the current contents
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(LedgerError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}
