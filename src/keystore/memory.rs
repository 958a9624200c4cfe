//! # Memory Key Store
//!
//! Keeps keys in process memory. Nothing survives a restart, so this back-end is
//! only suitable for development servers and tests.

use super::{KeyStore, KeyStoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use zeroize::Zeroizing;

#[derive(Default)]
pub struct MemoryKeyStore {
    entries: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyStore")
            .field("keys", &self.keys())
            .finish()
    }
}

impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the stored keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Store a value, replacing any existing one
    pub fn insert(&self, key: &str, value: &[u8]) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), Zeroizing::new(value.to_vec()));
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, key: &str) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| KeyStoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KeyStoreError> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.contains_key(key) {
            return Err(KeyStoreError::AlreadyExists(key.to_string()));
        }
        entries.insert(key.to_string(), Zeroizing::new(value.to_vec()));
        Ok(())
    }
}
