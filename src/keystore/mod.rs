//! # Key Store
//!
//! Storage for unseal keys, recovery keys and the root token.
//!
//! Each back-end implements the [`KeyStore`] trait. The operator never overwrites an
//! existing key: "set if absent" is built on top of `get` by checking for
//! [`KeyStoreError::NotFound`] first (see [`set_if_absent`]).
//!
//! Back-ends:
//! - [`KubernetesKeyStore`] - entries of a single Kubernetes `Secret`
//! - [`AwsSecretsManagerKeyStore`] - one AWS Secrets Manager secret per key
//! - [`FileKeyStore`] - one file per key in a local directory
//! - [`MemoryKeyStore`] - process memory, for embedding and tests

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

pub mod aws;
pub mod file;
pub mod kubernetes;
pub mod memory;

pub use aws::AwsSecretsManagerKeyStore;
pub use file::FileKeyStore;
pub use kubernetes::KubernetesKeyStore;
pub use memory::MemoryKeyStore;

/// Errors returned by key store back-ends
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// The key does not exist. This is a normal control-flow signal.
    #[error("key '{0}' not found")]
    NotFound(String),

    /// The key already exists and cannot be overwritten
    #[error("key '{0}' already exists")]
    AlreadyExists(String),

    /// The back-end could not be reached or rejected the request
    #[error("key store error for key '{key}': {source}")]
    Backend {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl KeyStoreError {
    /// Wrap a back-end failure for `key`
    pub fn backend(
        key: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        KeyStoreError::Backend {
            key: key.to_string(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyStoreError::NotFound(_))
    }
}

/// Key-value store for key material
///
/// Values returned by `get` are wrapped in [`Zeroizing`] so they are wiped when the
/// caller drops them.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Zeroizing<Vec<u8>>, KeyStoreError>;

    /// Store `value` under `key`
    ///
    /// Back-ends that can detect it return [`KeyStoreError::AlreadyExists`] when the
    /// key is already present.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KeyStoreError>;
}

/// Deterministic names of the keys written to the key store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNames {
    prefix: String,
}

impl Default for KeyNames {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_KEY_PREFIX)
    }
}

impl KeyNames {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Name of unseal key share `i`, e.g. `vault-unseal-0`
    #[must_use]
    pub fn unseal_key(&self, i: usize) -> String {
        format!("{}unseal-{i}", self.prefix)
    }

    /// Name of recovery key share `i`, e.g. `vault-recovery-0`
    #[must_use]
    pub fn recovery_key(&self, i: usize) -> String {
        format!("{}recovery-{i}", self.prefix)
    }

    /// Name of the root token key, e.g. `vault-root`
    #[must_use]
    pub fn root_token(&self) -> String {
        format!("{}root", self.prefix)
    }

    /// Name of the key used by the pre-flight check, e.g. `vault-test`
    #[must_use]
    pub fn test_key(&self) -> String {
        format!("{}test", self.prefix)
    }
}

/// Check whether `key` is absent from the store
///
/// Returns `Ok(true)` on [`KeyStoreError::NotFound`], `Ok(false)` when the key exists,
/// and the store error otherwise.
pub async fn key_not_found(store: &dyn KeyStore, key: &str) -> Result<bool, KeyStoreError> {
    match store.get(key).await {
        Ok(_) => Ok(false),
        Err(KeyStoreError::NotFound(_)) => Ok(true),
        Err(e) => Err(e),
    }
}

/// Store `value` under `key` only if the key does not exist yet
///
/// # Errors
/// Returns [`KeyStoreError::AlreadyExists`] if the key is present, or the store error
/// if its existence cannot be determined or the write fails.
pub async fn set_if_absent(
    store: &dyn KeyStore,
    key: &str,
    value: &[u8],
) -> Result<(), KeyStoreError> {
    if key_not_found(store, key).await? {
        store.set(key, value).await
    } else {
        Err(KeyStoreError::AlreadyExists(key.to_string()))
    }
}

/// Round-trip probe of the key store
///
/// Reads `key` (a missing key is fine) and writes the key name as value if it is
/// absent. Fails on any other error, so an unreachable or read-only store is
/// detected before Vault is initialized.
pub async fn probe(store: &dyn KeyStore, key: &str) -> Result<(), KeyStoreError> {
    if key_not_found(store, key).await? {
        debug!("probe key {} not found, writing it", key);
        store.set(key, key.as_bytes()).await
    } else {
        debug!("probe key {} already present", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        let names = KeyNames::default();
        assert_eq!(names.unseal_key(0), "vault-unseal-0");
        assert_eq!(names.recovery_key(4), "vault-recovery-4");
        assert_eq!(names.root_token(), "vault-root");
        assert_eq!(names.test_key(), "vault-test");
    }

    #[test]
    fn test_key_names_custom_prefix() {
        let names = KeyNames::new("");
        assert_eq!(names.unseal_key(2), "unseal-2");
        assert_eq!(names.root_token(), "root");
    }

    #[tokio::test]
    async fn test_set_if_absent_refuses_overwrite() {
        let store = MemoryKeyStore::new();
        set_if_absent(&store, "vault-root", b"first").await.unwrap();

        let err = set_if_absent(&store, "vault-root", b"second")
            .await
            .unwrap_err();
        assert!(matches!(err, KeyStoreError::AlreadyExists(_)));
        assert_eq!(store.get("vault-root").await.unwrap().as_slice(), b"first");
    }

    #[tokio::test]
    async fn test_probe_is_repeatable() {
        let store = MemoryKeyStore::new();
        probe(&store, "vault-test").await.unwrap();
        probe(&store, "vault-test").await.unwrap();
        assert_eq!(store.get("vault-test").await.unwrap().as_slice(), b"vault-test");
    }
}
