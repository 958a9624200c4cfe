//! # File Key Store
//!
//! Stores each key as a file in a local directory. Files are created with
//! `create_new`, so an existing key is never overwritten, and with mode `0600`
//! on Unix.

use super::{KeyStore, KeyStoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Debug, Clone)]
pub struct FileKeyStore {
    directory: PathBuf,
}

impl FileKeyStore {
    /// Create a store rooted at `directory`; the directory is created on first write
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, KeyStoreError> {
        // Keys become file names, reject anything that could escape the directory
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(KeyStoreError::backend(
                key,
                format!("invalid key name for file key store: '{key}'"),
            ));
        }
        Ok(self.directory.join(key))
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn get(&self, key: &str) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Zeroizing::new(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(KeyStoreError::NotFound(key.to_string())),
            Err(e) => Err(KeyStoreError::backend(key, e)),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KeyStoreError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| KeyStoreError::backend(key, e))?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = match options.open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(KeyStoreError::AlreadyExists(key.to_string()));
            }
            Err(e) => return Err(KeyStoreError::backend(key, e)),
        };

        file.write_all(value)
            .await
            .map_err(|e| KeyStoreError::backend(key, e))?;
        file.sync_all()
            .await
            .map_err(|e| KeyStoreError::backend(key, e))?;

        debug!("stored key {} in {}", key, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_roundtrip_and_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("keys"));

        assert!(store.get("vault-root").await.unwrap_err().is_not_found());

        store.set("vault-root", b"s.root").await.unwrap();
        assert_eq!(store.get("vault-root").await.unwrap().as_slice(), b"s.root");

        let err = store.set("vault-root", b"other").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::AlreadyExists(_)));
        assert_eq!(store.get("vault-root").await.unwrap().as_slice(), b"s.root");
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::new(dir.path());

        let err = store.set("../escape", b"x").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::Backend { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::new(dir.path());
        store.set("vault-unseal-0", b"key").await.unwrap();

        let mode = std::fs::metadata(dir.path().join("vault-unseal-0"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
