//! # Kubernetes Key Store
//!
//! Stores keys as data entries of a single Kubernetes `Secret`.
//!
//! The Secret is created on the first write. Later keys are added with a JSON merge
//! patch, so concurrent writers only ever touch their own entry.

use super::{KeyStore, KeyStoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub struct KubernetesKeyStore {
    api: Api<Secret>,
    namespace: String,
    secret_name: String,
}

impl std::fmt::Debug for KubernetesKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubernetesKeyStore")
            .field("namespace", &self.namespace)
            .field("secret_name", &self.secret_name)
            .finish_non_exhaustive()
    }
}

impl KubernetesKeyStore {
    #[must_use]
    pub fn new(client: Client, namespace: &str, secret_name: &str) -> Self {
        info!(
            "Using Kubernetes Secret {}/{} as key store",
            namespace, secret_name
        );
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            secret_name: secret_name.to_string(),
        }
    }

    async fn read_secret(&self, key: &str) -> Result<Option<Secret>, KeyStoreError> {
        match self.api.get(&self.secret_name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
            Err(e) => Err(KeyStoreError::backend(key, e)),
        }
    }

    async fn create_secret(&self, key: &str, value: &[u8]) -> Result<(), KeyStoreError> {
        let mut data = BTreeMap::new();
        data.insert(key.to_string(), ByteString(value.to_vec()));

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(self.secret_name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };

        match self.api.create(&PostParams::default(), &secret).await {
            Ok(_) => {
                debug!("created secret {} with key {}", self.secret_name, key);
                Ok(())
            }
            // Another writer created the Secret in the meantime, fall back to a patch
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                self.patch_entry(key, value).await
            }
            Err(e) => Err(KeyStoreError::backend(key, e)),
        }
    }

    async fn patch_entry(&self, key: &str, value: &[u8]) -> Result<(), KeyStoreError> {
        let patch = serde_json::json!({
            "data": { key: ByteString(value.to_vec()) }
        });
        self.api
            .patch(&self.secret_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| KeyStoreError::backend(key, e))?;
        debug!("added key {} to secret {}", key, self.secret_name);
        Ok(())
    }
}

#[async_trait]
impl KeyStore for KubernetesKeyStore {
    async fn get(&self, key: &str) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        let secret = self
            .read_secret(key)
            .await?
            .ok_or_else(|| KeyStoreError::NotFound(key.to_string()))?;

        secret
            .data
            .and_then(|mut data| data.remove(key))
            .map(|value| Zeroizing::new(value.0))
            .ok_or_else(|| KeyStoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KeyStoreError> {
        match self.read_secret(key).await? {
            None => self.create_secret(key, value).await,
            Some(secret) => {
                let exists = secret
                    .data
                    .as_ref()
                    .is_some_and(|data| data.contains_key(key));
                if exists {
                    return Err(KeyStoreError::AlreadyExists(key.to_string()));
                }
                self.patch_entry(key, value).await
            }
        }
    }
}
