//! # Secret Resolver
//!
//! Resolves `secretKeyRef` entries of startup secrets against Kubernetes Secrets.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

/// Source of values referenced by `{name, key}` pairs
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Value of `key` in the secret object `name`
    async fn resolve(&self, name: &str, key: &str) -> Result<String>;
}

/// Reads Kubernetes Secrets of a single namespace
pub struct KubeSecretResolver {
    api: Api<Secret>,
    namespace: String,
}

impl std::fmt::Debug for KubeSecretResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretResolver")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeSecretResolver {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl SecretResolver for KubeSecretResolver {
    async fn resolve(&self, name: &str, key: &str) -> Result<String> {
        let secret = self
            .api
            .get(name)
            .await
            .with_context(|| format!("error reading secret {}/{}", self.namespace, name))?;

        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .ok_or_else(|| {
                anyhow!("key '{}' not found in secret {}/{}", key, self.namespace, name)
            })?;

        String::from_utf8(value.0.clone())
            .with_context(|| format!("key '{key}' of secret {}/{name} is not valid UTF-8", self.namespace))
    }
}
