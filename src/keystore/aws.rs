//! # AWS Secrets Manager Key Store
//!
//! Stores each key as its own AWS Secrets Manager secret named `{prefix}{key}`,
//! with the value in the binary payload.

use super::{KeyStore, KeyStoreError};
use async_trait::async_trait;
use aws_sdk_secretsmanager::primitives::Blob;
use aws_sdk_secretsmanager::Client;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub struct AwsSecretsManagerKeyStore {
    client: Client,
    name_prefix: String,
}

impl std::fmt::Debug for AwsSecretsManagerKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretsManagerKeyStore")
            .field("name_prefix", &self.name_prefix)
            .finish_non_exhaustive()
    }
}

impl AwsSecretsManagerKeyStore {
    /// Create a key store using the default AWS credential chain (IRSA, env, profile)
    pub async fn new(region: &str, name_prefix: &str) -> Self {
        info!(
            "Using AWS Secrets Manager in region {} as key store (prefix '{}')",
            region, name_prefix
        );
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Self::from_client(Client::new(&sdk_config), name_prefix)
    }

    #[must_use]
    pub fn from_client(client: Client, name_prefix: &str) -> Self {
        Self {
            client,
            name_prefix: name_prefix.to_string(),
        }
    }

    fn secret_id(&self, key: &str) -> String {
        format!("{}{}", self.name_prefix, key)
    }
}

#[async_trait]
impl KeyStore for AwsSecretsManagerKeyStore {
    async fn get(&self, key: &str) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        let output = match self
            .client
            .get_secret_value()
            .secret_id(self.secret_id(key))
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_resource_not_found_exception() {
                    return Err(KeyStoreError::NotFound(key.to_string()));
                }
                return Err(KeyStoreError::backend(key, service_error));
            }
        };

        if let Some(binary) = output.secret_binary() {
            return Ok(Zeroizing::new(binary.as_ref().to_vec()));
        }
        if let Some(string) = output.secret_string() {
            return Ok(Zeroizing::new(string.as_bytes().to_vec()));
        }
        Err(KeyStoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KeyStoreError> {
        let result = self
            .client
            .create_secret()
            .name(self.secret_id(key))
            .secret_binary(Blob::new(value.to_vec()))
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!("stored key {} in AWS Secrets Manager", key);
                Ok(())
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_resource_exists_exception() {
                    return Err(KeyStoreError::AlreadyExists(key.to_string()));
                }
                Err(KeyStoreError::backend(key, service_error))
            }
        }
    }
}
