//! # Reconciler
//!
//! Brings the live Vault configuration in line with a [`DesiredConfigDocument`].
//!
//! Every step reads the live state first and only writes what is missing or
//! different, so a configure run can be repeated against a Vault that was already
//! configured, partly or fully, by this operator or by someone else.
//!
//! Steps run in a fixed order:
//! auth methods, policies, secret engines, plugins, audit devices, startup secrets,
//! identity groups and group aliases.
//!
//! With `purgeUnmanagedConfig` enabled, the auth, policy and secret engine steps
//! also remove what exists in Vault but not in the document.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::keystore::{KeyNames, KeyStore};
use crate::observability::metrics;
use crate::vault::{Secret, TokenGuard, VaultAdmin, VaultError};

pub mod audit;
pub mod auth;
pub mod document;
pub mod identity;
pub mod plugins;
pub mod policies;
pub mod resolver;
pub mod secrets;
pub mod startup_secrets;

pub use document::{
    AuthMethod, DesiredConfigDocument, Policy, PurgeExclusions, PurgeUnmanagedConfig, Record,
    SecretEngine,
};
pub use resolver::{KubeSecretResolver, SecretResolver};

/// Applies a desired configuration document using the root token from the key store
pub struct Configurator {
    key_store: Arc<dyn KeyStore>,
    vault: Arc<dyn VaultAdmin>,
    key_names: KeyNames,
    resolver: Option<Arc<dyn SecretResolver>>,
}

impl std::fmt::Debug for Configurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configurator")
            .field("key_names", &self.key_names)
            .field("resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl Configurator {
    #[must_use]
    pub fn new(key_store: Arc<dyn KeyStore>, vault: Arc<dyn VaultAdmin>) -> Self {
        Self {
            key_store,
            vault,
            key_names: KeyNames::default(),
            resolver: None,
        }
    }

    #[must_use]
    pub fn with_key_names(mut self, key_names: KeyNames) -> Self {
        self.key_names = key_names;
        self
    }

    /// Resolver for `secretKeyRef` entries of startup secrets
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn SecretResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Apply `document` to Vault
    ///
    /// The root token is set on the client for the duration of the call and
    /// cleared again on every exit path.
    ///
    /// # Errors
    /// Fails when the root token cannot be read or any step fails; the error names
    /// the configuration category.
    pub async fn configure(&self, document: &DesiredConfigDocument) -> Result<()> {
        let start = Instant::now();
        let result = self.run_configure(document).await;
        metrics::record_operation("configure", &result);
        metrics::observe_configure_duration(start.elapsed().as_secs_f64());
        result
    }

    async fn run_configure(&self, document: &DesiredConfigDocument) -> Result<()> {
        debug!("retrieving root token from key store");
        let key = self.key_names.root_token();
        let root_token = self
            .key_store
            .get(&key)
            .await
            .with_context(|| format!("unable to get key '{key}'"))?;
        let root_token = std::str::from_utf8(&root_token)
            .with_context(|| format!("key '{key}' is not valid UTF-8"))?;

        let vault = self.vault.as_ref();
        let _token = TokenGuard::new(vault, root_token);

        let purge = &document.purge_unmanaged_config;

        auth::configure_auth_methods(vault, &document.auth)
            .await
            .context("error configuring auth methods for vault")?;
        if purge.purges_auth() {
            auth::purge_unmanaged_auth_methods(vault, &document.auth)
                .await
                .context("error purging unmanaged auth methods from vault")?;
        }

        policies::configure_policies(vault, &document.policies)
            .await
            .context("error configuring policies for vault")?;
        if purge.purges_policies() {
            policies::purge_unmanaged_policies(vault, &document.policies)
                .await
                .context("error purging unmanaged policies from vault")?;
        }

        secrets::configure_secrets_engines(vault, &document.secrets)
            .await
            .context("error configuring secret engines for vault")?;
        if purge.purges_secrets() {
            secrets::purge_unmanaged_secrets_engines(vault, &document.secrets)
                .await
                .context("error purging unmanaged secret engines from vault")?;
        }

        plugins::configure_plugins(vault, &document.plugins)
            .await
            .context("error configuring plugins for vault")?;

        audit::configure_audit_devices(vault, &document.audit)
            .await
            .context("error configuring audit devices for vault")?;

        startup_secrets::configure_startup_secrets(
            vault,
            self.resolver.as_deref(),
            &document.startup_secrets,
        )
        .await
        .context("error writing startup secrets to vault")?;

        identity::configure_identity_groups(vault, &document.groups, &document.group_aliases)
            .await
            .context("error writing groups configurations for vault")?;

        info!("vault configured");
        Ok(())
    }
}

/// Logical write that logs the warnings Vault returns
pub(crate) async fn write_with_warning_check(
    vault: &dyn VaultAdmin,
    path: &str,
    data: &Map<String, Value>,
) -> Result<Option<Secret>, VaultError> {
    let secret = vault.write(path, data).await?;
    if let Some(secret) = &secret {
        for warning in secret.warnings() {
            warn!(path, "{}", warning);
        }
    }
    Ok(secret)
}
