//! # Lifecycle
//!
//! One-time bootstrap of a Vault server: init, unseal, raft join and the status
//! queries built on top of the admin API.
//!
//! Init is the only place where key shares are generated. They are written to the
//! key store exactly once, under the names produced by [`KeyNames`], and never
//! regenerated: a second init against an initialized server is a no-op.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::config::{BootstrapConfig, PodEnvironment};
use crate::constants::{DEFAULT_HEALTH_CHECK_TIMEOUT_SECS, ROOT_POLICY, ROOT_TOKEN_DISPLAY_NAME};
use crate::error::OperatorError;
use crate::keystore::{self, KeyNames, KeyStore, KeyStoreError};
use crate::observability::metrics;
use crate::vault::{InitRequest, InitResponse, RaftJoinRequest, TokenCreateRequest, TokenGuard, VaultAdmin};

pub mod wait;

pub use wait::{Sleeper, TokioSleeper, WaitPolicy};

/// Drives the bootstrap protocol of a single Vault server
pub struct Bootstrapper {
    key_store: Arc<dyn KeyStore>,
    vault: Arc<dyn VaultAdmin>,
    config: BootstrapConfig,
    key_names: KeyNames,
    pod: PodEnvironment,
    wait_policy: WaitPolicy,
    sleeper: Arc<dyn Sleeper>,
    health_check_timeout: Duration,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("config", &self.config)
            .field("key_names", &self.key_names)
            .field("wait_policy", &self.wait_policy)
            .finish_non_exhaustive()
    }
}

impl Bootstrapper {
    #[must_use]
    pub fn new(
        key_store: Arc<dyn KeyStore>,
        vault: Arc<dyn VaultAdmin>,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            key_store,
            vault,
            config,
            key_names: KeyNames::default(),
            pod: PodEnvironment::default(),
            wait_policy: WaitPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            health_check_timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS),
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_key_names(mut self, key_names: KeyNames) -> Self {
        self.key_names = key_names;
        self
    }

    #[must_use]
    pub fn with_pod_environment(mut self, pod: PodEnvironment) -> Self {
        self.pod = pod;
        self
    }

    #[must_use]
    pub fn with_wait_policy(mut self, wait_policy: WaitPolicy) -> Self {
        self.wait_policy = wait_policy;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = timeout;
        self
    }

    /// Cancel the post-init wait loop and the unseal daemon loop with `shutdown`
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    #[must_use]
    pub fn key_names(&self) -> &KeyNames {
        &self.key_names
    }

    /// Initialize Vault if it is not initialized already
    ///
    /// # Errors
    /// Fails before calling Vault when the key store is unusable or any key about to
    /// be written already exists. Fails after calling Vault with
    /// [`OperatorError::PartialPersistence`] when not every key share was stored.
    pub async fn init(&self) -> Result<()> {
        let result = self.run_init().await;
        metrics::record_operation("init", &result);
        result
    }

    async fn run_init(&self) -> Result<()> {
        let initialized = self
            .vault
            .init_status()
            .await
            .context("error testing if vault is initialized")?;
        if initialized {
            info!("vault is already initialized");
            return Ok(());
        }

        info!("initializing vault");

        if self.config.pre_flight_checks() {
            keystore::probe(self.key_store.as_ref(), &self.key_names.test_key())
                .await
                .context("error testing keystore before init")?;
        }

        self.check_keys_absent().await?;

        let shares = self.config.secret_shares();
        let threshold = self.config.secret_threshold();
        let response = self
            .vault
            .init(&InitRequest {
                secret_shares: shares,
                secret_threshold: threshold,
                recovery_shares: shares,
                recovery_threshold: threshold,
            })
            .await
            .context("error initializing vault")?;

        self.store_key_shares(&response).await?;

        let root_token = match self.config.init_root_token() {
            Some(fixed) => {
                if let Err(e) = self.setup_fixed_root_token(&response.root_token, fixed).await {
                    return Err(self.keep_generated_root_token(&response.root_token, e).await);
                }
                Zeroizing::new(fixed.to_string())
            }
            None => Zeroizing::new(response.root_token.clone()),
        };

        if self.config.store_root_token() {
            let key = self.key_names.root_token();
            keystore::set_if_absent(self.key_store.as_ref(), &key, root_token.as_bytes())
                .await
                .with_context(|| format!("error storing root token in key '{key}'"))?;
            info!(key = %key, "root token stored in key store");
        } else if self.config.init_root_token().is_none() {
            warn!(
                root_token = %response.root_token.as_str(),
                "won't store root token in key store, this token grants full privileges to vault, so keep this secret"
            );
        }

        Ok(())
    }

    /// Fail if the root token key or any unseal key about to be written exists
    async fn check_keys_absent(&self) -> Result<()> {
        let shares = self.config.secret_shares() as usize;
        let keys = std::iter::once(self.key_names.root_token())
            .chain((0..shares).map(|i| self.key_names.unseal_key(i)));

        for key in keys {
            let absent = keystore::key_not_found(self.key_store.as_ref(), &key)
                .await
                .with_context(|| format!("error before init: checking key '{key}' failed"))?;
            if !absent {
                return Err(OperatorError::KeyConflict(key)).context("error before init");
            }
        }

        Ok(())
    }

    /// Store every unseal and recovery share, reporting all failures at once
    async fn store_key_shares(&self, response: &InitResponse) -> Result<()> {
        let unseal = response
            .keys
            .iter()
            .enumerate()
            .map(|(i, k)| (self.key_names.unseal_key(i), k));
        let recovery = response
            .recovery_keys
            .iter()
            .enumerate()
            .map(|(i, k)| (self.key_names.recovery_key(i), k));

        let mut stored = Vec::new();
        let mut failed = Vec::new();
        for (key, value) in unseal.chain(recovery) {
            match keystore::set_if_absent(self.key_store.as_ref(), &key, value.as_bytes()).await {
                Ok(()) => {
                    info!(key = %key, "key stored in key store");
                    stored.push(key);
                }
                Err(e) => {
                    error!(key = %key, error = %e, "error storing key in key store");
                    failed.push(key);
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(OperatorError::PartialPersistence { stored, failed })
                .context("vault is initialized but its keys are incomplete in the key store")
        }
    }

    /// Replace the generated root token with the configured one
    async fn setup_fixed_root_token(&self, generated: &str, fixed: &str) -> Result<()> {
        info!("setting up init root token, waiting for vault to be unsealed");
        self.wait_for_unseal().await?;

        let _token = TokenGuard::new(self.vault.as_ref(), generated);

        self.vault
            .create_orphan_token(&TokenCreateRequest {
                id: fixed.to_string(),
                policies: vec![ROOT_POLICY.to_string()],
                display_name: ROOT_TOKEN_DISPLAY_NAME.to_string(),
                no_parent: true,
            })
            .await
            .context("error creating requested root token")?;

        self.vault
            .revoke_self()
            .await
            .context("unable to revoke temporary root token")?;

        Ok(())
    }

    /// Make sure the generated root token survives a failed fixed token setup
    ///
    /// Vault is initialized at this point, so the generated token is the only way
    /// in. It goes to the key store when root token storage is enabled, otherwise
    /// (or when storing fails) into the returned error.
    async fn keep_generated_root_token(&self, generated: &str, err: anyhow::Error) -> anyhow::Error {
        if self.config.store_root_token() {
            let key = self.key_names.root_token();
            match keystore::set_if_absent(self.key_store.as_ref(), &key, generated.as_bytes()).await {
                Ok(()) => {
                    warn!(key = %key, "init root token setup failed, generated root token stored in key store");
                    return err.context(format!(
                        "unable to setup requested root token, generated root token stored in key '{key}'"
                    ));
                }
                Err(e) => error!(key = %key, error = %e, "error storing generated root token in key store"),
            }
        }

        err.context(format!(
            "unable to setup requested root token (temporary root token: '{generated}')"
        ))
    }

    /// Poll the seal status until Vault reports unsealed
    ///
    /// Status errors count as "still sealed".
    async fn wait_for_unseal(&self) -> Result<()> {
        let attempts = self.wait_policy.max_attempts;
        for attempt in 1..=attempts {
            match self.vault.seal_status().await {
                Ok(status) if !status.sealed => return Ok(()),
                Ok(_) => info!(attempt, "vault still sealed, wait for unsealing"),
                Err(e) => info!(attempt, "vault not reachable: {}", e),
            }

            if attempt == attempts {
                break;
            }

            tokio::select! {
                () = self.sleeper.sleep(self.wait_policy.interval) => {}
                () = self.shutdown.cancelled() => {
                    return Err(OperatorError::Cancelled("vault to be unsealed").into());
                }
            }
        }

        Err(OperatorError::WaitExhausted {
            what: "vault to be unsealed",
            attempts,
        }
        .into())
    }

    /// Unseal Vault with the shares from the key store
    ///
    /// Submits shares `0, 1, 2, ...` until Vault reports unsealed. A missing share
    /// fails immediately, as does a response with zero progress, which is how
    /// Vault rejects a bad share.
    ///
    /// # Errors
    /// Returns [`OperatorError::BadUnsealKey`] when the progress is reset.
    pub async fn unseal(&self) -> Result<()> {
        let result = self.run_unseal().await;
        metrics::record_operation("unseal", &result);
        result
    }

    async fn run_unseal(&self) -> Result<()> {
        let mut i = 0;
        loop {
            let key_id = self.key_names.unseal_key(i);

            debug!(key = %key_id, "retrieving key from key store");
            let key = self
                .key_store
                .get(&key_id)
                .await
                .with_context(|| format!("unable to get key '{key_id}'"))?;
            let key = std::str::from_utf8(&key)
                .with_context(|| format!("key '{key_id}' is not valid UTF-8"))?;

            debug!("sending unseal request to vault");
            metrics::increment_unseal_attempts();
            let status = self
                .vault
                .unseal(key)
                .await
                .context("fail to send unseal request to vault")?;

            debug!(
                progress = status.progress,
                threshold = status.t,
                "got unseal response"
            );

            if !status.sealed {
                info!("vault unsealed");
                return Ok(());
            }

            if status.progress == 0 {
                return Err(OperatorError::BadUnsealKey(key_id).into());
            }

            i += 1;
        }
    }

    /// Join the raft cluster led by `leader_addr`
    ///
    /// With a leader address (raft storage) an initialized server is left alone.
    /// Without one (raft HA storage only) the `-0` replica is assumed to be the
    /// first node and skips the join. This does not cover multi-datacenter setups.
    ///
    /// # Errors
    /// Fails when the CA certificate cannot be read, the request fails, or Vault
    /// reports it has not joined.
    pub async fn raft_join(&self, leader_addr: Option<&str>) -> Result<()> {
        let result = self.run_raft_join(leader_addr).await;
        metrics::record_operation("raft_join", &result);
        result
    }

    async fn run_raft_join(&self, leader_addr: Option<&str>) -> Result<()> {
        let leader_addr = leader_addr.filter(|addr| !addr.is_empty());

        if leader_addr.is_some() {
            let initialized = self
                .vault
                .init_status()
                .await
                .context("error testing if vault is initialized")?;
            if initialized {
                info!("vault is already initialized, skipping raft join");
                return Ok(());
            }
        } else if self.pod.is_first_replica() {
            debug!("first replica in raft ha_storage mode, skipping raft join");
            return Ok(());
        }

        let leader_ca_cert = match &self.pod.raft_ca_cert_path {
            Some(path) => Some(tokio::fs::read_to_string(path).await.with_context(|| {
                format!("error reading vault raft CA certificate {}", path.display())
            })?),
            None => None,
        };

        let response = self
            .vault
            .raft_join(&RaftJoinRequest {
                leader_api_addr: leader_addr.unwrap_or_default().to_string(),
                leader_ca_cert,
            })
            .await
            .context("error joining raft cluster")?;

        if response.joined {
            info!("vault joined raft cluster");
            Ok(())
        } else {
            Err(OperatorError::Remote {
                operation: "raft join",
                message: "vault hasn't joined raft cluster".to_string(),
            }
            .into())
        }
    }

    /// Whether Vault is sealed
    pub async fn sealed(&self) -> Result<bool> {
        let status = self
            .vault
            .seal_status()
            .await
            .context("error checking status")?;
        Ok(status.sealed)
    }

    /// Whether this node is the active one
    ///
    /// Any status other than 200 from the health endpoint is an error, not "inactive".
    pub async fn active(&self) -> Result<bool> {
        let status = tokio::time::timeout(self.health_check_timeout, self.vault.health_status())
            .await
            .context("timed out checking status")?
            .context("error checking status")?;

        if status == 200 {
            Ok(true)
        } else {
            Err(OperatorError::Remote {
                operation: "health check",
                message: format!("error unexpected status code: {status}"),
            }
            .into())
        }
    }

    /// Whether this node is the cluster leader
    pub async fn leader(&self) -> Result<bool> {
        let leader = self
            .vault
            .leader()
            .await
            .context("error checking leader")?;
        Ok(leader.is_self)
    }

    /// API address of the cluster leader
    pub async fn leader_address(&self) -> Result<String> {
        let leader = self
            .vault
            .leader()
            .await
            .context("error checking leader address")?;
        Ok(leader.leader_address)
    }

    /// Whether bootstrap completed from this operator's point of view
    ///
    /// True when the root token key is present and non-empty in the key store,
    /// regardless of Vault's own init flag.
    pub async fn raft_initialized(&self) -> Result<bool> {
        let key = self.key_names.root_token();
        match self.key_store.get(&key).await {
            Ok(token) => Ok(!token.is_empty()),
            Err(KeyStoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("unable to get key '{key}'")),
        }
    }

    /// Keep Vault unsealed until shutdown
    ///
    /// Checks the seal state every `period` and unseals when sealed. Failures are
    /// logged and retried on the next tick. `observe` receives every seal state
    /// that could be determined.
    pub async fn run_unseal_loop<F>(&self, period: Duration, observe: F)
    where
        F: Fn(bool) + Send + Sync,
    {
        let mut ticker = tokio::time::interval(period);
        info!(period_secs = period.as_secs(), "unseal loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(sealed) = self.unseal_tick().await {
                        observe(sealed);
                    }
                }
                () = self.shutdown.cancelled() => {
                    info!("unseal loop received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn unseal_tick(&self) -> Option<bool> {
        match self.sealed().await {
            Ok(false) => {
                debug!("vault is unsealed");
                Some(false)
            }
            Ok(true) => {
                info!("vault is sealed, unsealing");
                match self.unseal().await {
                    Ok(()) => Some(false),
                    Err(e) => {
                        error!(error = %format!("{e:#}"), "error unsealing vault");
                        Some(true)
                    }
                }
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "error checking if vault is sealed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::MemoryKeyStore;
    use crate::vault::HttpVaultClient;

    fn bootstrapper(store: Arc<MemoryKeyStore>) -> Bootstrapper {
        let vault = Arc::new(
            HttpVaultClient::new("http://127.0.0.1:1", Duration::from_millis(100), None).unwrap(),
        );
        let config = BootstrapConfig::new(1, 1, None, false, false).unwrap();
        Bootstrapper::new(store, vault, config)
    }

    #[tokio::test]
    async fn test_raft_initialized_reads_root_key() {
        let store = Arc::new(MemoryKeyStore::new());
        let bootstrapper = bootstrapper(store.clone());
        assert!(!bootstrapper.raft_initialized().await.unwrap());

        store.insert("vault-root", b"");
        assert!(!bootstrapper.raft_initialized().await.unwrap());

        store.insert("vault-root", b"s.root");
        assert!(bootstrapper.raft_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_raft_join_skipped_on_first_replica() {
        let bootstrapper = bootstrapper(Arc::new(MemoryKeyStore::new())).with_pod_environment(
            PodEnvironment {
                pod_name: Some("vault-0".to_string()),
                ..Default::default()
            },
        );
        // No server is listening, so any request would fail
        bootstrapper.raft_join(None).await.unwrap();
    }
}
