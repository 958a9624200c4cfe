//! Common test utilities
//!
//! An in-memory Vault that records every call made through [`VaultAdmin`], plus
//! key store and sleeper doubles for the lifecycle tests, and the rustls setup.

#![allow(dead_code, reason = "each test crate uses a different subset of the helpers")]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, Once};
use std::time::Duration;
use zeroize::Zeroizing;

use vault_bootstrap::keystore::{KeyStore, KeyStoreError, MemoryKeyStore};
use vault_bootstrap::lifecycle::Sleeper;
use vault_bootstrap::vault::{
    AuditDevice, EnableAuditOptions, InitRequest, InitResponse, LeaderResponse, MountInput,
    MountOutput, RaftJoinRequest, RaftJoinResponse, RegisterPluginInput, SealStatus, Secret,
    TokenCreateRequest, VaultAdmin, VaultError,
};

static RUSTLS_INIT: Once = Once::new();

/// Install the ring crypto provider once per test binary, as `main` does
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

pub fn record(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn status_error(operation: &str, status: u16) -> VaultError {
    VaultError::Status {
        operation: operation.to_string(),
        status,
        errors: vec!["fake failure".to_string()],
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub token: String,

    pub initialized: bool,
    pub init_requests: Vec<InitRequest>,
    pub init_response: InitResponse,

    /// Returned by `seal_status`, the last entry repeats
    pub seal_status: VecDeque<Result<SealStatus, u16>>,
    /// Returned by `unseal`, one per call
    pub unseal_responses: VecDeque<SealStatus>,
    pub unseal_keys: Vec<String>,

    pub health_status: u16,
    pub health_delay: Option<Duration>,
    pub leader: LeaderResponse,
    pub raft_joined: bool,
    pub raft_join_requests: Vec<RaftJoinRequest>,

    pub auth_mounts: BTreeMap<String, MountOutput>,
    pub secret_mounts: BTreeMap<String, MountOutput>,
    pub audit_devices: BTreeMap<String, AuditDevice>,
    pub enabled_auth: Vec<(String, MountInput)>,
    pub disabled_auth: Vec<String>,
    pub mounted: Vec<(String, MountInput)>,
    pub unmounted: Vec<String>,
    pub tuned: Vec<(String, Map<String, Value>)>,
    pub enabled_audit: Vec<(String, EnableAuditOptions)>,
    pub plugin_lists: u32,
    pub registered_plugins: Vec<RegisterPluginInput>,

    pub policies: BTreeMap<String, String>,
    pub put_policies: Vec<String>,
    pub deleted_policies: Vec<String>,

    pub logical: BTreeMap<String, Map<String, Value>>,
    /// Every logical write with the token set at the time
    pub writes: Vec<(String, Map<String, Value>, String)>,
    pub write_warnings: Vec<String>,
    pub fail_writes_to: Option<String>,
    pub next_id: u32,

    pub orphan_tokens: Vec<TokenCreateRequest>,
    pub orphan_token_caller: Vec<String>,
    pub revoked_tokens: Vec<String>,
}

/// In-memory Vault
#[derive(Debug, Default)]
pub struct FakeVault {
    state: Mutex<FakeState>,
}

impl FakeVault {
    pub fn new() -> Self {
        let vault = Self::default();
        {
            let mut state = vault.state();
            state.health_status = 200;
            state.raft_joined = true;
            state.seal_status.push_back(Ok(SealStatus {
                sealed: false,
                ..Default::default()
            }));
        }
        vault
    }

    /// Uninitialized Vault answering init with `shares` keys and recovery keys
    pub fn uninitialized(shares: usize) -> Self {
        let vault = Self::new();
        {
            let mut state = vault.state();
            state.initialized = false;
            state.init_response = InitResponse {
                keys: (0..shares).map(|i| format!("unseal-key-{i}")).collect(),
                recovery_keys: (0..shares).map(|i| format!("recovery-key-{i}")).collect(),
                root_token: "s.generated".to_string(),
            };
        }
        vault
    }

    pub fn initialized() -> Self {
        let vault = Self::new();
        vault.state().initialized = true;
        vault
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn add_auth_mount(&self, path: &str, kind: &str, accessor: &str) {
        self.state().auth_mounts.insert(
            format!("{path}/"),
            MountOutput {
                kind: kind.to_string(),
                accessor: accessor.to_string(),
                ..Default::default()
            },
        );
    }

    /// Paths of all logical writes, in order
    pub fn written_paths(&self) -> Vec<String> {
        self.state().writes.iter().map(|(p, _, _)| p.clone()).collect()
    }

    pub fn total_mutations(&self) -> usize {
        let state = self.state();
        state.writes.len()
            + state.enabled_auth.len()
            + state.mounted.len()
            + state.tuned.len()
            + state.enabled_audit.len()
            + state.registered_plugins.len()
            + state.put_policies.len()
            + state.disabled_auth.len()
            + state.unmounted.len()
            + state.deleted_policies.len()
    }

    fn next_id(state: &mut FakeState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }

    /// Mimic the identity endpoints, which assign IDs on create
    fn apply_identity_write(state: &mut FakeState, path: &str, data: &Map<String, Value>) -> bool {
        let name = data.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        match path {
            "identity/group" => {
                let id = Self::next_id(state, "group");
                let mut stored = data.clone();
                stored.insert("id".to_string(), json!(id));
                state.logical.insert(format!("identity/group/name/{name}"), stored);
                true
            }
            "identity/group-alias" => {
                let id = Self::next_id(state, "alias");
                let mut stored = data.clone();
                stored.insert("id".to_string(), json!(id));
                state.logical.insert(format!("identity/group-alias/id/{id}"), stored);
                true
            }
            _ if path.starts_with("identity/group/name/") => {
                let entry = state.logical.entry(path.to_string()).or_default();
                for (k, v) in data {
                    entry.insert(k.clone(), v.clone());
                }
                true
            }
            _ if path.starts_with("identity/group-alias/id/") => {
                let entry = state.logical.entry(path.to_string()).or_default();
                for (k, v) in data {
                    entry.insert(k.clone(), v.clone());
                }
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl VaultAdmin for FakeVault {
    fn set_token(&self, token: &str) {
        self.state().token = token.to_string();
    }

    fn token(&self) -> String {
        self.state().token.clone()
    }

    async fn init_status(&self) -> Result<bool, VaultError> {
        Ok(self.state().initialized)
    }

    async fn init(&self, request: &InitRequest) -> Result<InitResponse, VaultError> {
        let mut state = self.state();
        if state.initialized {
            return Err(status_error("init", 400));
        }
        state.init_requests.push(*request);
        state.initialized = true;
        Ok(state.init_response.clone())
    }

    async fn seal_status(&self) -> Result<SealStatus, VaultError> {
        let mut state = self.state();
        let next = if state.seal_status.len() > 1 {
            state.seal_status.pop_front()
        } else {
            state.seal_status.front().cloned()
        };
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(code)) => Err(status_error("seal status", code)),
            None => Ok(SealStatus::default()),
        }
    }

    async fn unseal(&self, key: &str) -> Result<SealStatus, VaultError> {
        let mut state = self.state();
        state.unseal_keys.push(key.to_string());
        state
            .unseal_responses
            .pop_front()
            .ok_or_else(|| status_error("unseal", 500))
    }

    async fn health_status(&self) -> Result<u16, VaultError> {
        let (status, delay) = {
            let state = self.state();
            (state.health_status, state.health_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(status)
    }

    async fn leader(&self) -> Result<LeaderResponse, VaultError> {
        Ok(self.state().leader.clone())
    }

    async fn raft_join(&self, request: &RaftJoinRequest) -> Result<RaftJoinResponse, VaultError> {
        let mut state = self.state();
        state.raft_join_requests.push(request.clone());
        Ok(RaftJoinResponse {
            joined: state.raft_joined,
        })
    }

    async fn list_auth(&self) -> Result<BTreeMap<String, MountOutput>, VaultError> {
        Ok(self.state().auth_mounts.clone())
    }

    async fn enable_auth(&self, path: &str, input: &MountInput) -> Result<(), VaultError> {
        let mut state = self.state();
        let accessor = Self::next_id(&mut state, &format!("auth_{}", input.kind));
        state.auth_mounts.insert(
            format!("{path}/"),
            MountOutput {
                kind: input.kind.clone(),
                accessor,
                ..Default::default()
            },
        );
        state.enabled_auth.push((path.to_string(), input.clone()));
        Ok(())
    }

    async fn disable_auth(&self, path: &str) -> Result<(), VaultError> {
        let mut state = self.state();
        state
            .auth_mounts
            .remove(&format!("{path}/"))
            .ok_or_else(|| status_error("disable auth", 400))?;
        state.disabled_auth.push(path.to_string());
        Ok(())
    }

    async fn list_mounts(&self) -> Result<BTreeMap<String, MountOutput>, VaultError> {
        Ok(self.state().secret_mounts.clone())
    }

    async fn mount(&self, path: &str, input: &MountInput) -> Result<(), VaultError> {
        let mut state = self.state();
        state.secret_mounts.insert(
            format!("{path}/"),
            MountOutput {
                kind: input.kind.clone(),
                ..Default::default()
            },
        );
        state.mounted.push((path.to_string(), input.clone()));
        Ok(())
    }

    async fn unmount(&self, path: &str) -> Result<(), VaultError> {
        let mut state = self.state();
        state
            .secret_mounts
            .remove(&format!("{path}/"))
            .ok_or_else(|| status_error("unmount", 400))?;
        state.unmounted.push(path.to_string());
        Ok(())
    }

    async fn tune_mount(&self, path: &str, config: &Map<String, Value>) -> Result<(), VaultError> {
        self.state().tuned.push((path.to_string(), config.clone()));
        Ok(())
    }

    async fn list_audit(&self) -> Result<BTreeMap<String, AuditDevice>, VaultError> {
        Ok(self.state().audit_devices.clone())
    }

    async fn enable_audit(&self, path: &str, options: &EnableAuditOptions) -> Result<(), VaultError> {
        let mut state = self.state();
        state.audit_devices.insert(
            format!("{path}/"),
            AuditDevice {
                kind: options.kind.clone(),
                path: format!("{path}/"),
                ..Default::default()
            },
        );
        state.enabled_audit.push((path.to_string(), options.clone()));
        Ok(())
    }

    async fn list_plugins(&self) -> Result<Value, VaultError> {
        self.state().plugin_lists += 1;
        Ok(json!({ "auth": [], "database": [], "secret": [] }))
    }

    async fn register_plugin(&self, input: &RegisterPluginInput) -> Result<(), VaultError> {
        self.state().registered_plugins.push(input.clone());
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.state().policies.keys().cloned().collect())
    }

    async fn read_policy(&self, name: &str) -> Result<Option<String>, VaultError> {
        Ok(self.state().policies.get(name).cloned())
    }

    async fn put_policy(&self, name: &str, rules: &str) -> Result<(), VaultError> {
        let mut state = self.state();
        state.policies.insert(name.to_string(), rules.to_string());
        state.put_policies.push(name.to_string());
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<(), VaultError> {
        let mut state = self.state();
        state.policies.remove(name);
        state.deleted_policies.push(name.to_string());
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        Ok(self.state().logical.get(path).cloned().map(Secret::with_data))
    }

    async fn write(
        &self,
        path: &str,
        data: &Map<String, Value>,
    ) -> Result<Option<Secret>, VaultError> {
        let mut state = self.state();
        if state
            .fail_writes_to
            .as_deref()
            .is_some_and(|prefix| path.starts_with(prefix))
        {
            return Err(status_error("write", 500));
        }

        let token = state.token.clone();
        state.writes.push((path.to_string(), data.clone(), token));
        if !Self::apply_identity_write(&mut state, path, data) {
            state.logical.insert(path.to_string(), data.clone());
        }

        if state.write_warnings.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Secret {
                data: None,
                warnings: Some(state.write_warnings.clone()),
            }))
        }
    }

    async fn list(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let state = self.state();
        let mut keys: Vec<String> = state
            .logical
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();
        keys.dedup();

        if keys.is_empty() {
            return Ok(None);
        }
        let mut data = Map::new();
        data.insert("keys".to_string(), json!(keys));
        Ok(Some(Secret::with_data(data)))
    }

    async fn create_orphan_token(&self, request: &TokenCreateRequest) -> Result<(), VaultError> {
        let mut state = self.state();
        let caller = state.token.clone();
        state.orphan_token_caller.push(caller);
        state.orphan_tokens.push(request.clone());
        Ok(())
    }

    async fn revoke_self(&self) -> Result<(), VaultError> {
        let mut state = self.state();
        let token = state.token.clone();
        state.revoked_tokens.push(token);
        Ok(())
    }
}

/// Key store that fails for selected keys
#[derive(Debug, Default)]
pub struct FlakyKeyStore {
    pub inner: MemoryKeyStore,
    pub fail_get: HashSet<String>,
    pub fail_set: HashSet<String>,
}

#[async_trait]
impl KeyStore for FlakyKeyStore {
    async fn get(&self, key: &str) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        if self.fail_get.contains(key) {
            return Err(KeyStoreError::backend(key, "store unavailable"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KeyStoreError> {
        if self.fail_set.contains(key) {
            return Err(KeyStoreError::backend(key, "store is read-only"));
        }
        self.inner.set(key, value).await
    }
}

/// Sleeper that returns immediately and counts its calls
#[derive(Debug, Default)]
pub struct CountingSleeper {
    pub calls: AtomicU32,
}

impl CountingSleeper {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sleeper for CountingSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
