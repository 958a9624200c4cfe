//! # Vault Admin API
//!
//! The [`VaultAdmin`] trait is the capability the lifecycle controller and the
//! reconciler consume. [`HttpVaultClient`] implements it over Vault's HTTP API;
//! tests substitute an in-memory fake.
//!
//! The client token is process-wide client state. It is set right before a
//! privileged sequence and cleared right after it (see
//! [`TokenGuard`]), so a client must not be shared by
//! concurrent privileged callers.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod client;
pub mod types;

pub use client::HttpVaultClient;
pub use types::{
    AuditDevice, EnableAuditOptions, InitRequest, InitResponse, LeaderResponse, MountInput,
    MountOutput, PluginType, RaftJoinRequest, RaftJoinResponse, RegisterPluginInput, SealStatus,
    Secret, TokenCreateRequest,
};

/// Errors returned by the Vault API client
#[derive(Debug, Error)]
pub enum VaultError {
    /// Vault answered with a non-success status code
    #[error("{operation} failed with HTTP status {status}: {}", errors.join(", "))]
    Status {
        operation: String,
        status: u16,
        errors: Vec<String>,
    },

    /// The response body did not match the expected schema
    #[error("{operation} returned an invalid response: {message}")]
    InvalidResponse { operation: String, message: String },

    /// Transport-level failure
    #[error("request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Error serializing or deserializing JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// HTTP status of the failed call, if Vault answered
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            VaultError::Status { status, .. } => Some(*status),
            VaultError::Reqwest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Administrative operations against a Vault server
#[async_trait]
pub trait VaultAdmin: Send + Sync {
    /// Set the token sent with every request; an empty string clears it
    fn set_token(&self, token: &str);

    /// Current token, empty when cleared
    fn token(&self) -> String;

    /// `GET /v1/sys/init`
    async fn init_status(&self) -> Result<bool, VaultError>;

    /// `PUT /v1/sys/init`
    async fn init(&self, request: &InitRequest) -> Result<InitResponse, VaultError>;

    /// `GET /v1/sys/seal-status`
    async fn seal_status(&self) -> Result<SealStatus, VaultError>;

    /// `PUT /v1/sys/unseal`
    async fn unseal(&self, key: &str) -> Result<SealStatus, VaultError>;

    /// `GET /v1/sys/health`, returning the raw status code
    async fn health_status(&self) -> Result<u16, VaultError>;

    /// `GET /v1/sys/leader`
    async fn leader(&self) -> Result<LeaderResponse, VaultError>;

    /// `POST /v1/sys/storage/raft/join`
    async fn raft_join(&self, request: &RaftJoinRequest) -> Result<RaftJoinResponse, VaultError>;

    /// `GET /v1/sys/auth`, keyed by mount path with a trailing slash
    async fn list_auth(&self) -> Result<BTreeMap<String, MountOutput>, VaultError>;

    /// `POST /v1/sys/auth/:path`
    async fn enable_auth(&self, path: &str, input: &MountInput) -> Result<(), VaultError>;

    /// `DELETE /v1/sys/auth/:path`
    async fn disable_auth(&self, path: &str) -> Result<(), VaultError>;

    /// `GET /v1/sys/mounts`, keyed by mount path with a trailing slash
    async fn list_mounts(&self) -> Result<BTreeMap<String, MountOutput>, VaultError>;

    /// `POST /v1/sys/mounts/:path`
    async fn mount(&self, path: &str, input: &MountInput) -> Result<(), VaultError>;

    /// `DELETE /v1/sys/mounts/:path`
    async fn unmount(&self, path: &str) -> Result<(), VaultError>;

    /// `POST /v1/sys/mounts/:path/tune`; auth mounts use the `auth/` prefix
    async fn tune_mount(&self, path: &str, config: &Map<String, Value>) -> Result<(), VaultError>;

    /// `GET /v1/sys/audit`, keyed by device path with a trailing slash
    async fn list_audit(&self) -> Result<BTreeMap<String, AuditDevice>, VaultError>;

    /// `PUT /v1/sys/audit/:path`
    async fn enable_audit(&self, path: &str, options: &EnableAuditOptions) -> Result<(), VaultError>;

    /// `GET /v1/sys/plugins/catalog`
    async fn list_plugins(&self) -> Result<Value, VaultError>;

    /// `PUT /v1/sys/plugins/catalog/:type/:name`
    async fn register_plugin(&self, input: &RegisterPluginInput) -> Result<(), VaultError>;

    /// `GET /v1/sys/policy`, names of all ACL policies
    async fn list_policies(&self) -> Result<Vec<String>, VaultError>;

    /// `GET /v1/sys/policy/:name`, `None` when the policy does not exist
    async fn read_policy(&self, name: &str) -> Result<Option<String>, VaultError>;

    /// `PUT /v1/sys/policy/:name`
    async fn put_policy(&self, name: &str, rules: &str) -> Result<(), VaultError>;

    /// `DELETE /v1/sys/policy/:name`
    async fn delete_policy(&self, name: &str) -> Result<(), VaultError>;

    /// Logical read, `None` when nothing exists at `path`
    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError>;

    /// Logical write, `None` when Vault returned no body
    async fn write(&self, path: &str, data: &Map<String, Value>)
        -> Result<Option<Secret>, VaultError>;

    /// Logical list, `None` when nothing exists under `path`
    async fn list(&self, path: &str) -> Result<Option<Secret>, VaultError>;

    /// `POST /v1/auth/token/create-orphan`
    async fn create_orphan_token(&self, request: &TokenCreateRequest) -> Result<(), VaultError>;

    /// `POST /v1/auth/token/revoke-self`, revoking the token currently set
    async fn revoke_self(&self) -> Result<(), VaultError>;
}

/// Scoped client token
///
/// Sets the token on creation and clears it when dropped, on every exit path of
/// the privileged sequence holding the guard.
pub struct TokenGuard<'a> {
    vault: &'a dyn VaultAdmin,
}

impl std::fmt::Debug for TokenGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGuard").finish_non_exhaustive()
    }
}

impl<'a> TokenGuard<'a> {
    pub fn new(vault: &'a dyn VaultAdmin, token: &str) -> Self {
        vault.set_token(token);
        Self { vault }
    }
}

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        self.vault.set_token("");
    }
}
