//! # Vault API Types
//!
//! Request and response payloads of the Vault HTTP API used by this operator.
//! Field names follow the JSON schema documented at
//! <https://developer.hashicorp.com/vault/api-docs/system>.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Body of `PUT /v1/sys/init`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    pub secret_shares: u32,
    pub secret_threshold: u32,
    pub recovery_shares: u32,
    pub recovery_threshold: u32,
}

/// Response of `PUT /v1/sys/init`
///
/// Holds the only copy of the generated key shares, wiped on drop.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct InitResponse {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub recovery_keys: Vec<String>,
    #[serde(default)]
    pub root_token: String,
}

impl std::fmt::Debug for InitResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitResponse")
            .field("keys", &self.keys.len())
            .field("recovery_keys", &self.recovery_keys.len())
            .finish_non_exhaustive()
    }
}

/// Response of `GET /v1/sys/seal-status` and `PUT /v1/sys/unseal`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealStatus {
    pub sealed: bool,
    /// Number of key shares submitted so far
    #[serde(default)]
    pub progress: u32,
    /// Threshold
    #[serde(default)]
    pub t: u32,
    /// Total shares
    #[serde(default)]
    pub n: u32,
}

/// Response of `GET /v1/sys/leader`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderResponse {
    #[serde(default)]
    pub ha_enabled: bool,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub leader_address: String,
    #[serde(default)]
    pub leader_cluster_address: String,
}

/// Body of `POST /v1/sys/storage/raft/join`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftJoinRequest {
    pub leader_api_addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_ca_cert: Option<String>,
}

/// Response of `POST /v1/sys/storage/raft/join`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftJoinResponse {
    #[serde(default)]
    pub joined: bool,
}

/// Entry of the auth or secrets mount table (`GET /v1/sys/auth`, `GET /v1/sys/mounts`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MountOutput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub accessor: String,
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
}

/// Body of `POST /v1/sys/auth/:path` and `POST /v1/sys/mounts/:path`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MountInput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

/// Entry of the audit device table (`GET /v1/sys/audit`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDevice {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub local: bool,
}

/// Body of `PUT /v1/sys/audit/:path`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableAuditOptions {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub local: bool,
}

/// Plugin catalog type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginType {
    Auth,
    Database,
    Secret,
}

impl PluginType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Auth => "auth",
            PluginType::Database => "database",
            PluginType::Secret => "secret",
        }
    }
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(PluginType::Auth),
            "database" => Ok(PluginType::Database),
            "secret" => Ok(PluginType::Secret),
            other => Err(format!("{other:?} is not a supported plugin type")),
        }
    }
}

/// Plugin registration (`PUT /v1/sys/plugins/catalog/:type/:name`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterPluginInput {
    pub name: String,
    pub plugin_type: PluginType,
    pub command: String,
    pub sha256: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
}

/// Body of `POST /v1/auth/token/create-orphan`
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenCreateRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub policies: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    pub no_parent: bool,
}

impl std::fmt::Debug for TokenCreateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCreateRequest")
            .field("policies", &self.policies)
            .field("display_name", &self.display_name)
            .field("no_parent", &self.no_parent)
            .finish_non_exhaustive()
    }
}

/// Response of a logical read, write or list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

impl Secret {
    /// Secret with the given data and no warnings
    #[must_use]
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data: Some(data),
            warnings: None,
        }
    }

    /// String value of `field` in the data map
    #[must_use]
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.as_ref()?.get(field)?.as_str()
    }

    /// Warnings returned alongside the response
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        self.warnings.as_deref().unwrap_or_default()
    }

    /// Keys of a list response
    #[must_use]
    pub fn list_keys(&self) -> Vec<String> {
        self.data
            .as_ref()
            .and_then(|data| data.get("keys"))
            .and_then(Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
