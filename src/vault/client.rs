//! # Vault HTTP Client
//!
//! Native REST implementation of [`VaultAdmin`] for the Vault HTTP API v1.
//! Uses reqwest (rustls) for HTTP requests and the `X-Vault-Token` header for
//! authentication.
//!
//! References:
//! - [Vault HTTP API](https://developer.hashicorp.com/vault/api-docs)

use super::types::{
    AuditDevice, EnableAuditOptions, InitRequest, InitResponse, LeaderResponse, MountInput,
    MountOutput, RaftJoinRequest, RaftJoinResponse, RegisterPluginInput, SealStatus, Secret,
    TokenCreateRequest,
};
use super::{VaultAdmin, VaultError};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use zeroize::Zeroizing;

/// Vault REST client
pub struct HttpVaultClient {
    http_client: Client,
    base_url: String,
    token: Mutex<Zeroizing<String>>,
}

impl std::fmt::Debug for HttpVaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVaultClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Vault error response body
///
/// API Reference: <https://developer.hashicorp.com/vault/api-docs#error-response>
#[derive(Debug, Deserialize)]
struct VaultErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InitStatusResponse {
    initialized: bool,
}

impl HttpVaultClient {
    /// Create a new client for the Vault server at `address`
    ///
    /// `ca_cert_pem` adds a trusted root certificate for servers using a private CA.
    ///
    /// # Errors
    /// Returns an error if the certificate cannot be parsed or the HTTP client cannot be built
    pub fn new(
        address: &str,
        timeout: Duration,
        ca_cert_pem: Option<&[u8]>,
    ) -> Result<Self, VaultError> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(pem) = ca_cert_pem {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }
        let http_client = builder.build()?;

        Ok(Self {
            http_client,
            base_url: address.trim_end_matches('/').to_string(),
            token: Mutex::new(Zeroizing::new(String::new())),
        })
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.base_url
    }

    /// Build HTTP request with the authentication header
    fn make_request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'));
        debug!("vault request: {} {}", method, url);

        let builder = self.http_client.request(method, url);
        let token = self
            .token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if token.is_empty() {
            builder
        } else {
            builder.header("X-Vault-Token", token.as_str())
        }
    }

    /// Convert a non-success response into a [`VaultError::Status`]
    async fn handle_error_response(operation: &str, response: Response) -> VaultError {
        let status = response.status().as_u16();
        let error_text = response.text().await.unwrap_or_default();
        let errors = serde_json::from_str::<VaultErrorResponse>(&error_text)
            .map(|body| body.errors)
            .unwrap_or_else(|_| {
                if error_text.is_empty() {
                    Vec::new()
                } else {
                    vec![error_text]
                }
            });

        VaultError::Status {
            operation: operation.to_string(),
            status,
            errors,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<T, VaultError> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Self::handle_error_response(operation, response).await);
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| VaultError::InvalidResponse {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    async fn send_empty(operation: &str, builder: RequestBuilder) -> Result<(), VaultError> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Self::handle_error_response(operation, response).await);
        }
        Ok(())
    }

    /// Send a request whose 404 or empty body means "nothing there"
    async fn send_optional<T: DeserializeOwned>(
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<Option<T>, VaultError> {
        let response = builder.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let body = response.text().await?;
                if body.trim().is_empty() {
                    return Ok(None);
                }
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| VaultError::InvalidResponse {
                        operation: operation.to_string(),
                        message: e.to_string(),
                    })
            }
            _ => Err(Self::handle_error_response(operation, response).await),
        }
    }
}

/// Extract a mount table from a `sys/auth`, `sys/mounts` or `sys/audit` response
///
/// Newer Vault versions nest the table under `data` and repeat it at the top level
/// next to request metadata, older ones only return it at the top level.
fn parse_mount_table<T: DeserializeOwned>(
    operation: &str,
    body: Value,
) -> Result<BTreeMap<String, T>, VaultError> {
    let mut root = match body {
        Value::Object(map) => map,
        _ => {
            return Err(VaultError::InvalidResponse {
                operation: operation.to_string(),
                message: "expected a JSON object".to_string(),
            })
        }
    };

    let table = match root.remove("data") {
        Some(Value::Object(data)) => data,
        _ => root,
    };

    table
        .into_iter()
        .filter(|(path, entry)| path.ends_with('/') && entry.get("type").is_some())
        .map(|(path, entry)| {
            serde_json::from_value(entry)
                .map(|parsed| (path, parsed))
                .map_err(|e| VaultError::InvalidResponse {
                    operation: operation.to_string(),
                    message: e.to_string(),
                })
        })
        .collect()
}

#[async_trait]
impl VaultAdmin for HttpVaultClient {
    fn set_token(&self, token: &str) {
        let mut current = self
            .token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *current = Zeroizing::new(token.to_string());
    }

    fn token(&self) -> String {
        self.token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .to_string()
    }

    async fn init_status(&self) -> Result<bool, VaultError> {
        let response: InitStatusResponse =
            Self::send_json("init status", self.make_request(Method::GET, "sys/init")).await?;
        Ok(response.initialized)
    }

    async fn init(&self, request: &InitRequest) -> Result<InitResponse, VaultError> {
        Self::send_json(
            "init",
            self.make_request(Method::PUT, "sys/init").json(request),
        )
        .await
    }

    async fn seal_status(&self) -> Result<SealStatus, VaultError> {
        Self::send_json(
            "seal status",
            self.make_request(Method::GET, "sys/seal-status"),
        )
        .await
    }

    /// Submit one unseal share
    ///
    /// The serialized request body is owned by reqwest and hyper once built, and
    /// its buffers are not wiped. Keeping the share out of that buffer is beyond
    /// what this client can do.
    async fn unseal(&self, key: &str) -> Result<SealStatus, VaultError> {
        Self::send_json(
            "unseal",
            self.make_request(Method::PUT, "sys/unseal")
                .json(&json!({ "key": key })),
        )
        .await
    }

    async fn health_status(&self) -> Result<u16, VaultError> {
        let response = self.make_request(Method::GET, "sys/health").send().await?;
        Ok(response.status().as_u16())
    }

    async fn leader(&self) -> Result<LeaderResponse, VaultError> {
        Self::send_json("leader", self.make_request(Method::GET, "sys/leader")).await
    }

    async fn raft_join(&self, request: &RaftJoinRequest) -> Result<RaftJoinResponse, VaultError> {
        Self::send_json(
            "raft join",
            self.make_request(Method::POST, "sys/storage/raft/join")
                .json(request),
        )
        .await
    }

    async fn list_auth(&self) -> Result<BTreeMap<String, MountOutput>, VaultError> {
        let body: Value =
            Self::send_json("list auth", self.make_request(Method::GET, "sys/auth")).await?;
        parse_mount_table("list auth", body)
    }

    async fn enable_auth(&self, path: &str, input: &MountInput) -> Result<(), VaultError> {
        Self::send_empty(
            "enable auth",
            self.make_request(Method::POST, &format!("sys/auth/{path}"))
                .json(input),
        )
        .await
    }

    async fn disable_auth(&self, path: &str) -> Result<(), VaultError> {
        Self::send_empty(
            "disable auth",
            self.make_request(Method::DELETE, &format!("sys/auth/{path}")),
        )
        .await
    }

    async fn list_mounts(&self) -> Result<BTreeMap<String, MountOutput>, VaultError> {
        let body: Value =
            Self::send_json("list mounts", self.make_request(Method::GET, "sys/mounts")).await?;
        parse_mount_table("list mounts", body)
    }

    async fn mount(&self, path: &str, input: &MountInput) -> Result<(), VaultError> {
        Self::send_empty(
            "mount",
            self.make_request(Method::POST, &format!("sys/mounts/{path}"))
                .json(input),
        )
        .await
    }

    async fn unmount(&self, path: &str) -> Result<(), VaultError> {
        Self::send_empty(
            "unmount",
            self.make_request(Method::DELETE, &format!("sys/mounts/{path}")),
        )
        .await
    }

    async fn tune_mount(&self, path: &str, config: &Map<String, Value>) -> Result<(), VaultError> {
        Self::send_empty(
            "tune mount",
            self.make_request(Method::POST, &format!("sys/mounts/{path}/tune"))
                .json(config),
        )
        .await
    }

    async fn list_audit(&self) -> Result<BTreeMap<String, AuditDevice>, VaultError> {
        let body: Value =
            Self::send_json("list audit", self.make_request(Method::GET, "sys/audit")).await?;
        parse_mount_table("list audit", body)
    }

    async fn enable_audit(&self, path: &str, options: &EnableAuditOptions) -> Result<(), VaultError> {
        Self::send_empty(
            "enable audit",
            self.make_request(Method::PUT, &format!("sys/audit/{path}"))
                .json(options),
        )
        .await
    }

    async fn list_plugins(&self) -> Result<Value, VaultError> {
        let body: Value = Self::send_json(
            "list plugins",
            self.make_request(Method::GET, "sys/plugins/catalog"),
        )
        .await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn register_plugin(&self, input: &RegisterPluginInput) -> Result<(), VaultError> {
        let body = json!({
            "command": input.command,
            "sha256": input.sha256,
            "args": input.args,
            "env": input.env,
        });
        Self::send_empty(
            "register plugin",
            self.make_request(
                Method::PUT,
                &format!("sys/plugins/catalog/{}/{}", input.plugin_type, input.name),
            )
            .json(&body),
        )
        .await
    }

    async fn list_policies(&self) -> Result<Vec<String>, VaultError> {
        let body: Value =
            Self::send_json("list policies", self.make_request(Method::GET, "sys/policy")).await?;

        let names = body
            .get("policies")
            .or_else(|| body.get("data").and_then(|data| data.get("policies")))
            .or_else(|| body.get("data").and_then(|data| data.get("keys")))
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        serde_json::from_value(names).map_err(|e| VaultError::InvalidResponse {
            operation: "list policies".to_string(),
            message: e.to_string(),
        })
    }

    async fn read_policy(&self, name: &str) -> Result<Option<String>, VaultError> {
        let body: Option<Value> = Self::send_optional(
            "read policy",
            self.make_request(Method::GET, &format!("sys/policy/{name}")),
        )
        .await?;

        Ok(body.and_then(|body| {
            body.get("rules")
                .or_else(|| body.get("data").and_then(|data| data.get("rules")))
                .and_then(Value::as_str)
                .map(str::to_string)
        }))
    }

    async fn put_policy(&self, name: &str, rules: &str) -> Result<(), VaultError> {
        Self::send_empty(
            "put policy",
            self.make_request(Method::PUT, &format!("sys/policy/{name}"))
                .json(&json!({ "policy": rules })),
        )
        .await
    }

    async fn delete_policy(&self, name: &str) -> Result<(), VaultError> {
        Self::send_empty(
            "delete policy",
            self.make_request(Method::DELETE, &format!("sys/policy/{name}")),
        )
        .await
    }

    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        Self::send_optional("read", self.make_request(Method::GET, path)).await
    }

    async fn write(
        &self,
        path: &str,
        data: &Map<String, Value>,
    ) -> Result<Option<Secret>, VaultError> {
        Self::send_optional("write", self.make_request(Method::PUT, path).json(data)).await
    }

    async fn list(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        Self::send_optional(
            "list",
            self.make_request(Method::GET, path)
                .query(&[("list", "true")]),
        )
        .await
    }

    async fn create_orphan_token(&self, request: &TokenCreateRequest) -> Result<(), VaultError> {
        Self::send_empty(
            "create orphan token",
            self.make_request(Method::POST, "auth/token/create-orphan")
                .json(request),
        )
        .await
    }

    async fn revoke_self(&self) -> Result<(), VaultError> {
        Self::send_empty(
            "revoke self",
            self.make_request(Method::POST, "auth/token/revoke-self"),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mount_table_nested_data() {
        let body = json!({
            "request_id": "abc",
            "token/": { "type": "token", "accessor": "auth_token_1" },
            "data": {
                "token/": { "type": "token", "accessor": "auth_token_1" },
                "kubernetes/": { "type": "kubernetes", "accessor": "auth_kubernetes_2" }
            }
        });
        let table: BTreeMap<String, MountOutput> = parse_mount_table("list auth", body).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table["kubernetes/"].accessor, "auth_kubernetes_2");
    }

    #[test]
    fn test_parse_mount_table_top_level() {
        let body = json!({
            "file/": { "type": "file", "path": "file/", "options": { "file_path": "/vault/audit.log" } }
        });
        let table: BTreeMap<String, AuditDevice> = parse_mount_table("list audit", body).unwrap();
        assert_eq!(table["file/"].options["file_path"], "/vault/audit.log");
    }

    #[test]
    fn test_token_set_and_clear() {
        let client =
            HttpVaultClient::new("http://127.0.0.1:8200/", Duration::from_secs(1), None).unwrap();
        assert_eq!(client.address(), "http://127.0.0.1:8200");
        client.set_token("s.root");
        assert_eq!(client.token(), "s.root");
        client.set_token("");
        assert_eq!(client.token(), "");
    }
}
