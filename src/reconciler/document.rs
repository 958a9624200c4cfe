//! # Desired Configuration Document
//!
//! The declarative description of the Vault configuration, loaded once per
//! configure run from a YAML or JSON file.
//!
//! Auth methods, policies and secret engines have typed records. Plugins, audit
//! devices, startup secrets, groups and group aliases are kept as free-form records
//! and read field by field, with scalar values accepted where a string is expected.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::OperatorError;

/// A free-form record of the document
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredConfigDocument {
    #[serde(default)]
    pub purge_unmanaged_config: PurgeUnmanagedConfig,
    #[serde(default)]
    pub auth: Vec<AuthMethod>,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub secrets: Vec<SecretEngine>,
    #[serde(default)]
    pub plugins: Vec<Record>,
    #[serde(default)]
    pub audit: Vec<Record>,
    #[serde(default)]
    pub startup_secrets: Vec<Record>,
    #[serde(default)]
    pub groups: Vec<Record>,
    #[serde(default, rename = "group-aliases")]
    pub group_aliases: Vec<Record>,
}

impl DesiredConfigDocument {
    /// Parse a document from YAML (JSON is accepted as well)
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("error parsing vault configuration document")
    }

    /// Read and parse a document file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("error reading vault configuration file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("error loading vault configuration file {}", path.display()))
    }
}

/// Removal of auth methods, policies and secret engines the document does not name
///
/// Off unless `enabled`. Each category can be excluded on its own. Vault's
/// built-in mounts and policies are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeUnmanagedConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub exclude: PurgeExclusions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeExclusions {
    #[serde(default)]
    pub auth: bool,
    #[serde(default)]
    pub policies: bool,
    #[serde(default)]
    pub secrets: bool,
}

impl PurgeUnmanagedConfig {
    #[must_use]
    pub fn purges_auth(&self) -> bool {
        self.enabled && !self.exclude.auth
    }

    #[must_use]
    pub fn purges_policies(&self) -> bool {
        self.enabled && !self.exclude.policies
    }

    #[must_use]
    pub fn purges_secrets(&self) -> bool {
        self.enabled && !self.exclude.secrets
    }
}

/// Auth method mount
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthMethod {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
    /// Written to `auth/<path>/config`
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    /// Each written to `auth/<path>/role/<name>`
    #[serde(default)]
    pub roles: Vec<Record>,
}

impl AuthMethod {
    /// Mount path without slashes, defaulting to the method type
    #[must_use]
    pub fn mount_path(&self) -> String {
        mount_path_or_type(self.path.as_deref(), &self.kind)
    }
}

/// ACL policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub rules: String,
}

/// Secret engine mount
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretEngine {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
    /// Mount tuning applied when the engine is already mounted
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    /// Records written below the mount, keyed by sub-path
    #[serde(default)]
    pub configuration: BTreeMap<String, Vec<Record>>,
}

impl SecretEngine {
    /// Mount path without slashes, defaulting to the engine type
    #[must_use]
    pub fn mount_path(&self) -> String {
        mount_path_or_type(self.path.as_deref(), &self.kind)
    }
}

fn mount_path_or_type(path: Option<&str>, kind: &str) -> String {
    path.map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .unwrap_or(kind)
        .to_string()
}

/// String form of a scalar value
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Required string field of a record
pub(crate) fn get_or_error(record: &Record, key: &str) -> Result<String, OperatorError> {
    match record.get(key) {
        None | Some(Value::Null) => Err(OperatorError::MissingField(key.to_string())),
        Some(value) => value_to_string(value).ok_or_else(|| {
            OperatorError::Configuration(format!("value for {key} is not a string: {value}"))
        }),
    }
}

/// Optional string field of a record
pub(crate) fn get_or_default(record: &Record, key: &str) -> Result<String, OperatorError> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(_) => get_or_error(record, key),
    }
}

/// Optional map field of a record, empty when absent
pub(crate) fn get_or_default_map(record: &Record, key: &str) -> Result<Record, OperatorError> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(Record::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(OperatorError::Configuration(format!(
            "value for {key} is not a map: {other}"
        ))),
    }
}

/// Optional list of strings, a single scalar counts as a one-element list
pub(crate) fn get_string_list(record: &Record, key: &str) -> Result<Vec<String>, OperatorError> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                value_to_string(item).ok_or_else(|| {
                    OperatorError::Configuration(format!("{key} contains a non-string value: {item}"))
                })
            })
            .collect(),
        Some(value) => value_to_string(value).map(|s| vec![s]).ok_or_else(|| {
            OperatorError::Configuration(format!("value for {key} is not a list: {value}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_document() {
        let doc = DesiredConfigDocument::from_yaml_str(
            r#"
auth:
  - type: kubernetes
    path: /k8s/
    config:
      kubernetes_host: https://kubernetes.default.svc
    roles:
      - name: default
        bound_service_account_names: ["default"]
policies:
  - name: allow_secrets
    rules: |
      path "secret/*" {
        capabilities = ["read"]
      }
secrets:
  - type: kv
    path: secret
    options:
      version: 2
plugins:
  - plugin_name: my-plugin
    command: my-plugin
    sha256: abc
    type: secret
audit:
  - type: file
    options:
      file_path: /vault/logs/audit.log
startupSecrets:
  - type: kv
    path: secret/data/accounts/aws
    data:
      data:
        AWS_ACCESS_KEY_ID: secretId
groups:
  - name: admin
    type: external
group-aliases:
  - name: admin
    mountpath: token
    group: admin
"#,
        )
        .unwrap();

        assert_eq!(doc.auth[0].mount_path(), "k8s");
        assert_eq!(doc.auth[0].roles.len(), 1);
        assert_eq!(doc.policies[0].name, "allow_secrets");
        assert_eq!(doc.secrets[0].mount_path(), "secret");
        assert_eq!(doc.plugins.len(), 1);
        assert_eq!(doc.audit.len(), 1);
        assert_eq!(doc.startup_secrets.len(), 1);
        assert_eq!(doc.groups.len(), 1);
        assert_eq!(doc.group_aliases[0]["mountpath"], "token");
    }

    #[test]
    fn test_parse_purge_settings() {
        let doc = DesiredConfigDocument::from_yaml_str(
            r#"
purgeUnmanagedConfig:
  enabled: true
  exclude:
    secrets: true
"#,
        )
        .unwrap();

        assert!(doc.purge_unmanaged_config.purges_auth());
        assert!(doc.purge_unmanaged_config.purges_policies());
        assert!(!doc.purge_unmanaged_config.purges_secrets());

        let doc = DesiredConfigDocument::from_yaml_str("policies: []").unwrap();
        assert!(!doc.purge_unmanaged_config.purges_auth());
        assert!(!doc.purge_unmanaged_config.purges_policies());
        assert!(!doc.purge_unmanaged_config.purges_secrets());
    }

    #[test]
    fn test_empty_document() {
        let doc = DesiredConfigDocument::from_yaml_str("").unwrap();
        assert_eq!(doc, DesiredConfigDocument::default());
    }

    #[test]
    fn test_record_field_casting() {
        let record: Record = json!({
            "name": "x",
            "ttl": 3600,
            "local": true,
            "nested": { "a": 1 },
            "policies": ["a", "b"]
        })
        .as_object()
        .cloned()
        .unwrap();

        assert_eq!(get_or_error(&record, "ttl").unwrap(), "3600");
        assert_eq!(get_or_error(&record, "local").unwrap(), "true");
        assert!(matches!(
            get_or_error(&record, "missing"),
            Err(OperatorError::MissingField(field)) if field == "missing"
        ));
        assert!(get_or_error(&record, "nested").is_err());
        assert_eq!(get_or_default(&record, "missing").unwrap(), "");
        assert_eq!(get_or_default_map(&record, "nested").unwrap()["a"], 1);
        assert!(get_or_default_map(&record, "missing").unwrap().is_empty());
        assert_eq!(get_string_list(&record, "policies").unwrap(), vec!["a", "b"]);
        assert_eq!(get_string_list(&record, "name").unwrap(), vec!["x"]);
    }
}
