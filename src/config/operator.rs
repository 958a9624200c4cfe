//! # Operator Configuration
//!
//! Process-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_HEALTH_CHECK_TIMEOUT_SECS, DEFAULT_KEY_PREFIX, DEFAULT_METRICS_PORT,
    DEFAULT_UNSEAL_PERIOD_SECS, DEFAULT_UNSEAL_WAIT_INTERVAL_SECS,
    DEFAULT_UNSEAL_WAIT_MAX_ATTEMPTS, DEFAULT_VAULT_ADDR, DEFAULT_VAULT_REQUEST_TIMEOUT_SECS,
    ENV_NAMESPACE, ENV_POD_NAME, ENV_VAULT_CACERT, ENV_VAULT_RAFT_CACERT,
};
use std::path::PathBuf;
use std::time::Duration;

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Command-line flags take precedence over both.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Vault API address
    pub vault_addr: String,
    /// Timeout of a single Vault API request (seconds)
    pub vault_request_timeout_secs: u64,
    /// Timeout of the active-node health check (seconds)
    pub health_check_timeout_secs: u64,
    /// Interval between seal-status polls after init (seconds)
    pub unseal_wait_interval_secs: u64,
    /// Maximum number of seal-status polls after init
    pub unseal_wait_max_attempts: u32,
    /// Period of the unseal daemon loop (seconds)
    pub unseal_period_secs: u64,
    /// Prefix prepended to every key stored in the key store
    pub key_prefix: String,
    /// Port of the metrics and probes server
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            vault_addr: DEFAULT_VAULT_ADDR.to_string(),
            vault_request_timeout_secs: DEFAULT_VAULT_REQUEST_TIMEOUT_SECS,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
            unseal_wait_interval_secs: DEFAULT_UNSEAL_WAIT_INTERVAL_SECS,
            unseal_wait_max_attempts: DEFAULT_UNSEAL_WAIT_MAX_ATTEMPTS,
            unseal_period_secs: DEFAULT_UNSEAL_PERIOD_SECS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            vault_addr: env_var_or_default_str("VAULT_ADDR", DEFAULT_VAULT_ADDR),
            vault_request_timeout_secs: env_var_or_default(
                "VAULT_REQUEST_TIMEOUT_SECS",
                DEFAULT_VAULT_REQUEST_TIMEOUT_SECS,
            ),
            health_check_timeout_secs: env_var_or_default(
                "HEALTH_CHECK_TIMEOUT_SECS",
                DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
            ),
            unseal_wait_interval_secs: env_var_or_default(
                "UNSEAL_WAIT_INTERVAL_SECS",
                DEFAULT_UNSEAL_WAIT_INTERVAL_SECS,
            ),
            unseal_wait_max_attempts: env_var_or_default(
                "UNSEAL_WAIT_MAX_ATTEMPTS",
                DEFAULT_UNSEAL_WAIT_MAX_ATTEMPTS,
            ),
            unseal_period_secs: env_var_or_default("UNSEAL_PERIOD_SECS", DEFAULT_UNSEAL_PERIOD_SECS),
            key_prefix: env_var_or_default_str("KEY_PREFIX", DEFAULT_KEY_PREFIX),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
        }
    }

    /// Get Vault request timeout duration
    #[must_use]
    pub fn vault_request_timeout(&self) -> Duration {
        Duration::from_secs(self.vault_request_timeout_secs)
    }

    /// Get health check timeout duration
    #[must_use]
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    /// Get post-init unseal wait interval
    #[must_use]
    pub fn unseal_wait_interval(&self) -> Duration {
        Duration::from_secs(self.unseal_wait_interval_secs)
    }

    /// Get unseal daemon period
    #[must_use]
    pub fn unseal_period(&self) -> Duration {
        Duration::from_secs(self.unseal_period_secs)
    }
}

/// Values injected into the pod by its runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodEnvironment {
    /// Pod name, e.g. `vault-0` in a StatefulSet
    pub pod_name: Option<String>,
    /// CA certificate used to verify the raft leader
    pub raft_ca_cert_path: Option<PathBuf>,
    /// Namespace in which `secretKeyRef` entries are resolved
    pub namespace: Option<String>,
}

impl PodEnvironment {
    /// Read pod values from the environment
    ///
    /// The raft CA certificate path is taken from `VAULT_RAFT_CACERT`, falling back to
    /// `VAULT_CACERT`. Empty values count as unset.
    #[must_use]
    pub fn from_env() -> Self {
        let raft_ca_cert_path =
            non_empty_env(ENV_VAULT_RAFT_CACERT).or_else(|| non_empty_env(ENV_VAULT_CACERT));

        Self {
            pod_name: non_empty_env(ENV_POD_NAME),
            raft_ca_cert_path: raft_ca_cert_path.map(PathBuf::from),
            namespace: non_empty_env(ENV_NAMESPACE),
        }
    }

    /// Whether this pod is the first replica of its StatefulSet
    ///
    /// Only the `-0` ordinal suffix is recognised. Multi-datacenter setups running
    /// raft in HA-storage-only mode are not covered by this check.
    #[must_use]
    pub fn is_first_replica(&self) -> bool {
        self.pod_name
            .as_deref()
            .is_some_and(|name| name.ends_with("-0"))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
