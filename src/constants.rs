//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default Vault API address
pub const DEFAULT_VAULT_ADDR: &str = "http://127.0.0.1:8200";

/// Default timeout for a single Vault API request (seconds)
pub const DEFAULT_VAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for the active-node health check (seconds)
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Interval between seal-status polls while waiting for unseal after init (seconds)
pub const DEFAULT_UNSEAL_WAIT_INTERVAL_SECS: u64 = 2;

/// Maximum number of seal-status polls while waiting for unseal after init
/// 300 polls at the default interval is ten minutes
pub const DEFAULT_UNSEAL_WAIT_MAX_ATTEMPTS: u32 = 300;

/// Default period of the unseal daemon loop (seconds)
pub const DEFAULT_UNSEAL_PERIOD_SECS: u64 = 5;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 9091;

/// Default prefix prepended to every key written to the key store
pub const DEFAULT_KEY_PREFIX: &str = "vault-";

/// Default name of the Kubernetes Secret holding the unseal keys
pub const DEFAULT_K8S_SECRET_NAME: &str = "vault-unseal-keys";

/// Default number of unseal key shares
pub const DEFAULT_SECRET_SHARES: u32 = 5;

/// Default number of shares required to unseal
pub const DEFAULT_SECRET_THRESHOLD: u32 = 3;

/// Environment variable carrying the pod name (used by the HA raft join short-circuit)
pub const ENV_POD_NAME: &str = "POD_NAME";

/// Environment variable with the raft leader CA certificate path (checked first)
pub const ENV_VAULT_RAFT_CACERT: &str = "VAULT_RAFT_CACERT";

/// Generic Vault CA certificate path (fallback for raft join)
pub const ENV_VAULT_CACERT: &str = "VAULT_CACERT";

/// Namespace used to resolve `secretKeyRef` entries
pub const ENV_NAMESPACE: &str = "NAMESPACE";

/// Policy attached to the fixed root token
pub const ROOT_POLICY: &str = "root";

/// Display name of the fixed root token
pub const ROOT_TOKEN_DISPLAY_NAME: &str = "root-token";

/// Auth mounts Vault creates itself, never disabled by the purge
pub const BUILTIN_AUTH_MOUNTS: &[&str] = &["token"];

/// Secret engine mounts Vault creates itself, never unmounted by the purge
pub const BUILTIN_SECRET_MOUNTS: &[&str] = &["sys", "identity", "cubbyhole"];

/// Policies Vault creates itself, never deleted by the purge
pub const BUILTIN_POLICIES: &[&str] = &["root", "default"];
