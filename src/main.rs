//! # Vault Bootstrap
//!
//! Initializes, unseals and configures a HashiCorp Vault server.
//!
//! ## Overview
//!
//! 1. **Init** - initializes Vault once and stores the unseal keys and root token
//!    in a key store (Kubernetes Secret, AWS Secrets Manager, local files)
//! 2. **Unseal** - submits the stored unseal keys, once or as a daemon that keeps
//!    Vault unsealed
//! 3. **Raft join** - attaches a fresh node to an existing raft cluster
//! 4. **Configure** - applies a declarative configuration document (auth methods,
//!    policies, secret engines, plugins, audit devices, startup secrets, identity
//!    groups)
//!
//! ## Usage
//!
//! ```bash
//! vault-bootstrap --mode kubernetes unseal --init --raft
//! vault-bootstrap --mode file --file-path /vault/keys configure --file vault-config.yaml
//! vault-bootstrap status
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kube::Client;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vault_bootstrap::config::{BootstrapConfig, OperatorConfig, PodEnvironment};
use vault_bootstrap::constants::{
    DEFAULT_K8S_SECRET_NAME, DEFAULT_SECRET_SHARES, DEFAULT_SECRET_THRESHOLD, ENV_VAULT_CACERT,
};
use vault_bootstrap::keystore::{
    AwsSecretsManagerKeyStore, FileKeyStore, KeyNames, KeyStore, KubernetesKeyStore,
    MemoryKeyStore,
};
use vault_bootstrap::lifecycle::{Bootstrapper, WaitPolicy};
use vault_bootstrap::observability::{init_logging, metrics};
use vault_bootstrap::reconciler::{Configurator, DesiredConfigDocument, KubeSecretResolver};
use vault_bootstrap::server::{start_server, ServerState};
use vault_bootstrap::vault::{HttpVaultClient, VaultAdmin};

/// Vault bootstrap operator
#[derive(Debug, Parser)]
#[command(name = "vault-bootstrap", version, about = "Initializes, unseals and configures HashiCorp Vault")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Vault API address
    #[arg(long, env = "VAULT_ADDR", global = true)]
    vault_addr: Option<String>,

    /// Where unseal keys and the root token are stored
    #[arg(long, env = "KEY_STORE_MODE", value_enum, default_value_t = KeyStoreMode::Kubernetes, global = true)]
    mode: KeyStoreMode,

    /// Namespace of the Kubernetes Secret holding the keys (defaults to NAMESPACE)
    #[arg(long, env = "K8S_SECRET_NAMESPACE", global = true)]
    k8s_secret_namespace: Option<String>,

    /// Name of the Kubernetes Secret holding the keys
    #[arg(long, env = "K8S_SECRET_NAME", default_value = DEFAULT_K8S_SECRET_NAME, global = true)]
    k8s_secret_name: String,

    /// AWS region of the Secrets Manager key store
    #[arg(long, env = "AWS_REGION", global = true)]
    aws_region: Option<String>,

    /// Prefix of the AWS Secrets Manager secret names
    #[arg(long, env = "AWS_SECRET_PREFIX", default_value = "", global = true)]
    aws_secret_prefix: String,

    /// Directory of the file key store
    #[arg(long, env = "FILE_PATH", global = true)]
    file_path: Option<PathBuf>,

    /// Number of unseal key shares
    #[arg(long, env = "SECRET_SHARES", default_value_t = DEFAULT_SECRET_SHARES, global = true)]
    secret_shares: u32,

    /// Number of shares required to unseal
    #[arg(long, env = "SECRET_THRESHOLD", default_value_t = DEFAULT_SECRET_THRESHOLD, global = true)]
    secret_threshold: u32,

    /// Fixed root token to set up after init
    #[arg(long, env = "INIT_ROOT_TOKEN", hide_env_values = true, global = true)]
    init_root_token: Option<String>,

    /// Store the root token in the key store
    #[arg(long, env = "STORE_ROOT_TOKEN", default_value_t = true, action = ArgAction::Set, global = true)]
    store_root_token: bool,

    /// Test the key store before initializing Vault
    #[arg(long, env = "PRE_FLIGHT_CHECKS", default_value_t = true, action = ArgAction::Set, global = true)]
    pre_flight_checks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KeyStoreMode {
    Kubernetes,
    Aws,
    File,
    /// Keys are lost when the process exits
    Memory,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize Vault and store its keys
    Init,
    /// Unseal Vault with the stored keys
    Unseal {
        /// Unseal once and exit instead of running as a daemon
        #[arg(long)]
        once: bool,

        /// Initialize Vault first when it is not initialized
        #[arg(long)]
        init: bool,

        /// Join the raft cluster before unsealing
        #[arg(long)]
        raft: bool,

        /// API address of the raft leader (raft storage mode)
        #[arg(long, env = "RAFT_LEADER_ADDRESS")]
        raft_leader_address: Option<String>,
    },
    /// Join a raft cluster
    RaftJoin {
        /// API address of the raft leader, omitted in raft HA storage mode
        #[arg(long, env = "RAFT_LEADER_ADDRESS")]
        leader_address: Option<String>,
    },
    /// Apply a configuration document to Vault
    Configure {
        /// YAML or JSON configuration document
        #[arg(long, env = "VAULT_CONFIG_FILE")]
        file: PathBuf,
    },
    /// Print seal, leader and bootstrap status as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider before any TLS client is built
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow!("failed to install rustls crypto provider"))?;

    let cli = Cli::parse();

    let mut config = OperatorConfig::from_env();
    if let Some(addr) = &cli.vault_addr {
        config.vault_addr.clone_from(addr);
    }

    init_logging(&config.log_level, &config.log_format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("BUILD_GIT_HASH"),
        build_timestamp = env!("BUILD_TIMESTAMP"),
        vault_addr = %config.vault_addr,
        "Starting vault-bootstrap"
    );

    metrics::register_metrics()?;

    let pod = PodEnvironment::from_env();
    let bootstrap = BootstrapConfig::new(
        cli.secret_shares,
        cli.secret_threshold,
        cli.init_root_token.clone(),
        cli.store_root_token,
        cli.pre_flight_checks,
    )?;
    let key_names = KeyNames::new(config.key_prefix.clone());

    let key_store = build_key_store(&cli, &pod).await?;
    let vault: Arc<dyn VaultAdmin> = Arc::new(build_vault_client(&config).await?);

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            signal_shutdown.cancel();
        }
    });

    let bootstrapper = Arc::new(
        Bootstrapper::new(Arc::clone(&key_store), Arc::clone(&vault), bootstrap)
            .with_key_names(key_names.clone())
            .with_pod_environment(pod.clone())
            .with_wait_policy(WaitPolicy::new(
                config.unseal_wait_interval(),
                config.unseal_wait_max_attempts,
            ))
            .with_health_check_timeout(config.health_check_timeout())
            .with_shutdown(shutdown.clone()),
    );

    match cli.command {
        Commands::Init => bootstrapper.init().await,
        Commands::Unseal {
            once: true,
            init,
            raft,
            raft_leader_address,
        } => {
            if init {
                bootstrapper.init().await?;
            }
            if raft {
                bootstrapper.raft_join(raft_leader_address.as_deref()).await?;
            }
            if bootstrapper.sealed().await? {
                bootstrapper.unseal().await?;
            } else {
                info!("vault is already unsealed");
            }
            Ok(())
        }
        Commands::Unseal {
            once: false,
            init,
            raft,
            raft_leader_address,
        } => {
            run_unseal_daemon(
                bootstrapper,
                &config,
                shutdown,
                init,
                raft.then_some(raft_leader_address),
            )
            .await
        }
        Commands::RaftJoin { leader_address } => {
            bootstrapper.raft_join(leader_address.as_deref()).await
        }
        Commands::Configure { file } => {
            let document = DesiredConfigDocument::from_file(&file)?;
            let mut configurator =
                Configurator::new(key_store, vault).with_key_names(key_names);
            if let Some(namespace) = &pod.namespace {
                match Client::try_default().await {
                    Ok(client) => {
                        configurator = configurator
                            .with_resolver(Arc::new(KubeSecretResolver::new(client, namespace)));
                    }
                    Err(e) => warn!("secretKeyRef resolution unavailable: {}", e),
                }
            }
            configurator.configure(&document).await
        }
        Commands::Status => print_status(&bootstrapper).await,
    }
}

/// Keep Vault unsealed until shutdown, serving metrics and probes
///
/// The unseal loop starts before init so a fixed root token can be set up once
/// the freshly initialized Vault gets unsealed.
async fn run_unseal_daemon(
    bootstrapper: Arc<Bootstrapper>,
    config: &OperatorConfig,
    shutdown: CancellationToken,
    init: bool,
    raft_join: Option<Option<String>>,
) -> Result<()> {
    let server_state = Arc::new(ServerState::default());

    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    if let Some(leader_address) = raft_join {
        bootstrapper.raft_join(leader_address.as_deref()).await?;
    }

    let period = config.unseal_period();
    let loop_bootstrapper = Arc::clone(&bootstrapper);
    let unseal_loop = tokio::spawn(async move {
        loop_bootstrapper
            .run_unseal_loop(period, |sealed| {
                metrics::set_vault_sealed(sealed);
                server_state.observe_sealed(sealed);
            })
            .await;
    });

    if init {
        if let Err(e) = bootstrapper.init().await {
            shutdown.cancel();
            return Err(e);
        }
    }

    unseal_loop.await.context("unseal loop panicked")?;
    Ok(())
}

async fn print_status(bootstrapper: &Bootstrapper) -> Result<()> {
    let sealed = bootstrapper.sealed().await?;
    let active = match bootstrapper.active().await {
        Ok(active) => json!(active),
        Err(e) => json!(format!("{e:#}")),
    };
    let (leader, leader_address) = if sealed {
        (json!(null), json!(null))
    } else {
        (
            json!(bootstrapper.leader().await?),
            json!(bootstrapper.leader_address().await?),
        )
    };

    let status = json!({
        "sealed": sealed,
        "active": active,
        "leader": leader,
        "leader_address": leader_address,
        "bootstrapped": bootstrapper.raft_initialized().await?,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn build_key_store(cli: &Cli, pod: &PodEnvironment) -> Result<Arc<dyn KeyStore>> {
    match cli.mode {
        KeyStoreMode::Kubernetes => {
            let client = Client::try_default()
                .await
                .context("failed to create Kubernetes client")?;
            let namespace = cli
                .k8s_secret_namespace
                .clone()
                .or_else(|| pod.namespace.clone())
                .unwrap_or_else(|| "default".to_string());
            Ok(Arc::new(KubernetesKeyStore::new(
                client,
                &namespace,
                &cli.k8s_secret_name,
            )))
        }
        KeyStoreMode::Aws => {
            let region = cli
                .aws_region
                .as_deref()
                .context("--aws-region is required for the aws key store")?;
            Ok(Arc::new(
                AwsSecretsManagerKeyStore::new(region, &cli.aws_secret_prefix).await,
            ))
        }
        KeyStoreMode::File => {
            let path = cli
                .file_path
                .clone()
                .context("--file-path is required for the file key store")?;
            info!("Using directory {} as key store", path.display());
            Ok(Arc::new(FileKeyStore::new(path)))
        }
        KeyStoreMode::Memory => {
            warn!("Using in-memory key store, keys are lost when the process exits");
            Ok(Arc::new(MemoryKeyStore::new()))
        }
    }
}

async fn build_vault_client(config: &OperatorConfig) -> Result<HttpVaultClient> {
    let ca_cert = match std::env::var(ENV_VAULT_CACERT).ok().filter(|p| !p.is_empty()) {
        Some(path) => Some(
            tokio::fs::read(&path)
                .await
                .with_context(|| format!("error reading vault CA certificate {path}"))?,
        ),
        None => None,
    };

    HttpVaultClient::new(
        &config.vault_addr,
        config.vault_request_timeout(),
        ca_cert.as_deref(),
    )
    .context("failed to create Vault client")
}
