//! # Auth Methods
//!
//! Enables missing auth mounts and writes their config and roles.

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info};

use super::document::{get_or_error, AuthMethod};
use super::write_with_warning_check;
use crate::constants::BUILTIN_AUTH_MOUNTS;
use crate::error::OperatorError;
use crate::vault::{MountInput, VaultAdmin};

pub async fn configure_auth_methods(vault: &dyn VaultAdmin, methods: &[AuthMethod]) -> Result<()> {
    if methods.is_empty() {
        return Ok(());
    }

    let existing = vault
        .list_auth()
        .await
        .context("error reading auth mounts from vault")?;

    for method in methods {
        let path = method.mount_path();

        match existing.get(&format!("{path}/")) {
            Some(mount) if mount.kind != method.kind => {
                return Err(OperatorError::Configuration(format!(
                    "auth method at {path}/ is of type '{}', not '{}'",
                    mount.kind, method.kind
                ))
                .into());
            }
            Some(_) => debug!("auth method is already enabled: {}/", path),
            None => {
                let input = MountInput {
                    kind: method.kind.clone(),
                    description: method.description.clone().unwrap_or_default(),
                    config: None,
                    options: method.options.clone(),
                };
                vault
                    .enable_auth(&path, &input)
                    .await
                    .with_context(|| format!("error enabling {} auth method in vault", method.kind))?;
                info!("enabled auth method {} at {}", method.kind, path);
            }
        }

        if let Some(config) = &method.config {
            let config_path = format!("auth/{path}/config");
            write_with_warning_check(vault, &config_path, config)
                .await
                .with_context(|| format!("error configuring {config_path}"))?;
            info!("configured {}", config_path);
        }

        for role in &method.roles {
            let name = get_or_error(role, "name")
                .with_context(|| format!("error getting name for role of auth method {path}"))?;
            let mut data = role.clone();
            data.remove("name");

            let role_path = format!("auth/{path}/role/{name}");
            write_with_warning_check(vault, &role_path, &data)
                .await
                .with_context(|| format!("error writing role {role_path}"))?;
            info!("configured role {}", role_path);
        }
    }

    Ok(())
}

/// Disable every auth mount that no method of the document covers
pub async fn purge_unmanaged_auth_methods(
    vault: &dyn VaultAdmin,
    methods: &[AuthMethod],
) -> Result<()> {
    let managed: HashSet<String> = methods.iter().map(AuthMethod::mount_path).collect();

    let existing = vault
        .list_auth()
        .await
        .context("error reading auth mounts from vault")?;

    for mount in existing.keys() {
        let path = mount.trim_matches('/');
        if managed.contains(path) || BUILTIN_AUTH_MOUNTS.contains(&path) {
            continue;
        }

        vault
            .disable_auth(path)
            .await
            .with_context(|| format!("error disabling {path} auth method in vault"))?;
        info!("disabled unmanaged auth method {}", path);
    }

    Ok(())
}
