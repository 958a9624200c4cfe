//! # Secret Engines
//!
//! Mounts missing secret engines, tunes existing ones and writes the records of
//! their `configuration` section.

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info};

use super::document::{value_to_string, SecretEngine};
use super::write_with_warning_check;
use crate::constants::BUILTIN_SECRET_MOUNTS;
use crate::error::OperatorError;
use crate::vault::{MountInput, VaultAdmin};

pub async fn configure_secrets_engines(
    vault: &dyn VaultAdmin,
    engines: &[SecretEngine],
) -> Result<()> {
    if engines.is_empty() {
        return Ok(());
    }

    let existing = vault
        .list_mounts()
        .await
        .context("error reading secret mounts from vault")?;

    for engine in engines {
        let path = engine.mount_path();

        match existing.get(&format!("{path}/")) {
            Some(mount) if mount.kind != engine.kind => {
                return Err(OperatorError::Configuration(format!(
                    "secret engine at {path}/ is of type '{}', not '{}'",
                    mount.kind, engine.kind
                ))
                .into());
            }
            Some(_) => match &engine.config {
                Some(config) => {
                    vault
                        .tune_mount(&path, config)
                        .await
                        .with_context(|| format!("error tuning {path} in vault"))?;
                    info!("tuned secret engine {}", path);
                }
                None => debug!("secret engine is already mounted: {}/", path),
            },
            None => {
                let input = MountInput {
                    kind: engine.kind.clone(),
                    description: engine.description.clone().unwrap_or_default(),
                    config: engine.config.clone(),
                    options: engine.options.clone(),
                };
                vault
                    .mount(&path, &input)
                    .await
                    .with_context(|| format!("error mounting {path} into vault"))?;
                info!("mounted secret engine {} to {}", engine.kind, path);
            }
        }

        for (sub_path, records) in &engine.configuration {
            for record in records {
                let mut data = record.clone();
                let target = match data.remove("name").as_ref().and_then(value_to_string) {
                    Some(name) => format!("{path}/{sub_path}/{name}"),
                    None => format!("{path}/{sub_path}"),
                };

                write_with_warning_check(vault, &target, &data)
                    .await
                    .with_context(|| format!("error putting {target} into vault"))?;
                info!("configured {}", target);
            }
        }
    }

    Ok(())
}

/// Unmount every secret engine that no engine of the document covers
pub async fn purge_unmanaged_secrets_engines(
    vault: &dyn VaultAdmin,
    engines: &[SecretEngine],
) -> Result<()> {
    let managed: HashSet<String> = engines.iter().map(SecretEngine::mount_path).collect();

    let existing = vault
        .list_mounts()
        .await
        .context("error reading secret mounts from vault")?;

    for mount in existing.keys() {
        let path = mount.trim_matches('/');
        if managed.contains(path) || BUILTIN_SECRET_MOUNTS.contains(&path) {
            continue;
        }

        vault
            .unmount(path)
            .await
            .with_context(|| format!("error unmounting {path} from vault"))?;
        info!("unmounted unmanaged secret engine {}", path);
    }

    Ok(())
}
