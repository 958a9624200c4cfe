//! # Policies
//!
//! Writes ACL policies whose rules differ from the live ones.

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info};

use super::document::Policy;
use crate::constants::BUILTIN_POLICIES;
use crate::error::OperatorError;
use crate::vault::VaultAdmin;

pub async fn configure_policies(vault: &dyn VaultAdmin, policies: &[Policy]) -> Result<()> {
    for policy in policies {
        if policy.name.is_empty() {
            return Err(OperatorError::MissingField("name".to_string()))
                .context("error getting name for policy");
        }

        let current = vault
            .read_policy(&policy.name)
            .await
            .with_context(|| format!("error reading policy {}", policy.name))?;

        if current.as_deref().map(str::trim) == Some(policy.rules.trim()) {
            debug!("policy is up to date: {}", policy.name);
            continue;
        }

        vault
            .put_policy(&policy.name, &policy.rules)
            .await
            .with_context(|| format!("error putting {} policy into vault", policy.name))?;
        info!("wrote policy {}", policy.name);
    }

    Ok(())
}

/// Delete every policy the document does not name
pub async fn purge_unmanaged_policies(vault: &dyn VaultAdmin, policies: &[Policy]) -> Result<()> {
    let managed: HashSet<&str> = policies.iter().map(|p| p.name.as_str()).collect();

    let existing = vault
        .list_policies()
        .await
        .context("error listing policies in vault")?;

    for name in existing
        .iter()
        .filter(|name| !managed.contains(name.as_str()))
        .filter(|name| !BUILTIN_POLICIES.contains(&name.as_str()))
    {
        vault
            .delete_policy(name)
            .await
            .with_context(|| format!("error deleting {name} policy from vault"))?;
        info!("deleted unmanaged policy {}", name);
    }

    Ok(())
}
