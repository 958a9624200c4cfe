//! # Identity Groups
//!
//! External groups and their aliases.
//!
//! An external group can have only one alias, but the same alias name may be used
//! on different auth mounts. Aliases are therefore matched on name and mount
//! accessor together.

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use tracing::info;

use super::document::{get_or_default_map, get_or_error, get_string_list, Record};
use super::write_with_warning_check;
use crate::error::OperatorError;
use crate::vault::{Secret, VaultAdmin};

pub async fn configure_identity_groups(
    vault: &dyn VaultAdmin,
    groups: &[Record],
    group_aliases: &[Record],
) -> Result<()> {
    for group in groups {
        configure_group(vault, group).await?;
    }

    for alias in group_aliases {
        configure_group_alias(vault, alias).await?;
    }

    Ok(())
}

async fn configure_group(vault: &dyn VaultAdmin, group: &Record) -> Result<()> {
    let name = get_or_error(group, "name").context("error getting name for group")?;
    let group_type = get_or_error(group, "type").context("error getting type for group")?;

    // Members are managed through group aliases
    if group_type != "external" {
        return Err(OperatorError::UnsupportedType {
            kind: "group",
            value: group_type,
            supported: "'external'",
        }
        .into());
    }

    let existing = read_group(vault, &name)
        .await
        .context("error reading group")?;

    let mut config = Map::new();
    config.insert("name".to_string(), Value::String(name.clone()));
    config.insert("type".to_string(), Value::String(group_type));
    config.insert(
        "policies".to_string(),
        Value::from(get_string_list(group, "policies").context("error getting policies for group")?),
    );
    config.insert(
        "metadata".to_string(),
        Value::Object(get_or_default_map(group, "metadata").context("error getting metadata for group")?),
    );

    if existing.is_none() {
        info!("creating group: {}", name);
        write_with_warning_check(vault, "identity/group", &config)
            .await
            .with_context(|| format!("failed to create group {name}"))?;
    } else {
        info!("tuning already existing group: {}", name);
        write_with_warning_check(vault, &format!("identity/group/name/{name}"), &config)
            .await
            .with_context(|| format!("failed to tune group {name}"))?;
    }

    Ok(())
}

async fn configure_group_alias(vault: &dyn VaultAdmin, alias: &Record) -> Result<()> {
    let name = get_or_error(alias, "name").context("error getting name for group-alias")?;
    let mount_path =
        get_or_error(alias, "mountpath").context("error getting mountpath for group-alias")?;
    let group = get_or_error(alias, "group").context("error getting group for group-alias")?;

    let accessor = auth_mount_accessor(vault, &mount_path)
        .await
        .with_context(|| format!("error getting mount accessor for {mount_path}"))?;

    let canonical_id = group_id(vault, &group)
        .await
        .with_context(|| format!("error getting canonical_id for group {group}"))?;

    let mut config = Map::new();
    config.insert("name".to_string(), Value::String(name.clone()));
    config.insert("mount_accessor".to_string(), Value::String(accessor.clone()));
    config.insert("canonical_id".to_string(), Value::String(canonical_id));

    let existing = find_group_alias_id(vault, &name, &accessor)
        .await
        .with_context(|| format!("error finding group-alias {name}"))?;

    match existing {
        None => {
            info!("creating group-alias: {}@{}", name, accessor);
            write_with_warning_check(vault, "identity/group-alias", &config)
                .await
                .with_context(|| format!("failed to create group-alias {name}"))?;
        }
        Some(id) => {
            info!("tuning already existing group-alias: {}@{} - ID: {}", name, accessor, id);
            write_with_warning_check(vault, &format!("identity/group-alias/id/{id}"), &config)
                .await
                .with_context(|| format!("failed to tune group-alias {id}"))?;
        }
    }

    Ok(())
}

async fn read_group(vault: &dyn VaultAdmin, name: &str) -> Result<Option<Secret>> {
    vault
        .read(&format!("identity/group/name/{name}"))
        .await
        .with_context(|| format!("failed to read group {name} by name"))
}

async fn auth_mount_accessor(vault: &dyn VaultAdmin, path: &str) -> Result<String> {
    let path = format!("{}/", path.trim_end_matches('/'));
    let mounts = vault
        .list_auth()
        .await
        .context("failed to read auth mounts from vault")?;

    mounts
        .get(&path)
        .map(|mount| mount.accessor.clone())
        .ok_or_else(|| anyhow!("auth mount path {path} does not exist in vault"))
}

async fn group_id(vault: &dyn VaultAdmin, group: &str) -> Result<String> {
    let secret = read_group(vault, group)
        .await
        .with_context(|| format!("error reading group {group}"))?
        .ok_or_else(|| anyhow!("group {group} does not exist"))?;

    secret
        .data_str("id")
        .map(str::to_string)
        .ok_or_else(|| anyhow!("group {group} has no id"))
}

/// ID of the alias with both `name` and `accessor`, if any
async fn find_group_alias_id(
    vault: &dyn VaultAdmin,
    name: &str,
    accessor: &str,
) -> Result<Option<String>> {
    let Some(aliases) = vault
        .list("identity/group-alias/id")
        .await
        .context("error listing group aliases")?
    else {
        return Ok(None);
    };

    for id in aliases.list_keys() {
        let alias = vault
            .read(&format!("identity/group-alias/id/{id}"))
            .await
            .with_context(|| format!("failed to read group alias by id {id}"))?
            .ok_or_else(|| anyhow!("group alias {id} does not exist"))?;

        if alias.data_str("name") == Some(name) && alias.data_str("mount_accessor") == Some(accessor) {
            return Ok(Some(id));
        }
    }

    Ok(None)
}
