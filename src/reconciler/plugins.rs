//! # Plugins
//!
//! Registers plugins in the catalog. Registration is an upsert, the catalog itself
//! is only listed for the log.

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::document::{get_or_error, get_string_list, Record};
use crate::error::OperatorError;
use crate::vault::{PluginType, RegisterPluginInput, VaultAdmin};

pub async fn configure_plugins(vault: &dyn VaultAdmin, plugins: &[Record]) -> Result<()> {
    if plugins.is_empty() {
        return Ok(());
    }

    let registered = vault
        .list_plugins()
        .await
        .context("failed to retrieve list of plugins")?;
    debug!("already registered plugins: {}", registered);

    for plugin in plugins {
        let input = register_input(plugin)?;
        info!(
            plugin = %input.name,
            plugin_type = %input.plugin_type,
            command = %input.command,
            "registering plugin"
        );

        vault
            .register_plugin(&input)
            .await
            .with_context(|| format!("error registering plugin {} in vault", input.name))?;

        info!("registered plugin {}", input.name);
    }

    Ok(())
}

fn register_input(plugin: &Record) -> Result<RegisterPluginInput> {
    let command = get_or_error(plugin, "command").context("error getting command for plugin")?;
    let name =
        get_or_error(plugin, "plugin_name").context("error getting plugin_name for plugin")?;
    let sha256 = get_or_error(plugin, "sha256").context("error getting sha256 for plugin")?;
    let type_raw = get_or_error(plugin, "type").context("error getting type for plugin")?;
    let plugin_type = type_raw
        .parse::<PluginType>()
        .map_err(|_unknown| OperatorError::UnsupportedType {
            kind: "plugin",
            value: type_raw.clone(),
            supported: "'auth', 'database' or 'secret'",
        })
        .context("error parsing type for plugin")?;

    Ok(RegisterPluginInput {
        name,
        plugin_type,
        command,
        sha256,
        args: get_string_list(plugin, "args").context("error getting args for plugin")?,
        env: get_string_list(plugin, "env").context("error getting env for plugin")?,
    })
}
