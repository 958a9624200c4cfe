//! # Audit Devices
//!
//! Enables audit devices that are not mounted yet. An existing device at the same
//! path is left untouched.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use super::document::{get_or_default, get_or_default_map, get_or_error, value_to_string, Record};
use crate::error::OperatorError;
use crate::vault::{EnableAuditOptions, VaultAdmin};

pub async fn configure_audit_devices(vault: &dyn VaultAdmin, devices: &[Record]) -> Result<()> {
    for device in devices {
        let device_type =
            get_or_error(device, "type").context("error finding type for audit device")?;

        let path = match device.get("path") {
            Some(Value::Null) | None => device_type.clone(),
            Some(_) => get_or_error(device, "path")
                .context("error converting path for audit device")?
                .trim_matches('/')
                .to_string(),
        };

        let mounts = vault
            .list_audit()
            .await
            .context("error reading audit mounts from vault")?;
        info!("already existing audit devices: {:?}", mounts.keys().collect::<Vec<_>>());

        if mounts.contains_key(&format!("{path}/")) {
            info!("audit device is already mounted: {}/", path);
            continue;
        }

        let options = audit_options(device).context("error parsing audit options")?;
        info!(
            audit_type = %options.kind,
            options = ?options.options,
            "enabling audit device"
        );
        vault
            .enable_audit(&path, &options)
            .await
            .with_context(|| format!("error enabling audit device {path} in vault"))?;

        info!("mounted audit device {} to {}", device_type, path);
    }

    Ok(())
}

/// Decode the record fields into enable options
fn audit_options(device: &Record) -> Result<EnableAuditOptions, OperatorError> {
    let options = get_or_default_map(device, "options")?
        .into_iter()
        .map(|(key, value)| {
            value_to_string(&value)
                .map(|value| (key.clone(), value))
                .ok_or_else(|| {
                    OperatorError::Configuration(format!("audit option {key} is not a string"))
                })
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let local = match device.get("local") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(local)) => *local,
        Some(other) => value_to_string(other).is_some_and(|s| s == "true"),
    };

    Ok(EnableAuditOptions {
        kind: get_or_error(device, "type")?,
        description: get_or_default(device, "description")?,
        options,
        local,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audit_options_stringifies_scalars() {
        let device = json!({
            "type": "file",
            "description": "file audit",
            "options": { "file_path": "/vault/audit.log", "hmac_accessor": false, "mode": 600 }
        })
        .as_object()
        .cloned()
        .unwrap();

        let options = audit_options(&device).unwrap();
        assert_eq!(options.kind, "file");
        assert_eq!(options.description, "file audit");
        assert_eq!(options.options["hmac_accessor"], "false");
        assert_eq!(options.options["mode"], "600");
        assert!(!options.local);
    }
}
