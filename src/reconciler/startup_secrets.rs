//! # Startup Secrets
//!
//! Seeds `kv` and `pki` secrets at configure time.
//!
//! A `secretKeyRef` list in `data` replaces the data with values read through the
//! [`SecretResolver`], written under a `data` key as KV v2 expects.

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use tracing::info;

use super::document::{get_or_default_map, get_or_error, value_to_string, Record};
use super::resolver::SecretResolver;
use super::write_with_warning_check;
use crate::error::OperatorError;
use crate::vault::VaultAdmin;

pub async fn configure_startup_secrets(
    vault: &dyn VaultAdmin,
    resolver: Option<&dyn SecretResolver>,
    secrets: &[Record],
) -> Result<()> {
    for secret in secrets {
        let secret_type =
            get_or_error(secret, "type").context("error finding type for startup secret")?;

        match secret_type.as_str() {
            "kv" => {
                let (path, data) = read_startup_secret(secret, resolver)
                    .await
                    .context("unable to read 'kv' startup secret")?;

                write_with_warning_check(vault, &path, &data)
                    .await
                    .with_context(|| format!("error writing data for startup 'kv' secret '{path}'"))?;
                info!("wrote startup 'kv' secret {}", path);
            }
            "pki" => {
                let (path, data) = read_startup_secret(secret, resolver)
                    .await
                    .context("unable to read 'pki' startup secret")?;

                let cert_data = generate_cert_payload(data.get("data"))
                    .context("error generating 'pki' startup secret")?;

                write_with_warning_check(vault, &path, &cert_data)
                    .await
                    .with_context(|| format!("error writing data for startup 'pki' secret '{path}'"))?;
                info!("wrote startup 'pki' secret {}", path);
            }
            other => {
                return Err(OperatorError::UnsupportedType {
                    kind: "startup secret",
                    value: other.to_string(),
                    supported: "'kv' or 'pki'",
                }
                .into());
            }
        }
    }

    Ok(())
}

async fn read_startup_secret(
    secret: &Record,
    resolver: Option<&dyn SecretResolver>,
) -> Result<(String, Map<String, Value>)> {
    let path = get_or_error(secret, "path").context("error finding path for startup secret")?;

    let mut data = get_or_default_map(secret, "data")
        .with_context(|| format!("error getting data for startup secret '{path}'"))?;

    if let Some(refs) = data.get("secretKeyRef").cloned() {
        data = resolve_secret_key_refs(&refs, resolver)
            .await
            .context("error getting data from k8s secret")?;
    }

    Ok((path, data))
}

async fn resolve_secret_key_refs(
    refs: &Value,
    resolver: Option<&dyn SecretResolver>,
) -> Result<Map<String, Value>> {
    let refs = refs
        .as_array()
        .ok_or_else(|| OperatorError::Configuration("secretKeyRef must be a list".to_string()))?;
    let resolver = resolver.ok_or_else(|| anyhow!("no secret resolver configured for secretKeyRef"))?;

    let mut resolved = Map::new();
    for key_ref in refs {
        let key_ref = key_ref.as_object().ok_or_else(|| {
            OperatorError::Configuration(format!("secretKeyRef entry is not a map: {key_ref}"))
        })?;
        let name = get_or_error(key_ref, "name")?;
        let key = get_or_error(key_ref, "key")?;

        let value = resolver.resolve(&name, &key).await?;
        resolved.insert(key, Value::String(value));
    }

    let mut data = Map::new();
    data.insert("data".to_string(), Value::Object(resolved));
    Ok(data)
}

/// Join the values of a string map into a `pem_bundle`
///
/// Map order is not significant, Vault parses the bundle by PEM block type.
fn generate_cert_payload(data: Option<&Value>) -> Result<Map<String, Value>, OperatorError> {
    let pki_data = match data {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(OperatorError::Configuration(format!(
                "pki data is not a map: {other}"
            )))
        }
    };

    let values = pki_data
        .iter()
        .map(|(key, value)| {
            value_to_string(value).ok_or_else(|| {
                OperatorError::Configuration(format!("pki data {key} is not a string"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if values.len() < 2 {
        return Err(OperatorError::Configuration(format!(
            "missing key or certificate in pki data: {:?}",
            pki_data.keys().collect::<Vec<_>>()
        )));
    }

    let mut payload = Map::new();
    payload.insert("pem_bundle".to_string(), Value::String(values.join("\n")));
    Ok(payload)
}
