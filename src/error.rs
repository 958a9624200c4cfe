//! # Errors
//!
//! Typed error causes raised by the lifecycle controller and the reconciler.
//!
//! Operations return `anyhow::Result` and wrap these with `.context(...)` naming
//! the lifecycle phase or configuration category. Callers that need to branch on
//! a specific condition use `err.downcast_ref::<OperatorError>()`, which sees
//! through the context layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperatorError {
    /// Invalid process or document configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required field is absent from a declarative record
    #[error("value for {0} is not set")]
    MissingField(String),

    /// A record carries a type this operator does not handle
    #[error("'{value}' {kind} type is not supported, only {supported}")]
    UnsupportedType {
        kind: &'static str,
        value: String,
        supported: &'static str,
    },

    /// A key about to be written already exists in the key store
    #[error("value for key '{0}' already exists")]
    KeyConflict(String),

    /// Vault reset the unseal progress to zero after a key was submitted
    #[error("failed to unseal vault with key '{0}', are you using the right unseal keys?")]
    BadUnsealKey(String),

    /// Vault was initialized but not every key share could be stored
    ///
    /// Vault cannot be re-initialized, the missing shares must be recovered by hand.
    #[error("vault was initialized but storing keys failed for {failed:?} (stored: {stored:?})")]
    PartialPersistence {
        stored: Vec<String>,
        failed: Vec<String>,
    },

    /// A polling loop ran out of attempts
    #[error("gave up waiting for {what} after {attempts} attempts")]
    WaitExhausted { what: &'static str, attempts: u32 },

    /// A polling loop was cancelled by shutdown
    #[error("cancelled while waiting for {0}")]
    Cancelled(&'static str),

    /// Vault returned a response this operator cannot act on
    #[error("{operation}: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },
}

impl OperatorError {
    /// Whether the error is the unseal progress reset signal
    #[must_use]
    pub fn is_bad_unseal_key(&self) -> bool {
        matches!(self, OperatorError::BadUnsealKey(_))
    }
}

/// Find an `OperatorError` anywhere in an `anyhow` chain
#[must_use]
pub fn find_operator_error(err: &anyhow::Error) -> Option<&OperatorError> {
    err.chain().find_map(|cause| cause.downcast_ref::<OperatorError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_operator_error_survives_context() {
        let result: anyhow::Result<()> = Err(OperatorError::KeyConflict("vault-root".into()))
            .context("error before init");
        let err = result.unwrap_err();
        assert!(matches!(
            find_operator_error(&err),
            Some(OperatorError::KeyConflict(key)) if key == "vault-root"
        ));
    }

    #[test]
    fn test_unsupported_type_message() {
        let err = OperatorError::UnsupportedType {
            kind: "startup secret",
            value: "ssh".into(),
            supported: "'kv' or 'pki'",
        };
        assert_eq!(
            err.to_string(),
            "'ssh' startup secret type is not supported, only 'kv' or 'pki'"
        );
    }
}
