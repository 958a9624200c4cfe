//! # Bootstrap Configuration
//!
//! Parameters of the one-time Vault initialization.

use crate::error::OperatorError;

/// Configuration of the Vault initialization
///
/// Built once per process run and immutable afterwards. The invariant
/// `1 <= secret_threshold <= secret_shares` is checked by [`BootstrapConfig::new`].
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    secret_shares: u32,
    secret_threshold: u32,
    init_root_token: Option<String>,
    store_root_token: bool,
    pre_flight_checks: bool,
}

// Keep the fixed root token out of logs
impl std::fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("secret_shares", &self.secret_shares)
            .field("secret_threshold", &self.secret_threshold)
            .field("init_root_token", &self.init_root_token.as_ref().map(|_| "<redacted>"))
            .field("store_root_token", &self.store_root_token)
            .field("pre_flight_checks", &self.pre_flight_checks)
            .finish()
    }
}

impl BootstrapConfig {
    /// Create a new bootstrap configuration
    ///
    /// An empty `init_root_token` is treated as unset.
    ///
    /// # Errors
    /// Returns [`OperatorError::Configuration`] if `secret_shares` is zero, if
    /// `secret_threshold` is zero, or if the threshold is bigger than the shares.
    pub fn new(
        secret_shares: u32,
        secret_threshold: u32,
        init_root_token: Option<String>,
        store_root_token: bool,
        pre_flight_checks: bool,
    ) -> Result<Self, OperatorError> {
        if secret_shares == 0 {
            return Err(OperatorError::Configuration(
                "the secret shares must be at least 1".to_string(),
            ));
        }
        if secret_threshold == 0 {
            return Err(OperatorError::Configuration(
                "the secret threshold must be at least 1".to_string(),
            ));
        }
        if secret_shares < secret_threshold {
            return Err(OperatorError::Configuration(format!(
                "the secret threshold can't be bigger than the shares [{secret_shares} < {secret_threshold}]"
            )));
        }

        Ok(Self {
            secret_shares,
            secret_threshold,
            init_root_token: init_root_token.filter(|token| !token.is_empty()),
            store_root_token,
            pre_flight_checks,
        })
    }

    #[must_use]
    pub fn secret_shares(&self) -> u32 {
        self.secret_shares
    }

    #[must_use]
    pub fn secret_threshold(&self) -> u32 {
        self.secret_threshold
    }

    #[must_use]
    pub fn init_root_token(&self) -> Option<&str> {
        self.init_root_token.as_deref()
    }

    #[must_use]
    pub fn store_root_token(&self) -> bool {
        self.store_root_token
    }

    #[must_use]
    pub fn pre_flight_checks(&self) -> bool {
        self.pre_flight_checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_within_shares_is_accepted() {
        for shares in 1..=10 {
            for threshold in 1..=shares {
                let config = BootstrapConfig::new(shares, threshold, None, true, true)
                    .expect("valid configuration");
                assert_eq!(config.secret_shares(), shares);
                assert_eq!(config.secret_threshold(), threshold);
            }
        }
    }

    #[test]
    fn test_threshold_bigger_than_shares_is_rejected() {
        for shares in 1..=10 {
            for threshold in (shares + 1)..=12 {
                let err = BootstrapConfig::new(shares, threshold, None, true, true).unwrap_err();
                assert!(matches!(err, OperatorError::Configuration(_)));
            }
        }
    }

    #[test]
    fn test_zero_values_are_rejected() {
        assert!(BootstrapConfig::new(0, 0, None, true, true).is_err());
        assert!(BootstrapConfig::new(3, 0, None, true, true).is_err());
    }

    #[test]
    fn test_empty_root_token_is_unset() {
        let config = BootstrapConfig::new(1, 1, Some(String::new()), false, false).unwrap();
        assert_eq!(config.init_root_token(), None);
    }

    #[test]
    fn test_debug_redacts_root_token() {
        let config = BootstrapConfig::new(1, 1, Some("s.fixed".to_string()), true, false).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s.fixed"));
        assert!(rendered.contains("<redacted>"));
    }
}
