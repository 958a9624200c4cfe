//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `vault_bootstrap_operations_total` - Lifecycle and configure operations by operation
//! - `vault_bootstrap_operation_errors_total` - Failed operations by operation
//! - `vault_bootstrap_unseal_attempts_total` - Unseal keys submitted to Vault
//! - `vault_bootstrap_configure_duration_seconds` - Duration of a full configure run
//! - `vault_bootstrap_vault_sealed` - Last observed seal state (1 sealed, 0 unsealed)

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_bootstrap_operations_total",
            "Total number of operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create OPERATIONS_TOTAL metric - this should never happen")
});

static OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_bootstrap_operation_errors_total",
            "Total number of failed operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static UNSEAL_ATTEMPTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_bootstrap_unseal_attempts_total",
        "Total number of unseal keys submitted to Vault",
    )
    .expect("Failed to create UNSEAL_ATTEMPTS_TOTAL metric - this should never happen")
});

static CONFIGURE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "vault_bootstrap_configure_duration_seconds",
            "Duration of a configure run in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create CONFIGURE_DURATION metric - this should never happen")
});

static VAULT_SEALED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "vault_bootstrap_vault_sealed",
        "Last observed seal state of Vault (1 sealed, 0 unsealed)",
    )
    .expect("Failed to create VAULT_SEALED metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UNSEAL_ATTEMPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFIGURE_DURATION.clone()))?;
    REGISTRY.register(Box::new(VAULT_SEALED.clone()))?;
    Ok(())
}

pub fn increment_operations(operation: &str) {
    OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn increment_operation_errors(operation: &str) {
    OPERATION_ERRORS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn increment_unseal_attempts() {
    UNSEAL_ATTEMPTS_TOTAL.inc();
}

pub fn observe_configure_duration(duration: f64) {
    CONFIGURE_DURATION.observe(duration);
}

pub fn set_vault_sealed(sealed: bool) {
    VAULT_SEALED.set(i64::from(sealed));
}

/// Record the outcome of an operation
///
/// Counts every call and, when `result` is an error, the failure as well.
pub fn record_operation<T, E>(operation: &str, result: &std::result::Result<T, E>) {
    increment_operations(operation);
    if result.is_err() {
        increment_operation_errors(operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_record_operation_counts_errors() {
        let before = OPERATIONS_TOTAL.with_label_values(&["test_op"]).get();
        let errors_before = OPERATION_ERRORS_TOTAL.with_label_values(&["test_op"]).get();

        record_operation::<(), ()>("test_op", &Ok(()));
        record_operation::<(), ()>("test_op", &Err(()));

        assert_eq!(OPERATIONS_TOTAL.with_label_values(&["test_op"]).get(), before + 2);
        assert_eq!(
            OPERATION_ERRORS_TOTAL.with_label_values(&["test_op"]).get(),
            errors_before + 1
        );
    }

    #[test]
    fn test_set_vault_sealed() {
        set_vault_sealed(true);
        assert_eq!(VAULT_SEALED.get(), 1);
        set_vault_sealed(false);
        assert_eq!(VAULT_SEALED.get(), 0);
    }
}
