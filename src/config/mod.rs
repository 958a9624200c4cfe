//! # Configuration
//!
//! - [`BootstrapConfig`] - validated init parameters (shares, threshold, root token handling)
//! - [`OperatorConfig`] - process-level settings loaded from environment variables
//! - [`PodEnvironment`] - values the pod runtime injects (pod name, CA paths, namespace)

mod bootstrap;
mod operator;

pub use bootstrap::BootstrapConfig;
pub use operator::{OperatorConfig, PodEnvironment};
