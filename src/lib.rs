//! Vault Bootstrap Library
//!
//! Initializes, unseals and configures a HashiCorp Vault server.
//!
//! - [`lifecycle`] drives init, unseal and raft join
//! - [`reconciler`] applies a declarative configuration document
//! - [`keystore`] persists unseal keys and the root token
//! - [`vault`] talks to the Vault HTTP API
//!
//! Tests are included in the module files and under `tests/`.

pub mod config;
pub mod constants;
pub mod error;
pub mod keystore;
pub mod lifecycle;
pub mod observability;
pub mod reconciler;
pub mod server;
pub mod vault;

pub use error::OperatorError;
