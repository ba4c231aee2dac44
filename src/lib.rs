/// CNPG resource types
pub mod api;

/// Startup settings
pub mod config;
pub use config::Config;

/// Session counting against the local instance
pub mod postgres;

/// Expose all sidecar components used by main
pub mod sidecar;

/// Errors, metrics, secrets, and log integrations
pub mod util;

#[cfg(test)]
pub mod fixtures;
