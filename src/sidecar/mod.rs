/// Cached access to the cluster and the objects that hang off it
pub mod cluster_client;
pub use cluster_client::{ClusterStore, KubeClusterStore};

/// Activity tracking and per-cluster settings
pub mod activity;

/// The control loop
pub mod scale_to_zero;
pub use scale_to_zero::{Outcome, ScaleToZero};

/// State shared with the web server
pub mod state;
pub use state::{Context, Diagnostics, State};
