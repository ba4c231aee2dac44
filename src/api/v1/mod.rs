//! CloudNativePG resources read and written by the sidecar.
//!
//! The sidecar does not own these CRDs, so only the fields it needs are typed;
//! everything else is carried through untouched so full-object updates do not
//! drop data the operator relies on.
use kube::core::{ApiResource, GroupVersionKind};

pub mod cluster;
pub mod scheduled_backup;

pub use cluster::{Cluster, ClusterExt, ClusterSpec, ClusterStatus};
pub use scheduled_backup::{ScheduledBackup, ScheduledBackupSpec};

pub const CNPG_GROUP: &str = "postgresql.cnpg.io";
pub const CNPG_VERSION: &str = "v1";

/// API resource for a CNPG kind, allowing operators that serve the CNPG types under a custom group.
pub fn api_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
}
