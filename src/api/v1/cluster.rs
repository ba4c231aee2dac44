use kube::core::{ApiResource, Object};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CLUSTER_KIND: &str = "Cluster";
pub const CLUSTER_PLURAL: &str = "clusters";

/// Phase reported by CNPG once every instance is up and replicating
pub const HEALTHY_CLUSTER_PHASE: &str = "Cluster in healthy state";

pub const HIBERNATION_ANNOTATION: &str = "cnpg.io/hibernation";
pub const HIBERNATION_ON: &str = "on";
pub const SCALE_TO_ZERO_ENABLED_ANNOTATION: &str = "xata.io/scale-to-zero-enabled";
pub const INACTIVITY_MINUTES_ANNOTATION: &str = "xata.io/scale-to-zero-inactivity-minutes";

/// A CNPG `Cluster`, addressed through a runtime [`ApiResource`]
pub type Cluster = Object<ClusterSpec, ClusterStatus>;

/// Opaque cluster spec, preserved verbatim across updates
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct ClusterSpec {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

pub fn cluster_resource(group: &str, version: &str) -> ApiResource {
    super::api_resource(group, version, CLUSTER_KIND, CLUSTER_PLURAL)
}

/// Accessors for the cluster fields the sidecar acts on
pub trait ClusterExt {
    fn current_primary(&self) -> &str;

    fn phase(&self) -> &str;

    fn is_hibernated(&self) -> bool;

    fn is_healthy(&self) -> bool {
        self.phase() == HEALTHY_CLUSTER_PHASE
    }

    /// A freshly bootstrapped cluster has no primary recorded yet; every pod
    /// counts as primary until CNPG fills it in.
    fn is_primary(&self, pod_name: &str) -> bool {
        let primary = self.current_primary();
        primary.is_empty() || primary == pod_name
    }
}

impl ClusterExt for Cluster {
    fn current_primary(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.current_primary.as_deref())
            .unwrap_or_default()
    }

    fn phase(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or_default()
    }

    fn is_hibernated(&self) -> bool {
        self.annotations()
            .get(HIBERNATION_ANNOTATION)
            .is_some_and(|v| v == HIBERNATION_ON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn primary_detection() {
        let cluster = fixtures::cluster("pg-1", HEALTHY_CLUSTER_PHASE);
        assert!(cluster.is_primary("pg-1"));
        assert!(!cluster.is_primary("pg-2"));

        let bootstrapping = fixtures::cluster("", "Setting up primary");
        assert!(bootstrapping.is_primary("pg-2"));
        assert!(!bootstrapping.is_healthy());

        let mut no_status = fixtures::cluster("pg-1", HEALTHY_CLUSTER_PHASE);
        no_status.status = None;
        assert!(no_status.is_primary("pg-3"));
        assert_eq!(no_status.phase(), "");
    }

    #[test]
    fn hibernation_marker() {
        let mut cluster = fixtures::cluster("pg-1", HEALTHY_CLUSTER_PHASE);
        assert!(!cluster.is_hibernated());

        cluster
            .annotations_mut()
            .insert(HIBERNATION_ANNOTATION.to_string(), "off".to_string());
        assert!(!cluster.is_hibernated());

        cluster
            .annotations_mut()
            .insert(HIBERNATION_ANNOTATION.to_string(), HIBERNATION_ON.to_string());
        assert!(cluster.is_hibernated());
    }

    #[test]
    fn unknown_fields_survive_an_update() {
        let original = json!({
            "apiVersion": "postgresql.cnpg.io/v1",
            "kind": "Cluster",
            "metadata": {
                "name": "pg",
                "namespace": "databases",
                "resourceVersion": "4711",
                "annotations": { "xata.io/scale-to-zero-enabled": "true" }
            },
            "spec": {
                "instances": 3,
                "storage": { "size": "10Gi" },
                "plugins": [{ "name": "cnpg-i-scale-to-zero.xata.io" }]
            },
            "status": {
                "currentPrimary": "pg-1",
                "phase": "Cluster in healthy state",
                "readyInstances": 3
            }
        });

        let cluster: Cluster = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(cluster.current_primary(), "pg-1");
        assert!(cluster.is_healthy());
        assert_json_eq!(serde_json::to_value(&cluster).unwrap(), original);
    }
}
