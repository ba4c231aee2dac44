use kube::core::{ApiResource, Object};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SCHEDULED_BACKUP_KIND: &str = "ScheduledBackup";
pub const SCHEDULED_BACKUP_PLURAL: &str = "scheduledbackups";

/// A CNPG `ScheduledBackup`; the one belonging to a cluster shares its name
pub type ScheduledBackup = Object<ScheduledBackupSpec, Value>;

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct ScheduledBackupSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ScheduledBackupSpec {
    pub fn is_suspended(&self) -> bool {
        self.suspend.unwrap_or(false)
    }
}

pub fn scheduled_backup_resource(group: &str, version: &str) -> ApiResource {
    super::api_resource(group, version, SCHEDULED_BACKUP_KIND, SCHEDULED_BACKUP_PLURAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn suspend_is_written_next_to_the_schedule() {
        let mut backup: ScheduledBackup = serde_json::from_value(json!({
            "apiVersion": "postgresql.cnpg.io/v1",
            "kind": "ScheduledBackup",
            "metadata": { "name": "pg", "namespace": "databases" },
            "spec": {
                "schedule": "0 0 0 * * *",
                "cluster": { "name": "pg" }
            }
        }))
        .unwrap();
        assert!(!backup.spec.is_suspended());

        backup.spec.suspend = Some(true);
        let spec = serde_json::to_value(&backup).unwrap()["spec"].clone();
        assert_eq!(
            spec,
            json!({ "suspend": true, "schedule": "0 0 0 * * *", "cluster": { "name": "pg" } })
        );
    }
}
