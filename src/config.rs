use crate::api::v1::{CNPG_GROUP, CNPG_VERSION};
use crate::util::errors::{Error, Result};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Namespace and name of the monitored cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterRef {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Sidecar settings, resolved once at startup and handed to every component.
#[derive(Clone, Debug)]
pub struct Config {
    pub cluster: ClusterRef,
    pub pod_name: String,
    pub log_level: String,
    pub cnpg_group: String,
    pub cnpg_version: String,
    pub check_interval: Duration,
    pub cluster_refresh_interval: Duration,
    pub metrics_bind_address: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| Error::ConfigError(format!("missing required {} setting", key)))
        };

        let namespace = required("NAMESPACE")?;
        let name = required("CLUSTER_NAME")?;
        let pod_name = required("POD_NAME")?;

        let check_interval =
            seconds(get("CHECK_INTERVAL_SECONDS"), "CHECK_INTERVAL_SECONDS")?.unwrap_or(DEFAULT_CHECK_INTERVAL);
        if check_interval.is_zero() {
            return Err(Error::ConfigError(
                "CHECK_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }

        let cluster_refresh_interval = seconds(
            get("CLUSTER_REFRESH_INTERVAL_SECONDS"),
            "CLUSTER_REFRESH_INTERVAL_SECONDS",
        )?
        .filter(|d| !d.is_zero())
        .unwrap_or(DEFAULT_REFRESH_INTERVAL);

        Ok(Config {
            cluster: ClusterRef { namespace, name },
            pod_name,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            cnpg_group: get("CUSTOM_CNPG_GROUP").unwrap_or_else(|| CNPG_GROUP.to_string()),
            cnpg_version: get("CUSTOM_CNPG_VERSION").unwrap_or_else(|| CNPG_VERSION.to_string()),
            check_interval,
            cluster_refresh_interval,
            metrics_bind_address: get("METRICS_BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
        })
    }
}

fn seconds(value: Option<String>, key: &str) -> Result<Option<Duration>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| Error::ConfigError(format!("invalid {} value {:?}: {}", key, v, e)))
        })
        .transpose()
}
