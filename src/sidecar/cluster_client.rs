use crate::api::v1::cluster::cluster_resource;
use crate::api::v1::scheduled_backup::scheduled_backup_resource;
use crate::api::v1::{Cluster, ClusterExt, ScheduledBackup};
use crate::config::{ClusterRef, Config};
use crate::util::errors::{Error, Result};
use crate::util::secrets::{superuser_secret_name, Credentials};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, PostParams},
    core::ApiResource,
    Client, ResourceExt,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

/// Access to the monitored cluster and the objects that hang off it
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Cached cluster, refetched when stale or when `force_refresh` is set
    async fn get_cluster(&mut self, force_refresh: bool) -> Result<Cluster>;

    /// Full-object update, guarded by the object's resource version.
    ///
    /// Fails with [`Error::NotPrimary`] when the write lost a race against a
    /// switchover that moved the primary away from this pod.
    async fn update_cluster(&mut self, cluster: &Cluster) -> Result<Cluster>;

    async fn get_credentials(&self) -> Result<Credentials>;

    /// Fails with [`Error::NotFound`] when the cluster has no scheduled backup
    async fn get_scheduled_backup(&self) -> Result<ScheduledBackup>;

    async fn update_scheduled_backup(&self, backup: &ScheduledBackup) -> Result<ScheduledBackup>;
}

struct CachedCluster {
    cluster: Cluster,
    fetched_at: Instant,
}

pub struct KubeClusterStore {
    client: Client,
    cluster_ref: ClusterRef,
    pod_name: String,
    cluster_resource: ApiResource,
    backup_resource: ApiResource,
    refresh_interval: Duration,
    cache: Option<CachedCluster>,
}

impl KubeClusterStore {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            cluster_ref: config.cluster.clone(),
            pod_name: config.pod_name.clone(),
            cluster_resource: cluster_resource(&config.cnpg_group, &config.cnpg_version),
            backup_resource: scheduled_backup_resource(&config.cnpg_group, &config.cnpg_version),
            refresh_interval: config.cluster_refresh_interval,
            cache: None,
        }
    }

    fn clusters(&self) -> Api<Cluster> {
        Api::namespaced_with(self.client.clone(), &self.cluster_ref.namespace, &self.cluster_resource)
    }

    fn scheduled_backups(&self) -> Api<ScheduledBackup> {
        Api::namespaced_with(self.client.clone(), &self.cluster_ref.namespace, &self.backup_resource)
    }

    fn store(&mut self, cluster: &Cluster) {
        self.cache = Some(CachedCluster {
            cluster: cluster.clone(),
            fetched_at: Instant::now(),
        });
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get_cluster(&mut self, force_refresh: bool) -> Result<Cluster> {
        if !force_refresh {
            if let Some(cached) = &self.cache {
                if cached.fetched_at.elapsed() < self.refresh_interval {
                    debug!("Using cached cluster {}", self.cluster_ref);
                    return Ok(cached.cluster.clone());
                }
            }
        }

        // a failed fetch leaves the previous cache entry in place
        let cluster = self.clusters().get(&self.cluster_ref.name).await?;
        self.store(&cluster);
        Ok(cluster)
    }

    async fn update_cluster(&mut self, cluster: &Cluster) -> Result<Cluster> {
        match self
            .clusters()
            .replace(&cluster.name_any(), &PostParams::default(), cluster)
            .await
        {
            Ok(updated) => {
                self.store(&updated);
                Ok(updated)
            }
            Err(kube::Error::Api(resp)) if resp.code == 409 => {
                warn!("Update of cluster {} conflicted: {}", self.cluster_ref, resp.message);
                let current = self.get_cluster(true).await?;
                if current.is_primary(&self.pod_name) {
                    Err(Error::Conflict(resp.message))
                } else {
                    Err(Error::NotPrimary(format!(
                        "pod {} is no longer the primary of {}, current primary is {}",
                        self.pod_name,
                        self.cluster_ref,
                        current.current_primary()
                    )))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_credentials(&self) -> Result<Credentials> {
        let secret_name = superuser_secret_name(&self.cluster_ref.name);
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &self.cluster_ref.namespace);
        let secret = secrets.get(&secret_name).await?;
        let credentials = Credentials::from_secret(&secret)?;
        info!("Retrieved PostgreSQL credentials from secret {}", secret_name);
        Ok(credentials)
    }

    async fn get_scheduled_backup(&self) -> Result<ScheduledBackup> {
        Ok(self.scheduled_backups().get(&self.cluster_ref.name).await?)
    }

    async fn update_scheduled_backup(&self, backup: &ScheduledBackup) -> Result<ScheduledBackup> {
        Ok(self
            .scheduled_backups()
            .replace(&backup.name_any(), &PostParams::default(), backup)
            .await?)
    }
}
