use crate::api::v1::cluster::{HIBERNATION_ANNOTATION, HIBERNATION_ON};
use crate::api::v1::ClusterExt;
use crate::config::{ClusterRef, Config};
use crate::postgres::{ActivityProbe, ProbeFactory};
use crate::sidecar::activity::{ActivityTracker, ScaleToZeroConfig, Verdict};
use crate::sidecar::cluster_client::ClusterStore;
use crate::sidecar::state::{Context, Phase};
use crate::util::errors::Result;
use chrono::Utc;
use kube::ResourceExt;
use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::*;

/// Why the control loop stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Shutdown,
    /// Another pod took over the primary role while we were hibernating the cluster
    Demoted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::Shutdown => f.write_str("shutdown requested"),
            Outcome::Demoted => f.write_str("pod is no longer the primary"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hibernation {
    Requested,
    AlreadyHibernated,
    Unhealthy,
}

/// Watches the sessions of the primary and hibernates the cluster once it has been idle long enough
pub struct ScaleToZero {
    store: Box<dyn ClusterStore>,
    probe: Box<dyn ActivityProbe>,
    probe_factory: ProbeFactory,
    pod_name: String,
    cluster_ref: ClusterRef,
    check_interval: Duration,
    tracker: ActivityTracker,
    ctx: Arc<Context>,
}

impl ScaleToZero {
    /// Fails when the superuser credentials cannot be read.
    pub async fn new(
        config: &Config,
        store: Box<dyn ClusterStore>,
        probe_factory: ProbeFactory,
        ctx: Arc<Context>,
    ) -> Result<Self> {
        let credentials = store.get_credentials().await?;
        let probe = probe_factory(&credentials)?;
        Ok(Self {
            store,
            probe,
            probe_factory,
            pod_name: config.pod_name.clone(),
            cluster_ref: config.cluster.clone(),
            check_interval: config.check_interval,
            tracker: ActivityTracker::default(),
            ctx,
        })
    }

    /// Tick until `shutdown` resolves or the pod loses the primary role.
    ///
    /// The first check happens one interval after start. Ticks never overlap,
    /// and a tick in flight is abandoned when `shutdown` fires.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Outcome {
        tokio::pin!(shutdown);
        let mut ticker = interval_at(Instant::now() + self.check_interval, self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => break Outcome::Shutdown,
                flow = async {
                    ticker.tick().await;
                    self.tick().await
                } => {
                    if let ControlFlow::Break(outcome) = flow {
                        break outcome;
                    }
                }
            }
        };

        self.probe.close().await;
        info!("Stopped monitoring cluster {}: {}", self.cluster_ref, outcome);
        outcome
    }

    #[instrument(skip(self), fields(cluster = %self.cluster_ref, pod = %self.pod_name))]
    async fn tick(&mut self) -> ControlFlow<Outcome> {
        let _timer = self.ctx.metrics.count_and_measure();
        self.ctx.diagnostics.write().await.last_tick = Some(Utc::now());

        match self.check().await {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) if e.is_not_primary() => {
                warn!("Stopping scale to zero: {}", e);
                ControlFlow::Break(Outcome::Demoted)
            }
            Err(e) => {
                error!("Activity check failed: {}", e);
                self.ctx.metrics.tick_failure(&e);
                ControlFlow::Continue(())
            }
        }
    }

    async fn check(&mut self) -> Result<()> {
        let cluster = self.store.get_cluster(false).await?;

        // only the primary tracks activity; a new primary after a switchover starts from scratch
        if !cluster.is_primary(&self.pod_name) {
            self.tracker.reset();
            info!(
                "Running on non-primary pod, skipping activity monitoring (primary is {})",
                cluster.current_primary()
            );
            self.publish(Phase::Replica).await;
            return Ok(());
        }

        let config = ScaleToZeroConfig::from_cluster(&cluster);
        if !config.enabled {
            self.tracker.reset();
            info!("Scale to zero is disabled, skipping check");
            self.publish(Phase::Disabled).await;
            return Ok(());
        }

        if self.check_activity(config.inactivity_minutes).await? {
            self.publish(Phase::Active).await;
            return Ok(());
        }

        info!(
            "No sessions for {} minutes, hibernating cluster",
            config.inactivity_minutes
        );
        self.publish(Phase::Hibernating).await;
        if self.hibernate().await? == Hibernation::Unhealthy {
            return Ok(());
        }
        self.publish(Phase::Hibernated).await;

        // the cluster is hibernated either way, a failed suspension does not fail the tick
        if let Err(e) = self.suspend_scheduled_backup().await {
            error!("Failed to suspend scheduled backup: {}", e);
            self.ctx.metrics.tick_failure(&e);
        }
        Ok(())
    }

    /// Whether the database had sessions within the inactivity window.
    ///
    /// A refused connection rebuilds the probe from freshly read credentials
    /// and asks once more.
    async fn check_activity(&mut self, inactivity_minutes: i64) -> Result<bool> {
        let sessions = self.count_sessions().await;
        let verdict = match self.tracker.observe(sessions, inactivity_minutes, Utc::now())? {
            Verdict::Reconnect(e) => {
                warn!("Connection to PostgreSQL failed ({}), refreshing credentials", e);
                self.reinit_probe().await?;
                let sessions = self.count_sessions().await;
                match self.tracker.observe(sessions, inactivity_minutes, Utc::now())? {
                    Verdict::Reconnect(e) => return Err(e),
                    verdict => verdict,
                }
            }
            verdict => verdict,
        };
        Ok(matches!(verdict, Verdict::Active))
    }

    async fn count_sessions(&self) -> Result<i64> {
        let sessions = self.probe.count_active_sessions().await;
        if let Ok(count) = sessions {
            info!("Open sessions: {}", count);
            self.ctx.metrics.open_sessions.set(count);
            self.ctx.diagnostics.write().await.open_sessions = Some(count);
        }
        sessions
    }

    /// Swap in a probe built from the current secret; the old pool is closed.
    async fn reinit_probe(&mut self) -> Result<()> {
        let credentials = self.store.get_credentials().await?;
        let probe = (self.probe_factory)(&credentials)?;
        let previous = std::mem::replace(&mut self.probe, probe);
        previous.close().await;
        Ok(())
    }

    /// Write the hibernation marker on a freshly read, healthy cluster.
    pub async fn hibernate(&mut self) -> Result<Hibernation> {
        let mut cluster = self.store.get_cluster(true).await?;

        if !cluster.is_healthy() {
            info!(
                "Cluster is not healthy ({:?}), skipping hibernation",
                cluster.phase()
            );
            return Ok(Hibernation::Unhealthy);
        }
        if cluster.is_hibernated() {
            info!("Cluster is already hibernated");
            return Ok(Hibernation::AlreadyHibernated);
        }

        cluster
            .annotations_mut()
            .insert(HIBERNATION_ANNOTATION.to_string(), HIBERNATION_ON.to_string());
        info!("Annotating cluster {} for hibernation", cluster.name_any());
        self.store.update_cluster(&cluster).await?;
        self.ctx.metrics.hibernations.inc();
        Ok(Hibernation::Requested)
    }

    async fn suspend_scheduled_backup(&self) -> Result<()> {
        let mut backup = match self.store.get_scheduled_backup().await {
            Ok(backup) => backup,
            Err(e) if e.is_not_found() => {
                debug!("No scheduled backup for cluster {}, nothing to suspend", self.cluster_ref);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if backup.spec.is_suspended() {
            debug!("Scheduled backup {} is already suspended", backup.name_any());
            return Ok(());
        }

        info!("Suspending scheduled backup {}", backup.name_any());
        backup.spec.suspend = Some(true);
        self.store.update_scheduled_backup(&backup).await?;
        self.ctx.metrics.backup_suspensions.inc();
        Ok(())
    }

    async fn publish(&self, phase: Phase) {
        let mut diagnostics = self.ctx.diagnostics.write().await;
        diagnostics.phase = phase;
        diagnostics.last_active = self.tracker.last_active();
    }
}
