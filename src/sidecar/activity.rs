use crate::api::v1::cluster::{INACTIVITY_MINUTES_ANNOTATION, SCALE_TO_ZERO_ENABLED_ANNOTATION};
use crate::api::v1::Cluster;
use crate::util::errors::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use kube::ResourceExt;
use tracing::{debug, warn};

pub const DEFAULT_INACTIVITY_MINUTES: i64 = 30;

/// Per-cluster scale-to-zero settings, read from the cluster annotations on every tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaleToZeroConfig {
    pub enabled: bool,
    pub inactivity_minutes: i64,
}

impl Default for ScaleToZeroConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            inactivity_minutes: DEFAULT_INACTIVITY_MINUTES,
        }
    }
}

impl ScaleToZeroConfig {
    pub fn from_cluster(cluster: &Cluster) -> Self {
        let annotations = cluster.annotations();
        let enabled = annotations
            .get(SCALE_TO_ZERO_ENABLED_ANNOTATION)
            .is_some_and(|v| v == "true");

        let inactivity_minutes = match annotations.get(INACTIVITY_MINUTES_ANNOTATION) {
            None => DEFAULT_INACTIVITY_MINUTES,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(minutes) if minutes >= 0 => minutes,
                _ => {
                    warn!(
                        "Invalid {} annotation {:?} on cluster {}, using {} minutes",
                        INACTIVITY_MINUTES_ANNOTATION,
                        raw,
                        cluster.name_any(),
                        DEFAULT_INACTIVITY_MINUTES
                    );
                    DEFAULT_INACTIVITY_MINUTES
                }
            },
        };

        Self {
            enabled,
            inactivity_minutes,
        }
    }
}

/// Outcome of feeding one session count into the tracker
#[derive(Debug)]
pub enum Verdict {
    Active,
    Inactive,
    /// The probe could not connect; it needs fresh credentials before asking again
    Reconnect(Error),
}

/// Remembers when the database last had client sessions.
///
/// `None` means tracking has not started yet, which counts as active.
#[derive(Clone, Debug, Default)]
pub struct ActivityTracker {
    last_active: Option<DateTime<Utc>>,
}

impl ActivityTracker {
    pub fn last_active(&self) -> Option<DateTime<Utc>> {
        self.last_active
    }

    pub fn reset(&mut self) {
        self.last_active = None;
    }

    pub(crate) fn mark_active(&mut self, at: DateTime<Utc>) {
        self.last_active = Some(at);
    }

    pub fn observe(&mut self, sessions: Result<i64>, inactivity_minutes: i64, now: DateTime<Utc>) -> Result<Verdict> {
        let count = match sessions {
            Ok(count) => count,
            Err(e) if e.is_connection_refused() => return Ok(Verdict::Reconnect(e)),
            Err(e) => return Err(e),
        };

        let last_active = match self.last_active {
            Some(last_active) if count == 0 => last_active,
            _ => {
                self.mark_active(now);
                return Ok(Verdict::Active);
            }
        };

        let idle = now - last_active;
        let window = Duration::try_minutes(inactivity_minutes).unwrap_or(Duration::MAX);
        if idle < window {
            debug!(
                "No sessions for {}s, hibernating after {} minutes",
                idle.num_seconds(),
                inactivity_minutes
            );
            return Ok(Verdict::Active);
        }
        Ok(Verdict::Inactive)
    }
}
