use crate::util::{errors::Result, metrics::Metrics};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where the monitored cluster stands as seen by the last tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Starting,
    Replica,
    Disabled,
    Active,
    Hibernating,
    Hibernated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let phase = match self {
            Phase::Starting => "starting",
            Phase::Replica => "replica",
            Phase::Disabled => "disabled",
            Phase::Active => "active",
            Phase::Hibernating => "hibernating",
            Phase::Hibernated => "hibernated",
        };
        f.write_str(phase)
    }
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Debug, Default, Serialize)]
pub struct Diagnostics {
    pub last_tick: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
    pub phase: Phase,
    pub open_sessions: Option<i64>,
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the controller
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a controller Context that can update State
    pub fn to_context(&self) -> Result<Arc<Context>> {
        Ok(Arc::new(Context {
            metrics: Metrics::new()?.register(&self.registry)?,
            diagnostics: self.diagnostics.clone(),
        }))
    }
}

// Context for the control loop
#[derive(Clone)]
pub struct Context {
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Metrics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn context_writes_are_visible_through_state() {
        let state = State::default();
        let ctx = state.to_context().unwrap();
        {
            let mut diagnostics = ctx.diagnostics.write().await;
            diagnostics.phase = Phase::Hibernated;
            diagnostics.open_sessions = Some(0);
        }
        ctx.metrics.hibernations.inc();

        let diagnostics = serde_json::to_value(state.diagnostics().await).unwrap();
        assert_eq!(diagnostics["phase"], json!("hibernated"));
        assert_eq!(diagnostics["open_sessions"], json!(0));
        assert!(state
            .metrics()
            .iter()
            .any(|family| family.get_name() == "scale_to_zero_hibernations_total"));
    }
}
