use crate::util::errors::{Error, Result};
use prometheus::{histogram_opts, opts, Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub ticks: IntCounter,
    pub failures: IntCounterVec,
    pub tick_duration: Histogram,
    pub hibernations: IntCounter,
    pub backup_suspensions: IntCounter,
    pub open_sessions: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let tick_duration = Histogram::with_opts(
            histogram_opts!(
                "scale_to_zero_tick_duration_seconds",
                "The duration of an activity check in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]),
        )?;
        let failures = IntCounterVec::new(
            opts!("scale_to_zero_tick_errors_total", "activity check errors"),
            &["error"],
        )?;
        let ticks = IntCounter::new("scale_to_zero_ticks_total", "activity checks")?;
        let hibernations = IntCounter::new(
            "scale_to_zero_hibernations_total",
            "hibernation requests written to the cluster",
        )?;
        let backup_suspensions = IntCounter::new(
            "scale_to_zero_backup_suspensions_total",
            "scheduled backups suspended after hibernation",
        )?;
        let open_sessions = IntGauge::new(
            "scale_to_zero_open_sessions",
            "client sessions seen by the last activity check",
        )?;
        Ok(Metrics {
            ticks,
            failures,
            tick_duration,
            hibernations,
            backup_suspensions,
            open_sessions,
        })
    }

    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self> {
        registry.register(Box::new(self.tick_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.ticks.clone()))?;
        registry.register(Box::new(self.hibernations.clone()))?;
        registry.register(Box::new(self.backup_suspensions.clone()))?;
        registry.register(Box::new(self.open_sessions.clone()))?;
        Ok(self)
    }

    pub fn tick_failure(&self, e: &Error) {
        self.failures.with_label_values(&[e.metric_label().as_ref()]).inc()
    }

    pub fn count_and_measure(&self) -> TickMeasurer {
        self.ticks.inc();
        TickMeasurer {
            start: Instant::now(),
            metric: self.tick_duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct TickMeasurer {
    start: Instant,
    metric: Histogram,
}

impl Drop for TickMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(duration);
    }
}
