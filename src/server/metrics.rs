//! Prometheus self-metrics for the kanary controller (§10.4).
//!
//! Exposes controller health and canary-rollout activity:
//! - Reconciliation counts and durations
//! - Canary phase gauges (derived from the §4.8 status report)
//! - Per-validator-kind outcome counts

use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Controller metrics registry. Thread-safe container for all kanary
/// metrics; `Clone` is cheap (every field is internally `Arc`'d by the
/// `prometheus` crate).
#[derive(Clone)]
pub struct ControllerMetrics {
    registry: Registry,
    /// Total reconciliations by result (success, error, skipped).
    pub reconciliations_total: IntCounterVec,
    /// Reconciliation duration in seconds, by rollout mode
    /// (`deployment`/`statefulset`).
    pub reconciliation_duration_seconds: HistogramVec,
    /// Canary resources currently observed in each §4.8 report phase
    /// (Scheduled, Running, Succeeded, Failed, ...), by rollout mode.
    pub canaries_by_phase: IntGaugeVec,
    /// Total validator outcomes by kind (manual/labelWatch/promQL) and
    /// verdict (pass/fail/wait/errored).
    pub validations_total: IntCounterVec,
}

impl ControllerMetrics {
    /// Create a new metrics registry with all kanary metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations_total = IntCounterVec::new(
            Opts::new(
                "kanary_reconciliations_total",
                "Total number of reconciliations",
            ),
            &["result"], // success, error, skipped
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let reconciliation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "kanary_reconciliation_duration_seconds",
                "Duration of reconciliation in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["mode"], // deployment, statefulset
        )?;
        registry.register(Box::new(reconciliation_duration_seconds.clone()))?;

        let canaries_by_phase = IntGaugeVec::new(
            Opts::new(
                "kanary_canaries_by_phase",
                "Number of canary resources observed in each status-report phase",
            ),
            &["phase", "mode"],
        )?;
        registry.register(Box::new(canaries_by_phase.clone()))?;

        let validations_total = IntCounterVec::new(
            Opts::new(
                "kanary_validations_total",
                "Total validator outcomes by kind and verdict",
            ),
            &["kind", "verdict"], // kind: manual/labelWatch/promQL, verdict: pass/fail/wait/errored
        )?;
        registry.register(Box::new(validations_total.clone()))?;

        Ok(Self {
            registry,
            reconciliations_total,
            reconciliation_duration_seconds,
            canaries_by_phase,
            validations_total,
        })
    }

    /// Record a successful reconciliation tick.
    pub fn record_reconciliation_success(&self, mode: &str, duration_secs: f64) {
        self.reconciliations_total.with_label_values(&["success"]).inc();
        self.reconciliation_duration_seconds
            .with_label_values(&[mode])
            .observe(duration_secs);
    }

    /// Record a reconciliation tick that returned an error.
    pub fn record_reconciliation_error(&self, mode: &str, duration_secs: f64) {
        self.reconciliations_total.with_label_values(&["error"]).inc();
        self.reconciliation_duration_seconds
            .with_label_values(&[mode])
            .observe(duration_secs);
    }

    /// Record a reconciliation skipped because this replica is not leader.
    pub fn record_reconciliation_skipped(&self) {
        self.reconciliations_total.with_label_values(&["skipped"]).inc();
    }

    /// Set the current count of canary resources in `phase` for `mode`.
    pub fn set_canaries_by_phase(&self, phase: &str, mode: &str, count: i64) {
        self.canaries_by_phase.with_label_values(&[phase, mode]).set(count);
    }

    /// Record one validator verdict for `kind` (§4.5: manual, labelWatch,
    /// promQL).
    pub fn record_validation(&self, kind: &str, verdict: &str) {
        self.validations_total.with_label_values(&[kind, verdict]).inc();
    }

    /// Encode all metrics to Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("failed to encode metrics as UTF-8: {e}")))
    }
}

/// Shared metrics handle for use across the controller.
pub type SharedMetrics = Arc<ControllerMetrics>;

/// Create a new shared metrics instance.
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ControllerMetrics::new()?))
}
