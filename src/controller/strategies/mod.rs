//! Strategy pillars invoked by the reconcile loop's composite step (§4.7
//! step 7): scale (C4), traffic (C5), validation (C6). Each pillar converges
//! one slice of cluster state toward the canary's configured target and is
//! independently idempotent, safe to call every tick regardless of whether
//! the previous tick's write actually landed.

pub mod scale;
pub mod traffic;
pub mod validation;

use thiserror::Error;

/// Errors raised while executing one of the strategy pillars. Folded into
/// `ReconcileError::Strategy` via `#[from]` at the reconcile-loop boundary.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("primary service {0:?} referenced by traffic config is missing")]
    PrimaryServiceMissing(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("prometheus query failed: {0}")]
    Prometheus(#[from] crate::controller::prometheus::PrometheusError),
}
