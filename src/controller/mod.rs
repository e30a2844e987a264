//! The Kanary controller: shared reconcile context, error types, and the
//! per-kind reconcile loop (C8) built on top of the strategy pillars below.

pub mod conditions;
pub mod factories;
pub mod prometheus;
pub mod reconcile;
pub mod scheduler;
pub mod strategies;

use crate::controller::prometheus::PrometheusClient;
use crate::controller::strategies::StrategyError;
use crate::crd::defaulting::SpecValidationError;
use crate::server::{LeaderState, SharedMetrics};
use kube::Client;
use thiserror::Error;

pub use reconcile::{error_policy, reconcile_deployment, reconcile_statefulset};

/// Shared state handed to every reconcile invocation.
///
/// `leader` is `None` when leader election is disabled (single-instance
/// deployments always reconcile); `Some` gates every write behind
/// [`LeaderState::is_leader`] so that standby replicas observe but never
/// mutate cluster state.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub prometheus: PrometheusClient,
    pub metrics: SharedMetrics,
    pub leader: Option<LeaderState>,
}

impl Context {
    pub fn new(client: Client, prometheus: PrometheusClient, metrics: SharedMetrics, leader: Option<LeaderState>) -> Self {
        Self { client, prometheus, metrics, leader }
    }

    /// A `Context` backed by a client that never actually dials out, for
    /// unit tests that only need `Context` to exist, not to reach a cluster.
    #[cfg(test)]
    pub fn new_mock() -> Self {
        let mut config = kube::Config::new(
            "https://localhost:8080"
                .parse()
                .expect("static mock URL parses"),
        );
        config.default_namespace = "default".to_string();
        config.accept_invalid_certs = true;
        let client = kube::Client::try_from(config).expect("mock client builds from static config");
        Context {
            client,
            prometheus: PrometheusClient::new(),
            metrics: crate::server::create_metrics().expect("metrics registry builds"),
            leader: None,
        }
    }
}

/// Errors surfaced from one reconcile tick (§7). `kube::runtime::Controller`
/// always routes these through [`error_policy`], which just schedules a
/// fixed-backoff retry, since rollout deadlines are wall-clock driven, not
/// retry-count driven, so there's no exponential backoff here.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("canary resource has no namespace")]
    MissingNamespace,

    #[error("target workload {0:?} not found")]
    TargetWorkloadMissing(String),

    #[error("invalid canary spec: {0}")]
    InvalidSpec(#[from] SpecValidationError),

    #[error("strategy pillar failed: {0}")]
    Strategy(#[from] StrategyError),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
