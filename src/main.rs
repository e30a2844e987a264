use futures::StreamExt;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use kanary::controller::prometheus::PrometheusClient;
use kanary::controller::{error_policy, reconcile_deployment, reconcile_statefulset, Context};
use kanary::crd::{KanaryDeployment, KanaryStatefulset};
use kanary::server::{
    create_metrics, run_health_server, run_leader_election, shutdown_channel, wait_for_signal,
    LeaderConfig, LeaderState, ReadinessState,
};
use std::sync::Arc;
use tracing::{error, info, warn};

fn health_port() -> u16 {
    std::env::var("HEALTH_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080)
}

fn leader_election_enabled() -> bool {
    std::env::var("KANARY_LEADER_ELECTION")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("starting kanary canary-rollout controller");

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let readiness = ReadinessState::new();
    let metrics = create_metrics()?;

    let port = health_port();
    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = run_health_server(port, health_readiness, health_metrics).await {
            warn!(error = %e, "health server failed");
        }
    });
    info!(port, "health server task spawned");

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to build kubernetes client");
            health_handle.abort();
            return Err(e.into());
        }
    };
    info!("connected to kubernetes cluster");

    let leader_enabled = leader_election_enabled();
    let leader_state = LeaderState::new();
    let leader_handle = if leader_enabled {
        let leader_client = client.clone();
        let leader_config = LeaderConfig::from_env();
        let leader_state_clone = leader_state.clone();
        let leader_shutdown = shutdown_signal.clone();
        info!(holder_id = %leader_config.holder_id, "leader election enabled");
        Some(tokio::spawn(async move {
            run_leader_election(leader_client, leader_config, leader_state_clone, leader_shutdown).await;
        }))
    } else {
        info!("leader election disabled, running as sole instance");
        leader_state.set_leader(true);
        None
    };

    let ctx = Arc::new(Context::new(
        client.clone(),
        PrometheusClient::new(),
        metrics,
        leader_enabled.then_some(leader_state),
    ));

    // Readiness means "controller initialized and watching", not "is leader";
    // standby replicas still answer /readyz so a Service can route to them.
    readiness.set_ready();
    info!("controller ready, starting reconciliation loops");

    let deployments: Api<KanaryDeployment> = Api::all(client.clone());
    let statefulsets: Api<KanaryStatefulset> = Api::all(client.clone());

    let deployment_ctx = ctx.clone();
    let deployment_controller = Controller::new(deployments, watcher::Config::default())
        .run(reconcile_deployment, error_policy, deployment_ctx)
        .for_each(|res| async move {
            if let Err(e) = res {
                warn!(error = %e, "deployment reconcile stream error");
            }
        });

    let statefulset_ctx = ctx.clone();
    let statefulset_controller = Controller::new(statefulsets, watcher::Config::default())
        .run(reconcile_statefulset, error_policy, statefulset_ctx)
        .for_each(|res| async move {
            if let Err(e) = res {
                warn!(error = %e, "statefulset reconcile stream error");
            }
        });

    let controllers = futures::future::join(deployment_controller, statefulset_controller);

    tokio::select! {
        _ = controllers => {
            info!("controller streams ended");
        }
        signal = wait_for_signal() => {
            info!(signal, "initiating graceful shutdown");
            readiness.set_not_ready();
        }
    }

    shutdown_controller.shutdown();
    info!("stopping background tasks");

    if let Some(handle) = leader_handle {
        handle.abort();
    }
    health_handle.abort();

    info!("kanary controller shut down gracefully");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
