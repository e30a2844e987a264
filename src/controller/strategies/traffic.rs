//! Traffic strategy (C5, §4.4): ensure the dedicated kanary Service exists
//! when needed, steer traffic to canary pods by label, and tear everything
//! down again on terminal outcomes or mode changes away from a live mode.

use super::StrategyError;
use crate::controller::factories::{
    build_kanary_service, kanary_service_name, service_specs_equal, CANARY_POD_LABEL, NAME_LABEL,
};
use crate::crd::types::TrafficConfig;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use std::collections::BTreeMap;

/// What happened during this tick's traffic convergence; the reconcile loop
/// folds `traffic_true` into the `Traffic` condition and `updated` into the
/// overall requeue decision.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TrafficOutcome {
    pub updated: bool,
    /// `Some(true)`/`Some(false)` when the tick reached a definite traffic
    /// state; `None` when the mode (none/mirror) has no opinion.
    pub traffic_true: Option<bool>,
}

/// `false`'s meaning matches the mode's §4.4 table row exactly.
pub fn mode_name(traffic: &TrafficConfig) -> &'static str {
    traffic.source_name()
}

/// Run one tick of the traffic algorithm (§4.4 steps 1-3). Terminal cleanup
/// (step 4) is a separate call, [`teardown`], invoked by the reconcile
/// loop once `Succeeded`/`Failed` is reached or the mode no longer wants a
/// kanary Service.
pub async fn reconcile(
    client: &Client,
    namespace: &str,
    canary_name: &str,
    traffic: &TrafficConfig,
    primary_service_name: Option<&str>,
    failed: bool,
    owner: Option<OwnerReference>,
) -> Result<TrafficOutcome, StrategyError> {
    let mut outcome = TrafficOutcome::default();

    if matches!(traffic, TrafficConfig::None | TrafficConfig::Mirror { .. }) {
        return Ok(outcome);
    }

    let service_name = primary_service_name
        .ok_or_else(|| StrategyError::MissingField("traffic.serviceName".to_string()))?;
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let primary = services
        .get(service_name)
        .await
        .map_err(|e| match &e {
            kube::Error::Api(err) if err.code == 404 => {
                StrategyError::PrimaryServiceMissing(service_name.to_string())
            }
            _ => StrategyError::Kube(e),
        })?;

    // Step 1: kanary-service / both ensure the dedicated Service exists.
    if traffic.wants_kanary_service() {
        let name = kanary_service_name(service_name, canary_name, traffic.kanary_service_override());
        outcome.updated |= ensure_kanary_service(client, namespace, canary_name, &name, &primary, owner.clone()).await?;
    }

    // Steps 2-3: pod labeling, gated on whether the canary has failed.
    if traffic.wants_pod_labeling() {
        let selector = primary
            .spec
            .as_ref()
            .and_then(|s| s.selector.clone())
            .unwrap_or_default();

        if failed {
            let keys: Vec<String> = selector.keys().cloned().collect();
            outcome.updated |= unlabel_canary_pods(client, namespace, canary_name, &keys).await?;
            outcome.traffic_true = Some(false);
        } else {
            outcome.updated |= label_canary_pods(client, namespace, canary_name, &selector).await?;
            outcome.traffic_true = Some(true);
        }
    }

    Ok(outcome)
}

/// Delete every kanary Service owned by `canary_name` (§4.4 step 4): called
/// on terminal success/failure, or when the mode changes to one that no
/// longer wants a dedicated Service.
pub async fn teardown(client: &Client, namespace: &str, canary_name: &str) -> Result<(), StrategyError> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let lp = ListParams::default().labels(&format!("{NAME_LABEL}={canary_name}"));
    let list = services.list(&lp).await?;
    for svc in list.items {
        if let Some(name) = svc.metadata.name {
            let _ = services.delete(&name, &Default::default()).await;
        }
    }
    Ok(())
}

async fn ensure_kanary_service(
    client: &Client,
    namespace: &str,
    canary_name: &str,
    name: &str,
    primary: &Service,
    owner: Option<OwnerReference>,
) -> Result<bool, StrategyError> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    match services.get(name).await {
        Ok(existing) => {
            let desired = build_kanary_service(namespace, canary_name, name, primary, owner);
            if service_specs_equal(&existing, &desired) {
                return Ok(false);
            }
            let patch = serde_json::json!({ "spec": desired.spec });
            services
                .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            Ok(true)
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            let desired = build_kanary_service(namespace, canary_name, name, primary, owner);
            services.create(&Default::default(), &desired).await?;
            Ok(true)
        }
        Err(e) => Err(StrategyError::Kube(e)),
    }
}

fn canary_pods(client: &Client, namespace: &str) -> Api<Pod> {
    Api::namespaced(client.clone(), namespace)
}

async fn label_canary_pods(
    client: &Client,
    namespace: &str,
    canary_name: &str,
    primary_selector: &BTreeMap<String, String>,
) -> Result<bool, StrategyError> {
    let pods = canary_pods(client, namespace);
    let lp = ListParams::default().labels(&format!("{NAME_LABEL}={canary_name}"));
    let list = pods.list(&lp).await?;

    let mut updated = false;
    for pod in list.items {
        let Some(name) = pod.metadata.name.clone() else { continue };
        let current = pod.metadata.labels.clone().unwrap_or_default();
        let missing = primary_selector
            .iter()
            .any(|(k, v)| current.get(k) != Some(v));
        if !missing {
            continue;
        }
        let mut merged = current;
        merged.extend(primary_selector.clone());
        let patch = serde_json::json!({ "metadata": { "labels": merged } });
        pods.patch(&name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        updated = true;
    }
    Ok(updated)
}

async fn unlabel_canary_pods(
    client: &Client,
    namespace: &str,
    canary_name: &str,
    keys: &[String],
) -> Result<bool, StrategyError> {
    if keys.is_empty() {
        return Ok(false);
    }
    let pods = canary_pods(client, namespace);
    let lp = ListParams::default().labels(&format!("{NAME_LABEL}={canary_name},{CANARY_POD_LABEL}=true"));
    let list = pods.list(&lp).await?;

    let mut updated = false;
    for pod in list.items {
        let Some(name) = pod.metadata.name.clone() else { continue };
        let current = pod.metadata.labels.clone().unwrap_or_default();
        if !keys.iter().any(|k| current.contains_key(k)) {
            continue;
        }
        // JSON merge patch has no "delete key" primitive other than `null`.
        let removals: serde_json::Map<String, serde_json::Value> = keys
            .iter()
            .map(|k| (k.clone(), serde_json::Value::Null))
            .collect();
        let patch = serde_json::json!({ "metadata": { "labels": removals } });
        pods.patch(&name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        updated = true;
    }
    Ok(updated)
}

#[cfg(test)]
#[path = "traffic_test.rs"]
mod tests;
