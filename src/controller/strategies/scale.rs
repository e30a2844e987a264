//! Scale strategy (C4, §4.3): converge the canary artefact's replica count
//! (Deployment mode) or the primary StatefulSet's partition (partition
//! mode) toward the configured target.

use super::StrategyError;
use crate::crd::types::{ScaleConfig, WorkloadTemplate};
use k8s_openapi::api::apps::v1::{
    Deployment, RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetUpdateStrategy,
};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;

/// The active scale mode name, used in the derived status report.
pub fn mode_name(scale: &ScaleConfig) -> &'static str {
    match scale {
        ScaleConfig::Static { .. } => "static",
        ScaleConfig::Hpa { .. } => "hpa",
    }
}

/// Patch the canary Deployment's replica count if it doesn't already match
/// `replicas`. No-ops while the canary is `Failed=True` (§4.3).
///
/// Returns `true` if an update was issued (the caller should requeue).
pub async fn converge_deployment_replicas(
    client: &Client,
    namespace: &str,
    canary_deployment_name: &str,
    replicas: i32,
    failed: bool,
) -> Result<bool, StrategyError> {
    if failed {
        return Ok(false);
    }

    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let current = api.get(canary_deployment_name).await?;
    let current_replicas = current.spec.as_ref().and_then(|s| s.replicas);

    if current_replicas == Some(replicas) {
        return Ok(false);
    }

    let patch = serde_json::json!({ "spec": { "replicas": replicas } });
    api.patch(
        canary_deployment_name,
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(true)
}

/// `replicas - canarySize`, clamped to `[0, replicas]`: the StatefulSet
/// partition index below which pods are left on the stable template.
pub fn partition_for(total_replicas: i32, canary_size: i32) -> i32 {
    (total_replicas - canary_size).clamp(0, total_replicas.max(0))
}

/// Set the primary StatefulSet's rolling-update partition and overwrite its
/// pod template with the canary candidate (§4.3, §4.7 step 6). Pods at or
/// above the partition index are the "canary" pods, rolled by the
/// StatefulSet controller itself.
///
/// Returns `true` if an update was issued.
pub async fn converge_statefulset_partition(
    client: &Client,
    namespace: &str,
    statefulset_name: &str,
    canary_size: i32,
    template: &WorkloadTemplate,
) -> Result<bool, StrategyError> {
    let api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
    let current = api.get(statefulset_name).await?;
    let spec = current
        .spec
        .as_ref()
        .ok_or_else(|| StrategyError::MissingField("statefulset spec".to_string()))?;

    let total_replicas = spec.replicas.unwrap_or(1);
    let desired_partition = partition_for(total_replicas, canary_size);

    let current_partition = spec
        .update_strategy
        .as_ref()
        .and_then(|u| u.rolling_update.as_ref())
        .and_then(|r| r.partition);

    let template_matches = spec.template == template.template;

    if current_partition == Some(desired_partition) && template_matches {
        return Ok(false);
    }

    let update_strategy = StatefulSetUpdateStrategy {
        type_: Some("RollingUpdate".to_string()),
        rolling_update: Some(RollingUpdateStatefulSetStrategy {
            partition: Some(desired_partition),
            ..Default::default()
        }),
    };
    let patch = serde_json::json!({
        "spec": {
            "updateStrategy": update_strategy,
            "template": template.template,
        }
    });

    api.patch(statefulset_name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(true)
}

#[cfg(test)]
#[path = "scale_test.rs"]
mod tests;
