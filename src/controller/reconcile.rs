//! The reconcile loop (C8, §4.7), written once against [`CanaryResource`]
//! and instantiated for both `KanaryDeployment` and `KanaryStatefulset` by
//! the thin entry points at the bottom of this file.

use crate::controller::conditions;
use crate::controller::factories::{self, build_canary_deployment, canary_deployment_name};
use crate::controller::scheduler;
use crate::controller::strategies::{scale, traffic, validation};
use crate::controller::{Context, ReconcileError};
use crate::crd::defaulting::{self, SpecValidationError};
use crate::crd::fingerprint::fingerprint;
use crate::crd::rollout::RolloutMode;
use crate::crd::types::{CanaryStatus, ConditionStatus, ConditionType, ScaleConfig};
use crate::crd::{CanaryResource, KanaryDeployment, KanaryStatefulset};
use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const STATUS_SUBRESOURCE_DISABLED_ENV: &str = "KANARY_STATUS_SUBRESOURCE_DISABLED";

/// Generic reconcile core (§4.7). `K` is either `KanaryDeployment` or
/// `KanaryStatefulset`; everything below reads/writes only the fields
/// exposed by [`CanaryResource`], so this body never branches on which kind
/// it's instantiated for except through `rollout_mode()`.
pub async fn reconcile<K: CanaryResource>(resource: Arc<K>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = resource.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = resource.name_any();
    let api: Api<K> = Api::namespaced(ctx.client.clone(), &namespace);

    // Step 2: one-shot defaulting write.
    if !defaulting::is_defaulted(resource.common()) {
        let defaulted = defaulting::default_spec(resource.common());
        let patch = serde_json::json!({ "spec": defaulted });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        info!(canary = %name, "defaulted canary spec");
        return Ok(Action::requeue(Duration::from_secs(0)));
    }

    defaulting::validate_spec(resource.common()).map_err(ReconcileError::InvalidSpec)?;

    let mut status = resource.status().cloned().unwrap_or_default();
    let now = Utc::now();

    // Step 3: fetch target workload.
    let mode = resource.rollout_mode();
    if let Err(e) = ensure_target_workload_exists(&ctx, &namespace, mode).await {
        conditions::set(&mut status, ConditionType::Errored, ConditionStatus::True, "TargetMissing", &e.to_string(), now);
        write_status(&api, &name, &status, resource.status()).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }
    conditions::clear(&mut status, ConditionType::Errored);

    // Step 4: scheduling gate.
    let schedule = resource.common().schedule;
    if !scheduler::is_scheduled(schedule, now) {
        conditions::set(&mut status, ConditionType::Scheduled, ConditionStatus::False, "Scheduled", "awaiting schedule", now);
        write_status(&api, &name, &status, resource.status()).await?;
        let remaining = schedule.map(|s| (s - now).to_std().unwrap_or(Duration::from_secs(1))).unwrap_or(Duration::from_secs(1));
        return Ok(Action::requeue(remaining));
    }
    conditions::set(&mut status, ConditionType::Scheduled, ConditionStatus::True, "Scheduled", "", now);

    let validations = resource
        .common()
        .validations
        .clone()
        .ok_or(ReconcileError::InvalidSpec(SpecValidationError::EmptyValidationItems))?;
    let initial_delay = scheduler::parse_duration(validations.initial_delay.as_deref().unwrap_or("0s"))
        .unwrap_or(Duration::ZERO);
    let validation_period = scheduler::parse_duration(validations.validation_period.as_deref().unwrap_or("15m"))
        .unwrap_or(Duration::from_secs(900));
    let max_interval = scheduler::parse_duration(validations.max_interval_period.as_deref().unwrap_or("20s"))
        .unwrap_or(Duration::from_secs(20));

    let creation = resource.meta().creation_timestamp.as_ref().map(|t| t.0).unwrap_or(now);
    if let Some(remaining) = scheduler::initial_delay_remaining(creation, initial_delay, now) {
        write_status(&api, &name, &status, resource.status()).await?;
        return Ok(Action::requeue(remaining));
    }

    let fingerprint_value = fingerprint(&resource.common().template);
    let owner = factories::owner_reference(&*resource);
    let scale_cfg = resource.common().scale.clone().unwrap_or(ScaleConfig::Static { replicas: Some(1) });

    // Steps 5-6: materialize the canary artefact.
    match mode {
        RolloutMode::Deployment(primary_name) => {
            match reconcile_canary_deployment(&ctx, &namespace, &name, primary_name, &resource, &fingerprint_value, owner.clone()).await? {
                CanaryArtefactOutcome::Created => {
                    conditions::set(&mut status, ConditionType::Activated, ConditionStatus::True, "Created", "", now);
                    write_status(&api, &name, &status, resource.status()).await?;
                    return Ok(Action::requeue(Duration::from_secs(1)));
                }
                CanaryArtefactOutcome::Recreating => {
                    write_status(&api, &name, &status, resource.status()).await?;
                    return Ok(Action::requeue(Duration::from_secs(1)));
                }
                CanaryArtefactOutcome::UpToDate => {
                    conditions::set(&mut status, ConditionType::Activated, ConditionStatus::True, "Exists", "", now);
                }
            }
        }
        RolloutMode::Statefulset(primary_name) => {
            let canary_size = match &scale_cfg {
                ScaleConfig::Static { replicas } => replicas.unwrap_or(1),
                ScaleConfig::Hpa { min_replicas, .. } => min_replicas.unwrap_or(1),
            };
            scale::converge_statefulset_partition(&ctx.client, &namespace, primary_name, canary_size, &resource.common().template)
                .await
                .map_err(ReconcileError::Strategy)?;
            conditions::set(&mut status, ConditionType::Activated, ConditionStatus::True, "PartitionSet", "", now);
        }
    }

    // Step 7: strategy composite.
    let failed_already = conditions::is_true(&status, ConditionType::Failed);
    let deadline = scheduler::validation_deadline(creation, initial_delay, validation_period);
    let deadline_passed = now >= deadline;

    if let RolloutMode::Deployment(_) = mode {
        scale::converge_deployment_replicas(
            &ctx.client,
            &namespace,
            &canary_deployment_name(mode.workload_name(), &name),
            scale_replicas(&scale_cfg),
            failed_already,
        )
        .await
        .map_err(ReconcileError::Strategy)?;
    }

    let traffic_cfg = resource.common().traffic.clone().unwrap_or(crate::crd::types::TrafficConfig::None);
    let traffic_outcome = traffic::reconcile(
        &ctx.client,
        &namespace,
        &name,
        &traffic_cfg,
        resource.common().service_name.as_deref(),
        failed_already,
        owner.clone(),
    )
    .await
    .map_err(ReconcileError::Strategy)?;
    if let Some(t) = traffic_outcome.traffic_true {
        conditions::set(&mut status, ConditionType::Traffic, if t { ConditionStatus::True } else { ConditionStatus::False }, "Traffic", "", now);
    }

    // A mode change away from kanary-service/both leaves no reason for a
    // dedicated Service to keep existing (§4.4 step 4, table row
    // none/mirror ⇒ kanary Service absent); tear it down independent of
    // terminal outcome.
    if !traffic_cfg.wants_kanary_service() {
        traffic::teardown(&ctx.client, &namespace, &name).await.map_err(ReconcileError::Strategy)?;
    }

    let (deployment_labels, pod_labels) = if validations.items.iter().any(|v| matches!(v, crate::crd::types::Validator::LabelWatch { .. })) {
        label_watch_context(&ctx.client, &namespace, &name, mode).await?
    } else {
        (BTreeMap::new(), Vec::new())
    };
    let composite = validation::evaluate_all(
        &ctx.prometheus,
        &validations.items,
        &deployment_labels,
        &pod_labels,
        deadline_passed,
    )
    .await;

    if composite.errored {
        conditions::set(&mut status, ConditionType::Errored, ConditionStatus::True, "NoSignal", &composite.comment, now);
    } else {
        conditions::clear(&mut status, ConditionType::Errored);
    }

    let any_manual_stuck = scheduler::any_manual_status_after_deadline_none(&validations.items);

    if composite.is_failed {
        conditions::set(&mut status, ConditionType::Failed, ConditionStatus::True, "ValidationFailed", &composite.comment, now);
        conditions::set(&mut status, ConditionType::Running, ConditionStatus::False, "Failed", "", now);
    } else if composite.succeeded || (deadline_passed && !any_manual_stuck) {
        conditions::set(&mut status, ConditionType::Succeeded, ConditionStatus::True, "ValidationPassed", &composite.comment, now);
        conditions::set(&mut status, ConditionType::Running, ConditionStatus::False, "Succeeded", "", now);
    } else {
        conditions::set(&mut status, ConditionType::Running, ConditionStatus::True, "Validating", &composite.comment, now);
    }

    // A Manual validator carrying statusAfterDeadline="none" parks the
    // rollout once the deadline passes and nothing else resolved it: no
    // automation, no further polling, wait for manual input (spec §4.5,
    // §4.6).
    let parked = deadline_passed
        && any_manual_stuck
        && !conditions::is_true(&status, ConditionType::Failed)
        && !conditions::is_true(&status, ConditionType::Succeeded);

    let no_update = validations.no_update;

    // Step 8: promote on success.
    if conditions::is_true(&status, ConditionType::Succeeded) && !no_update {
        if let RolloutMode::Deployment(primary_name) = mode {
            promote_deployment(&ctx.client, &namespace, primary_name, &resource.common().template).await?;
        }
        conditions::set(&mut status, ConditionType::DeploymentUpdated, ConditionStatus::True, "Promoted", "", now);
    }

    // Step 9: tear down the canary artefact on failure.
    if conditions::is_true(&status, ConditionType::Failed) && !no_update {
        if let RolloutMode::Deployment(_) = mode {
            let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
            let _ = deployments
                .delete(&canary_deployment_name(mode.workload_name(), &name), &Default::default())
                .await;
        }
    }

    // Terminal outcomes always tear down the kanary Service, independent of
    // `no_update` (§4.4 step 4): traffic steering has no reason to outlive a
    // finished canary even when the primary workload itself wasn't touched.
    if conditions::is_true(&status, ConditionType::Succeeded) || conditions::is_true(&status, ConditionType::Failed) {
        traffic::teardown(&ctx.client, &namespace, &name).await.map_err(ReconcileError::Strategy)?;
    }

    status.current_hash = Some(fingerprint_value);
    status.report = conditions::report(&status, &validations.items, scale::mode_name(&scale_cfg), traffic::mode_name(&traffic_cfg));

    // Step 10: write status.
    write_status(&api, &name, &status, resource.status()).await?;

    if parked {
        return Ok(Action::await_change());
    }
    let requeue_after = scheduler::requeue_interval(now, deadline, max_interval);
    Ok(Action::requeue(requeue_after))
}

fn scale_replicas(scale: &ScaleConfig) -> i32 {
    match scale {
        ScaleConfig::Static { replicas } => replicas.unwrap_or(1),
        ScaleConfig::Hpa { min_replicas, .. } => min_replicas.unwrap_or(1),
    }
}

fn classify_missing(name: &str, err: kube::Error) -> ReconcileError {
    match err {
        kube::Error::Api(ref api_err) if api_err.code == 404 => {
            ReconcileError::TargetWorkloadMissing(name.to_string())
        }
        other => ReconcileError::Kube(other),
    }
}

async fn ensure_target_workload_exists(ctx: &Context, namespace: &str, mode: RolloutMode<'_>) -> Result<(), ReconcileError> {
    match mode {
        RolloutMode::Deployment(name) => {
            let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), namespace);
            api.get(name).await.map_err(|e| classify_missing(name, e))?;
        }
        RolloutMode::Statefulset(name) => {
            let api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);
            api.get(name).await.map_err(|e| classify_missing(name, e))?;
        }
    }
    Ok(())
}

enum CanaryArtefactOutcome {
    Created,
    Recreating,
    UpToDate,
}

async fn reconcile_canary_deployment<K: CanaryResource>(
    ctx: &Context,
    namespace: &str,
    canary_name: &str,
    primary_deployment_name: &str,
    resource: &K,
    fingerprint_value: &str,
    owner: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference>,
) -> Result<CanaryArtefactOutcome, ReconcileError> {
    let artefact_name = canary_deployment_name(primary_deployment_name, canary_name);
    let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), namespace);

    match api.get(&artefact_name).await {
        Ok(existing) => {
            if factories::fingerprint_matches(&existing, fingerprint_value) {
                Ok(CanaryArtefactOutcome::UpToDate)
            } else {
                api.delete(&artefact_name, &Default::default()).await?;
                warn!(canary = %canary_name, "fingerprint changed, deleting stale canary artefact");
                Ok(CanaryArtefactOutcome::Recreating)
            }
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            let deployment = build_canary_deployment(
                namespace,
                canary_name,
                &artefact_name,
                &resource.common().template,
                fingerprint_value,
                owner,
            );
            api.create(&Default::default(), &deployment).await?;
            info!(canary = %canary_name, "created canary deployment");
            Ok(CanaryArtefactOutcome::Created)
        }
        Err(e) => Err(ReconcileError::Kube(e)),
    }
}

/// Gather the labels a LabelWatch validator (§4.5) needs to evaluate:
/// the primary workload's own labels, and every current canary pod's
/// labels. Only called when at least one `LabelWatch` validator is
/// configured, since it costs an extra List call per tick otherwise.
async fn label_watch_context(
    client: &kube::Client,
    namespace: &str,
    canary_name: &str,
    mode: RolloutMode<'_>,
) -> Result<(BTreeMap<String, String>, Vec<BTreeMap<String, String>>), ReconcileError> {
    match mode {
        RolloutMode::Deployment(primary_name) => {
            let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
            let workload_labels = deployments
                .get(primary_name)
                .await
                .ok()
                .and_then(|d| d.metadata.labels)
                .unwrap_or_default();

            let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
            let lp = ListParams::default().labels(&format!("{}={canary_name}", factories::NAME_LABEL));
            let pod_labels = pods
                .list(&lp)
                .await?
                .items
                .into_iter()
                .map(|p| p.metadata.labels.unwrap_or_default())
                .collect();
            Ok((workload_labels, pod_labels))
        }
        RolloutMode::Statefulset(primary_name) => {
            let statefulsets: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
            let sts = statefulsets.get(primary_name).await?;
            let workload_labels = sts.metadata.labels.clone().unwrap_or_default();

            let partition = sts
                .spec
                .as_ref()
                .and_then(|s| s.update_strategy.as_ref())
                .and_then(|u| u.rolling_update.as_ref())
                .and_then(|r| r.partition)
                .unwrap_or(0);
            let match_labels = sts
                .spec
                .as_ref()
                .and_then(|s| s.selector.match_labels.clone())
                .unwrap_or_default();
            let selector = match_labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");

            let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
            let lp = ListParams::default().labels(&selector);
            let pod_labels = pods
                .list(&lp)
                .await?
                .items
                .into_iter()
                .filter(|p| pod_ordinal(p.metadata.name.as_deref().unwrap_or(""), primary_name) >= Some(partition))
                .map(|p| p.metadata.labels.unwrap_or_default())
                .collect();
            Ok((workload_labels, pod_labels))
        }
    }
}

/// A StatefulSet pod is named `{statefulset_name}-{ordinal}`; pods at or
/// above the partition index are the ones running the canary template.
fn pod_ordinal(pod_name: &str, statefulset_name: &str) -> Option<i32> {
    pod_name
        .strip_prefix(statefulset_name)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|ordinal| ordinal.parse().ok())
}

async fn promote_deployment(client: &kube::Client, namespace: &str, primary_name: &str, template: &crate::crd::types::WorkloadTemplate) -> Result<(), ReconcileError> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({
        "spec": {
            "replicas": template.replicas,
            "selector": template.selector,
            "template": template.template,
        }
    });
    api.patch(primary_name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    Ok(())
}

async fn write_status<K: CanaryResource>(
    api: &Api<K>,
    name: &str,
    status: &CanaryStatus,
    previous: Option<&CanaryStatus>,
) -> Result<(), ReconcileError> {
    if let Some(previous) = previous {
        if conditions::status_equal_ignoring_update_time(previous, status) {
            return Ok(());
        }
    }

    let patch = serde_json::json!({ "status": status });
    let disabled = std::env::var(STATUS_SUBRESOURCE_DISABLED_ENV).ok().as_deref() == Some("1");
    if disabled {
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    } else {
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    }
    Ok(())
}

/// Error-policy hook wired into `kube::runtime::Controller::run` for both
/// kinds: always requeues with a fixed backoff, since rollout-level
/// deadlines are wall-clock driven rather than retry-count driven (§7).
pub fn error_policy<K>(_resource: Arc<K>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!(error = %error, "reconcile error");
    Action::requeue(Duration::from_secs(5))
}

/// Thin entry point for the `KanaryDeployment` controller. Gates on
/// leadership before doing any work: a standby replica with leader election
/// enabled observes the tick but performs no API writes.
pub async fn reconcile_deployment(resource: Arc<KanaryDeployment>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    if is_standby(&ctx) {
        ctx.metrics.record_reconciliation_skipped();
        return Ok(Action::requeue(Duration::from_secs(10)));
    }
    let start = std::time::Instant::now();
    let result = reconcile::<KanaryDeployment>(resource, ctx.clone()).await;
    record_outcome(&ctx, "deployment", start.elapsed(), &result);
    result
}

/// Thin entry point for the `KanaryStatefulset` controller. See
/// [`reconcile_deployment`] for the leadership gate.
pub async fn reconcile_statefulset(resource: Arc<KanaryStatefulset>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    if is_standby(&ctx) {
        ctx.metrics.record_reconciliation_skipped();
        return Ok(Action::requeue(Duration::from_secs(10)));
    }
    let start = std::time::Instant::now();
    let result = reconcile::<KanaryStatefulset>(resource, ctx.clone()).await;
    record_outcome(&ctx, "statefulset", start.elapsed(), &result);
    result
}

fn is_standby(ctx: &Context) -> bool {
    matches!(&ctx.leader, Some(leader) if !leader.is_leader())
}

fn record_outcome(ctx: &Context, mode: &str, elapsed: Duration, result: &Result<Action, ReconcileError>) {
    let secs = elapsed.as_secs_f64();
    match result {
        Ok(_) => ctx.metrics.record_reconciliation_success(mode, secs),
        Err(_) => ctx.metrics.record_reconciliation_error(mode, secs),
    }
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
