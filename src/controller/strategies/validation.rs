//! Validation strategy (C6, §4.5): Manual, LabelWatch and PromQL validators
//! plus their composition into a single pass/fail/wait verdict.

use crate::controller::prometheus::{PrometheusClient, Sample};
use crate::crd::types::{ManualDeadlineStatus, ManualStatus, PromQlOutcome, Validator};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;

/// The verdict of one validator for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatorOutcome {
    pub is_failed: bool,
    pub force_success_now: bool,
    /// Set when the validator couldn't get a signal this tick (e.g.
    /// Prometheus unreachable), surfaced as `Errored=True` without being
    /// treated as a failure (§4.5, §7).
    pub errored: bool,
    pub comment: String,
}

impl ValidatorOutcome {
    fn waiting() -> Self {
        Self::default()
    }

    fn failed(comment: impl Into<String>) -> Self {
        Self {
            is_failed: true,
            comment: comment.into(),
            ..Self::default()
        }
    }

    fn succeeded(comment: impl Into<String>) -> Self {
        Self {
            force_success_now: true,
            comment: comment.into(),
            ..Self::default()
        }
    }

    fn errored(comment: impl Into<String>) -> Self {
        Self {
            errored: true,
            comment: comment.into(),
            ..Self::default()
        }
    }
}

/// The composed verdict across every configured validator (§4.5
/// Composition).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositeOutcome {
    pub is_failed: bool,
    pub succeeded: bool,
    pub errored: bool,
    pub comment: String,
}

// ---------------------------------------------------------------------
// Manual
// ---------------------------------------------------------------------

pub fn evaluate_manual(
    status: Option<ManualStatus>,
    status_after_deadline: Option<ManualDeadlineStatus>,
    deadline_passed: bool,
) -> ValidatorOutcome {
    match status {
        Some(ManualStatus::Valid) => return ValidatorOutcome::succeeded("manual.status=valid"),
        Some(ManualStatus::Invalid) => return ValidatorOutcome::failed("manual.status=invalid"),
        None => {}
    }

    if !deadline_passed {
        return ValidatorOutcome::waiting();
    }

    match status_after_deadline {
        Some(ManualDeadlineStatus::Invalid) => {
            ValidatorOutcome::failed("deadline activated with 'invalid' status")
        }
        Some(ManualDeadlineStatus::Valid) => ValidatorOutcome {
            comment: "deadline activated with 'valid' status".to_string(),
            ..ValidatorOutcome::default()
        },
        Some(ManualDeadlineStatus::None) | None => ValidatorOutcome::waiting(),
    }
}

// ---------------------------------------------------------------------
// LabelWatch
// ---------------------------------------------------------------------

fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let match_labels_ok = selector
        .match_labels
        .as_ref()
        .map(|ml| ml.iter().all(|(k, v)| labels.get(k) == Some(v)))
        .unwrap_or(true);

    let expressions_ok = selector
        .match_expressions
        .as_ref()
        .map(|exprs| exprs.iter().all(|e| expression_matches(e, labels)))
        .unwrap_or(true);

    match_labels_ok && expressions_ok
}

fn expression_matches(expr: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let values = expr.values.clone().unwrap_or_default();
    match expr.operator.as_str() {
        "In" => labels.get(&expr.key).map(|v| values.contains(v)).unwrap_or(false),
        "NotIn" => labels.get(&expr.key).map(|v| !values.contains(v)).unwrap_or(true),
        "Exists" => labels.contains_key(&expr.key),
        "DoesNotExist" => !labels.contains_key(&expr.key),
        _ => true,
    }
}

/// `deployment_labels` is the primary Deployment's own labels;
/// `pod_label_sets` the current canary pods' labels.
pub fn evaluate_label_watch(
    deployment_invalidation_labels: Option<&LabelSelector>,
    pod_invalidation_labels: Option<&LabelSelector>,
    deployment_labels: &BTreeMap<String, String>,
    pod_label_sets: &[BTreeMap<String, String>],
) -> ValidatorOutcome {
    if let Some(selector) = deployment_invalidation_labels {
        if selector_matches(selector, deployment_labels) {
            return ValidatorOutcome::failed("deployment labels match deploymentInvalidationLabels");
        }
    }

    if let Some(selector) = pod_invalidation_labels {
        if pod_label_sets.iter().any(|pod| selector_matches(selector, pod)) {
            return ValidatorOutcome::failed("a canary pod matches podInvalidationLabels");
        }
    }

    ValidatorOutcome::waiting()
}

// ---------------------------------------------------------------------
// PromQL
// ---------------------------------------------------------------------

fn evaluate_value_in_range(samples: &[Sample], min: f64, max: f64, pod_name_key: &str, all_pods: bool) -> ValidatorOutcome {
    for sample in samples {
        if sample.value < min || sample.value > max {
            let pod = if all_pods { "fleet" } else { sample.label(pod_name_key).unwrap_or("?") };
            return ValidatorOutcome::failed(format!(
                "{pod}: value {} outside [{min}, {max}]",
                sample.value
            ));
        }
    }
    ValidatorOutcome::waiting()
}

fn evaluate_discrete_out_of_list(
    samples: &[Sample],
    key: &str,
    good_values: &[String],
    bad_values: &[String],
    tolerance_percent: f64,
    pod_name_key: &str,
    all_pods: bool,
) -> ValidatorOutcome {
    let mut totals: BTreeMap<String, (f64, f64)> = BTreeMap::new(); // pod -> (bad, total)

    for sample in samples {
        let pod = if all_pods {
            "fleet".to_string()
        } else {
            sample.label(pod_name_key).unwrap_or("?").to_string()
        };
        let value = sample.label(key).unwrap_or("");
        let is_bad = if !good_values.is_empty() {
            !good_values.iter().any(|v| v == value)
        } else {
            bad_values.iter().any(|v| v == value)
        };

        let entry = totals.entry(pod).or_insert((0.0, 0.0));
        entry.1 += sample.value;
        if is_bad {
            entry.0 += sample.value;
        }
    }

    for (pod, (bad, total)) in totals {
        if total <= 0.0 {
            continue;
        }
        let bad_percent = bad / total * 100.0;
        if bad_percent > tolerance_percent {
            return ValidatorOutcome::failed(format!(
                "{pod}: {bad_percent:.2}% bad values exceeds tolerance {tolerance_percent}%"
            ));
        }
    }
    ValidatorOutcome::waiting()
}

fn evaluate_continuous_deviation(samples: &[Sample], max_deviation_percent: f64, pod_name_key: &str, all_pods: bool) -> ValidatorOutcome {
    for sample in samples {
        let deviation = (sample.value - 1.0).abs() * 100.0;
        if deviation > max_deviation_percent {
            let pod = if all_pods { "fleet" } else { sample.label(pod_name_key).unwrap_or("?") };
            return ValidatorOutcome::failed(format!(
                "{pod}: deviation {deviation:.2}% exceeds max {max_deviation_percent}%"
            ));
        }
    }
    ValidatorOutcome::waiting()
}

pub async fn evaluate_promql(
    client: &PrometheusClient,
    prometheus_service: &str,
    query: &str,
    pod_name_key: &str,
    all_pods_query: bool,
    outcome: &PromQlOutcome,
) -> ValidatorOutcome {
    let samples = match client.query_instant(prometheus_service, query).await {
        Ok(samples) => samples,
        Err(e) => return ValidatorOutcome::errored(format!("prometheus query failed: {e}")),
    };

    if samples.is_empty() {
        // No signal this tick is not a failure; composition falls back to
        // the deadline-elapsed policy (§4.5).
        return ValidatorOutcome::waiting();
    }

    match outcome {
        PromQlOutcome::ValueInRange { min, max } => evaluate_value_in_range(
            &samples,
            min.unwrap_or(f64::MIN),
            max.unwrap_or(f64::MAX),
            pod_name_key,
            all_pods_query,
        ),
        PromQlOutcome::DiscreteValueOutOfList {
            key,
            good_values,
            bad_values,
            tolerance_percent,
        } => evaluate_discrete_out_of_list(
            &samples,
            key,
            good_values,
            bad_values,
            tolerance_percent.unwrap_or(0.0),
            pod_name_key,
            all_pods_query,
        ),
        PromQlOutcome::ContinuousValueDeviation { max_deviation_percent } => {
            evaluate_continuous_deviation(&samples, max_deviation_percent.unwrap_or(10.0), pod_name_key, all_pods_query)
        }
    }
}

// ---------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------

pub async fn evaluate_one(
    prometheus: &PrometheusClient,
    validator: &Validator,
    deployment_labels: &BTreeMap<String, String>,
    pod_label_sets: &[BTreeMap<String, String>],
    deadline_passed: bool,
) -> ValidatorOutcome {
    match validator {
        Validator::Manual {
            status,
            status_after_deadline,
        } => evaluate_manual(*status, *status_after_deadline, deadline_passed),
        Validator::LabelWatch {
            pod_invalidation_labels,
            deployment_invalidation_labels,
        } => evaluate_label_watch(
            deployment_invalidation_labels.as_ref(),
            pod_invalidation_labels.as_ref(),
            deployment_labels,
            pod_label_sets,
        ),
        Validator::PromQl {
            prometheus_service,
            query,
            pod_name_key,
            all_pods_query,
            outcome,
        } => {
            evaluate_promql(
                prometheus,
                prometheus_service.as_deref().unwrap_or("prometheus:9090"),
                query,
                pod_name_key.as_deref().unwrap_or("pod"),
                *all_pods_query,
                outcome,
            )
            .await
        }
    }
}

/// Run every configured validator and combine per §4.5: fails iff any
/// `isFailed`; succeeds iff every validator reports `forceSuccessNow`;
/// otherwise keeps waiting. `errored` is set if any validator had no signal
/// this tick, independent of the pass/fail/wait verdict.
pub async fn evaluate_all(
    prometheus: &PrometheusClient,
    validators: &[Validator],
    deployment_labels: &BTreeMap<String, String>,
    pod_label_sets: &[BTreeMap<String, String>],
    deadline_passed: bool,
) -> CompositeOutcome {
    let mut comments = Vec::new();
    let mut any_failed = false;
    let mut any_errored = false;
    let mut all_force_success = !validators.is_empty();

    for validator in validators {
        let outcome = evaluate_one(prometheus, validator, deployment_labels, pod_label_sets, deadline_passed).await;
        if !outcome.comment.is_empty() {
            comments.push(outcome.comment.clone());
        }
        any_failed |= outcome.is_failed;
        any_errored |= outcome.errored;
        all_force_success &= outcome.force_success_now;
    }

    CompositeOutcome {
        is_failed: any_failed,
        succeeded: !any_failed && all_force_success,
        errored: any_errored,
        comment: comments.join("; "),
    }
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
