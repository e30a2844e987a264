//! Defaulting and validation of a canary spec's sub-configurations (C2).
//!
//! `is_defaulted` checks every field the defaulter would touch is already
//! set; `default_spec` returns a deep copy with defaults filled. Both are
//! pure functions over [`CanarySpec`] so they apply identically to
//! `KanaryDeployment` and `KanaryStatefulset`.

use crate::crd::rollout::CanarySpec;
use crate::crd::types::{
    HpaMetric, ManualDeadlineStatus, PromQlOutcome, ScaleConfig, TrafficConfig, ValidationList,
    Validator,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecValidationError {
    #[error("scale must be exactly one of Static or Hpa")]
    ScaleUnset,
    #[error("validations.items must not be empty")]
    EmptyValidationItems,
    #[error("validation entry has no recognized kind")]
    UnknownValidatorKind,
}

const DEFAULT_INITIAL_DELAY: &str = "0s";
const DEFAULT_VALIDATION_PERIOD: &str = "15m";
const DEFAULT_MAX_INTERVAL_PERIOD: &str = "20s";
const DEFAULT_PROMETHEUS_SERVICE: &str = "prometheus:9090";
const DEFAULT_POD_NAME_KEY: &str = "pod";

/// Does every field the defaulter would touch already have a value?
pub fn is_defaulted(spec: &CanarySpec) -> bool {
    let scale_ok = match &spec.scale {
        None => false,
        Some(ScaleConfig::Static { replicas }) => replicas.is_some(),
        Some(ScaleConfig::Hpa {
            min_replicas,
            max_replicas,
            metrics,
        }) => min_replicas.is_some() && max_replicas.map(|m| m != 0).unwrap_or(false) && !metrics.is_empty(),
    };

    let traffic_ok = spec.traffic.is_some();

    let validations_ok = match &spec.validations {
        None => false,
        Some(v) => {
            v.initial_delay.is_some()
                && v.validation_period.is_some()
                && v.max_interval_period.is_some()
                && !v.items.is_empty()
                && v.items.iter().all(validator_is_defaulted)
        }
    };

    scale_ok && traffic_ok && validations_ok
}

fn validator_is_defaulted(v: &Validator) -> bool {
    match v {
        Validator::Manual {
            status_after_deadline,
            ..
        } => status_after_deadline.is_some(),
        Validator::LabelWatch { .. } => true,
        Validator::PromQl {
            prometheus_service,
            pod_name_key,
            outcome,
            ..
        } => {
            prometheus_service.is_some()
                && pod_name_key.is_some()
                && promql_outcome_is_defaulted(outcome)
        }
    }
}

fn promql_outcome_is_defaulted(outcome: &PromQlOutcome) -> bool {
    match outcome {
        PromQlOutcome::ValueInRange { min, max } => min.is_some() && max.is_some(),
        PromQlOutcome::DiscreteValueOutOfList {
            tolerance_percent, ..
        } => tolerance_percent.is_some(),
        PromQlOutcome::ContinuousValueDeviation {
            max_deviation_percent,
        } => max_deviation_percent.is_some(),
    }
}

/// Return a deep copy of `spec` with every unset defaultable field filled.
///
/// Idempotent: `default_spec(&default_spec(spec)) == default_spec(spec)`.
pub fn default_spec(spec: &CanarySpec) -> CanarySpec {
    let mut out = spec.clone();

    out.scale = Some(match out.scale {
        None => ScaleConfig::Static { replicas: Some(1) },
        Some(ScaleConfig::Static { replicas }) => ScaleConfig::Static {
            replicas: Some(replicas.unwrap_or(1)),
        },
        Some(ScaleConfig::Hpa {
            min_replicas,
            max_replicas,
            metrics,
        }) => ScaleConfig::Hpa {
            min_replicas: Some(min_replicas.unwrap_or(1)),
            max_replicas: Some(match max_replicas {
                Some(m) if m != 0 => m,
                _ => 10,
            }),
            metrics: if metrics.is_empty() {
                vec![HpaMetric {
                    resource: "cpu".to_string(),
                    target_average_utilization: 80,
                }]
            } else {
                metrics
            },
        },
    });

    out.traffic = Some(out.traffic.unwrap_or(TrafficConfig::None));

    out.validations = Some(default_validations(out.validations));

    out
}

fn default_validations(validations: Option<ValidationList>) -> ValidationList {
    let mut v = validations.unwrap_or_default();

    if v.initial_delay.is_none() {
        v.initial_delay = Some(DEFAULT_INITIAL_DELAY.to_string());
    }
    if v.validation_period.is_none() {
        v.validation_period = Some(DEFAULT_VALIDATION_PERIOD.to_string());
    }
    if v.max_interval_period.is_none() {
        v.max_interval_period = Some(DEFAULT_MAX_INTERVAL_PERIOD.to_string());
    }
    if v.items.is_empty() {
        v.items.push(Validator::Manual {
            status: None,
            status_after_deadline: Some(ManualDeadlineStatus::None),
        });
    } else {
        v.items = v.items.into_iter().map(default_validator).collect();
    }

    v
}

fn default_validator(v: Validator) -> Validator {
    match v {
        Validator::Manual {
            status,
            status_after_deadline,
        } => Validator::Manual {
            status,
            status_after_deadline: Some(status_after_deadline.unwrap_or(ManualDeadlineStatus::None)),
        },
        Validator::LabelWatch { .. } => v,
        Validator::PromQl {
            prometheus_service,
            query,
            pod_name_key,
            all_pods_query,
            outcome,
        } => Validator::PromQl {
            prometheus_service: Some(
                prometheus_service.unwrap_or_else(|| DEFAULT_PROMETHEUS_SERVICE.to_string()),
            ),
            query,
            pod_name_key: Some(pod_name_key.unwrap_or_else(|| DEFAULT_POD_NAME_KEY.to_string())),
            all_pods_query,
            outcome: default_promql_outcome(outcome),
        },
    }
}

fn default_promql_outcome(outcome: PromQlOutcome) -> PromQlOutcome {
    match outcome {
        PromQlOutcome::ValueInRange { min, max } => PromQlOutcome::ValueInRange {
            min: Some(min.unwrap_or(0.0)),
            max: Some(max.unwrap_or(1.0)),
        },
        PromQlOutcome::DiscreteValueOutOfList {
            key,
            good_values,
            bad_values,
            tolerance_percent,
        } => PromQlOutcome::DiscreteValueOutOfList {
            key,
            good_values,
            bad_values,
            tolerance_percent: Some(tolerance_percent.unwrap_or(0.0)),
        },
        PromQlOutcome::ContinuousValueDeviation {
            max_deviation_percent,
        } => PromQlOutcome::ContinuousValueDeviation {
            max_deviation_percent: Some(max_deviation_percent.unwrap_or(10.0)),
        },
    }
}

/// Reject malformed specs. Expects `spec` to already be defaulted; called
/// from the reconcile loop right after the one-shot defaulting write.
pub fn validate_spec(spec: &CanarySpec) -> Result<(), SpecValidationError> {
    if spec.scale.is_none() {
        return Err(SpecValidationError::ScaleUnset);
    }

    let validations = spec.validations.as_ref();
    if validations.map(|v| v.items.is_empty()).unwrap_or(true) {
        return Err(SpecValidationError::EmptyValidationItems);
    }

    Ok(())
}

#[cfg(test)]
#[path = "defaulting_test.rs"]
mod tests;
