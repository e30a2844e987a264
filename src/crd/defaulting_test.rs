#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use crate::crd::types::{ManualDeadlineStatus, ScaleConfig, TrafficConfig, Validator, WorkloadTemplate};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

fn empty_spec() -> CanarySpec {
    CanarySpec {
        service_name: None,
        template: WorkloadTemplate {
            replicas: 1,
            selector: LabelSelector::default(),
            template: Default::default(),
        },
        scale: None,
        traffic: None,
        validations: None,
        schedule: None,
    }
}

#[test]
fn scenario_minimal_defaulting() {
    let spec = empty_spec();
    assert!(!is_defaulted(&spec));

    let defaulted = default_spec(&spec);
    assert!(is_defaulted(&defaulted));

    assert_eq!(
        defaulted.scale,
        Some(ScaleConfig::Static { replicas: Some(1) })
    );
    assert_eq!(defaulted.traffic, Some(TrafficConfig::None));

    let validations = defaulted.validations.expect("validations defaulted");
    assert_eq!(validations.validation_period.as_deref(), Some("15m"));
    assert_eq!(validations.initial_delay.as_deref(), Some("0s"));
    assert_eq!(validations.max_interval_period.as_deref(), Some("20s"));
    assert_eq!(validations.items.len(), 1);
    assert_eq!(
        validations.items[0],
        Validator::Manual {
            status: None,
            status_after_deadline: Some(ManualDeadlineStatus::None),
        }
    );
}

#[test]
fn invariant_defaulting_is_idempotent() {
    let spec = empty_spec();
    let once = default_spec(&spec);
    let twice = default_spec(&once);
    assert_eq!(once, twice);
    assert!(is_defaulted(&once));
}

#[test]
fn defaulting_preserves_explicit_static_replicas() {
    let mut spec = empty_spec();
    spec.scale = Some(ScaleConfig::Static { replicas: Some(5) });
    let defaulted = default_spec(&spec);
    assert_eq!(defaulted.scale, Some(ScaleConfig::Static { replicas: Some(5) }));
}

#[test]
fn defaulting_fills_hpa_bounds_and_metrics() {
    let mut spec = empty_spec();
    spec.scale = Some(ScaleConfig::Hpa {
        min_replicas: None,
        max_replicas: None,
        metrics: vec![],
    });
    let defaulted = default_spec(&spec);
    match defaulted.scale.unwrap() {
        ScaleConfig::Hpa {
            min_replicas,
            max_replicas,
            metrics,
        } => {
            assert_eq!(min_replicas, Some(1));
            assert_eq!(max_replicas, Some(10));
            assert_eq!(metrics.len(), 1);
            assert_eq!(metrics[0].target_average_utilization, 80);
        }
        _ => panic!("expected Hpa"),
    }
}

#[test]
fn validate_rejects_unset_scale() {
    let spec = empty_spec();
    assert_eq!(validate_spec(&spec), Err(SpecValidationError::ScaleUnset));
}

#[test]
fn validate_rejects_empty_validation_items() {
    let mut spec = empty_spec();
    spec.scale = Some(ScaleConfig::Static { replicas: Some(1) });
    spec.validations = Some(crate::crd::types::ValidationList::default());
    assert_eq!(
        validate_spec(&spec),
        Err(SpecValidationError::EmptyValidationItems)
    );
}

#[test]
fn validate_accepts_defaulted_spec() {
    let spec = default_spec(&empty_spec());
    assert!(validate_spec(&spec).is_ok());
}
