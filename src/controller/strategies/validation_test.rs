use super::*;

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn sample(pairs: &[(&str, &str)], value: f64) -> Sample {
    Sample {
        labels: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        value,
    }
}

// --- Manual -----------------------------------------------------------

#[test]
fn manual_valid_forces_success() {
    let outcome = evaluate_manual(Some(ManualStatus::Valid), None, false);
    assert!(outcome.force_success_now);
    assert!(!outcome.is_failed);
}

#[test]
fn manual_invalid_fails_regardless_of_deadline() {
    let outcome = evaluate_manual(Some(ManualStatus::Invalid), None, false);
    assert!(outcome.is_failed);
    assert_eq!(outcome.comment, "manual.status=invalid");
}

#[test]
fn manual_none_waits_before_deadline() {
    let outcome = evaluate_manual(None, Some(ManualDeadlineStatus::Invalid), false);
    assert!(!outcome.is_failed);
    assert!(!outcome.force_success_now);
}

#[test]
fn manual_none_fails_after_deadline_with_invalid_policy() {
    let outcome = evaluate_manual(None, Some(ManualDeadlineStatus::Invalid), true);
    assert!(outcome.is_failed);
}

#[test]
fn manual_none_passes_after_deadline_with_valid_policy_without_explicit_force() {
    let outcome = evaluate_manual(None, Some(ManualDeadlineStatus::Valid), true);
    assert!(!outcome.is_failed);
    assert!(!outcome.force_success_now);
    assert!(outcome.comment.contains("valid"));
}

#[test]
fn manual_none_policy_never_resolves() {
    let outcome = evaluate_manual(None, Some(ManualDeadlineStatus::None), true);
    assert!(!outcome.is_failed);
    assert!(!outcome.force_success_now);
}

// --- LabelWatch ---------------------------------------------------------

#[test]
fn label_watch_fails_on_deployment_label_match() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("broken", "true")])),
        ..Default::default()
    };
    let outcome = evaluate_label_watch(Some(&selector), None, &labels(&[("broken", "true")]), &[]);
    assert!(outcome.is_failed);
}

#[test]
fn label_watch_fails_on_pod_label_match() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("canary-invalid", "true")])),
        ..Default::default()
    };
    let pods = vec![labels(&[("canary-invalid", "true")])];
    let outcome = evaluate_label_watch(None, Some(&selector), &labels(&[]), &pods);
    assert!(outcome.is_failed);
}

#[test]
fn label_watch_waits_with_no_match() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("broken", "true")])),
        ..Default::default()
    };
    let outcome = evaluate_label_watch(Some(&selector), None, &labels(&[]), &[]);
    assert!(!outcome.is_failed);
}

// --- PromQL outcome shapes ----------------------------------------------

#[test]
fn value_in_range_fails_on_out_of_bounds_sample() {
    let samples = vec![sample(&[("pod", "a")], 5.0), sample(&[("pod", "b")], 50.0)];
    let outcome = evaluate_value_in_range(&samples, 0.0, 10.0, "pod", false);
    assert!(outcome.is_failed);
    assert!(outcome.comment.contains('b'));
}

#[test]
fn value_in_range_passes_within_bounds() {
    let samples = vec![sample(&[("pod", "a")], 5.0)];
    let outcome = evaluate_value_in_range(&samples, 0.0, 10.0, "pod", false);
    assert!(!outcome.is_failed);
}

#[test]
fn discrete_value_fails_when_bad_ratio_exceeds_tolerance() {
    let samples = vec![
        sample(&[("pod", "a"), ("status", "200")], 90.0),
        sample(&[("pod", "a"), ("status", "500")], 10.0),
    ];
    let outcome = evaluate_discrete_out_of_list(
        &samples,
        "status",
        &["200".to_string()],
        &[],
        5.0,
        "pod",
        false,
    );
    assert!(outcome.is_failed);
}

#[test]
fn discrete_value_passes_within_tolerance() {
    let samples = vec![
        sample(&[("pod", "a"), ("status", "200")], 99.0),
        sample(&[("pod", "a"), ("status", "500")], 1.0),
    ];
    let outcome = evaluate_discrete_out_of_list(
        &samples,
        "status",
        &["200".to_string()],
        &[],
        5.0,
        "pod",
        false,
    );
    assert!(!outcome.is_failed);
}

#[test]
fn discrete_value_excludes_pods_with_no_samples() {
    let outcome = evaluate_discrete_out_of_list(&[], "status", &["200".to_string()], &[], 5.0, "pod", false);
    assert!(!outcome.is_failed);
}

#[test]
fn continuous_deviation_fails_past_max() {
    let samples = vec![sample(&[("pod", "a")], 1.5)];
    let outcome = evaluate_continuous_deviation(&samples, 10.0, "pod", false);
    assert!(outcome.is_failed);
}

#[test]
fn continuous_deviation_passes_within_max() {
    let samples = vec![sample(&[("pod", "a")], 1.02)];
    let outcome = evaluate_continuous_deviation(&samples, 10.0, "pod", false);
    assert!(!outcome.is_failed);
}

// --- PromQL via the mock client ------------------------------------------

#[tokio::test]
async fn evaluate_promql_waits_on_empty_result_set() {
    let prometheus = PrometheusClient::new_mock();
    prometheus.set_mock_response(
        r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#.to_string(),
    );
    let outcome = evaluate_promql(
        &prometheus,
        "prometheus:9090",
        "up",
        "pod",
        false,
        &PromQlOutcome::ValueInRange { min: Some(0.0), max: Some(1.0) },
    )
    .await;
    assert!(!outcome.is_failed);
    assert!(!outcome.errored, "no signal is not a failure and not an error");
}

#[tokio::test]
async fn evaluate_promql_surfaces_query_error_as_errored_not_failed() {
    let prometheus = PrometheusClient::new_mock();
    prometheus.set_mock_error("connection refused");
    let outcome = evaluate_promql(
        &prometheus,
        "prometheus:9090",
        "up",
        "pod",
        false,
        &PromQlOutcome::ValueInRange { min: Some(0.0), max: Some(1.0) },
    )
    .await;
    assert!(outcome.errored);
    assert!(!outcome.is_failed, "a query error is not a validation failure");
    assert!(outcome.comment.contains("connection refused"));
}

#[tokio::test]
async fn evaluate_promql_fails_on_out_of_range_sample_via_the_client() {
    let prometheus = PrometheusClient::new_mock();
    prometheus.set_mock_response(
        r#"{"status":"success","data":{"resultType":"vector","result":[
            {"metric":{"pod":"web-a"},"value":[0,"1.7"]}
        ]}}"#
            .to_string(),
    );
    let outcome = evaluate_promql(
        &prometheus,
        "prometheus:9090",
        "up",
        "pod",
        false,
        &PromQlOutcome::ValueInRange { min: Some(0.0), max: Some(1.0) },
    )
    .await;
    assert!(outcome.is_failed);
    assert!(outcome.comment.contains("web-a"));
}

#[tokio::test]
async fn evaluate_promql_via_evaluate_all_surfaces_errored_without_failing_composite() {
    let prometheus = PrometheusClient::new_mock();
    prometheus.set_mock_error("timeout");
    let validators = vec![Validator::PromQl {
        prometheus_service: None,
        query: "up".to_string(),
        pod_name_key: None,
        all_pods_query: false,
        outcome: PromQlOutcome::ValueInRange { min: Some(0.0), max: Some(1.0) },
    }];
    let outcome = evaluate_all(&prometheus, &validators, &BTreeMap::new(), &[], false).await;
    assert!(outcome.errored);
    assert!(!outcome.is_failed);
}

// --- Composition ---------------------------------------------------------

#[tokio::test]
async fn composition_fails_if_any_validator_fails() {
    let prometheus = PrometheusClient::new();
    let validators = vec![
        Validator::Manual {
            status: Some(ManualStatus::Invalid),
            status_after_deadline: None,
        },
        Validator::Manual {
            status: Some(ManualStatus::Valid),
            status_after_deadline: None,
        },
    ];
    let outcome = evaluate_all(&prometheus, &validators, &BTreeMap::new(), &[], false).await;
    assert!(outcome.is_failed);
    assert!(!outcome.succeeded);
}

#[tokio::test]
async fn composition_succeeds_only_if_all_force_success() {
    let prometheus = PrometheusClient::new();
    let validators = vec![
        Validator::Manual {
            status: Some(ManualStatus::Valid),
            status_after_deadline: None,
        },
        Validator::Manual {
            status: None,
            status_after_deadline: Some(ManualDeadlineStatus::None),
        },
    ];
    let outcome = evaluate_all(&prometheus, &validators, &BTreeMap::new(), &[], false).await;
    assert!(!outcome.succeeded, "second validator hasn't force-succeeded");

    let validators = vec![
        Validator::Manual {
            status: Some(ManualStatus::Valid),
            status_after_deadline: None,
        },
        Validator::Manual {
            status: Some(ManualStatus::Valid),
            status_after_deadline: None,
        },
    ];
    let outcome = evaluate_all(&prometheus, &validators, &BTreeMap::new(), &[], false).await;
    assert!(outcome.succeeded);
}

#[tokio::test]
async fn composition_waits_with_empty_validator_list_force_success_vacuously_true_but_unused() {
    let prometheus = PrometheusClient::new();
    let outcome = evaluate_all(&prometheus, &[], &BTreeMap::new(), &[], false).await;
    assert!(!outcome.is_failed);
}
