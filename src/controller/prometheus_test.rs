use super::*;

#[test]
fn parses_successful_response_with_labels() {
    let body = r#"{
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [
                {"metric": {"pod": "app-canary-0"}, "value": [1700000000, "0.42"]},
                {"metric": {"pod": "app-canary-1"}, "value": [1700000000, "1.1"]}
            ]
        }
    }"#;

    let samples = parse_instant_query(body).expect("parses");
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].label("pod"), Some("app-canary-0"));
    assert_eq!(samples[0].value, 0.42);
    assert_eq!(samples[1].value, 1.1);
}

#[test]
fn parses_empty_result_as_no_signal() {
    let body = r#"{"status": "success", "data": {"resultType": "vector", "result": []}}"#;
    let samples = parse_instant_query(body).expect("parses");
    assert!(samples.is_empty());
}

#[test]
fn rejects_non_success_status() {
    let body = r#"{"status": "error", "data": {"resultType": "vector", "result": []}}"#;
    assert!(matches!(
        parse_instant_query(body),
        Err(PrometheusError::QueryFailed(_))
    ));
}

#[test]
fn rejects_malformed_json() {
    assert!(matches!(parse_instant_query("not json"), Err(PrometheusError::Parse(_))));
}

#[test]
fn rejects_unparseable_value() {
    let body = r#"{"status": "success", "data": {"result": [{"metric": {}, "value": [1, "not-a-number"]}]}}"#;
    assert!(matches!(parse_instant_query(body), Err(PrometheusError::Parse(_))));
}
