//! Resource factories (C9): derived names and materialized canary
//! Deployment/Service objects (§6).

use crate::crd::fingerprint::FINGERPRINT_ANNOTATION;
use crate::crd::types::WorkloadTemplate;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

pub const NAME_LABEL: &str = "kanary.k8s-operators.dev/name";
pub const IS_KANARY_LABEL: &str = "kanary.k8s-operators.dev/iskanary";
pub const CANARY_POD_LABEL: &str = "kanary.k8s-operators.dev/canary-pod";

pub fn canary_deployment_name(primary_deployment: &str, canary_name: &str) -> String {
    format!("{primary_deployment}-kanary-{canary_name}")
}

pub fn kanary_service_name(primary_service: &str, canary_name: &str, overridden: Option<&str>) -> String {
    overridden
        .map(str::to_string)
        .unwrap_or_else(|| format!("{primary_service}-kanary-{canary_name}"))
}

/// An `ownerReferences` entry pointing at `owner`, so the canary artefact is
/// garbage-collected when the canary resource is deleted.
pub fn owner_reference<K>(owner: &K) -> Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&())
}

/// Materialize the canary Deployment from the embedded workload template.
/// Stamped with the fingerprint annotation and the `iskanary`/`name`
/// labels; selector and pod-template labels are merged with the kanary
/// bookkeeping labels so the primary Service (when `traffic.source`
/// requires it) can still match on the original selector too.
pub fn build_canary_deployment(
    namespace: &str,
    canary_name: &str,
    name: &str,
    template: &WorkloadTemplate,
    fingerprint: &str,
    owner: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference>,
) -> Deployment {
    let mut selector = template.selector.clone();
    selector
        .match_labels
        .get_or_insert_with(BTreeMap::new)
        .insert(NAME_LABEL.to_string(), canary_name.to_string());

    let mut pod_template = template.template.clone();
    let pod_meta = pod_template.metadata.get_or_insert_with(ObjectMeta::default);
    let pod_labels = pod_meta.labels.get_or_insert_with(BTreeMap::new);
    pod_labels.insert(NAME_LABEL.to_string(), canary_name.to_string());
    // Every canary pod carries this from birth, regardless of traffic mode,
    // so the kanary Service's selector (§4.4 step 1) always matches it.
    pod_labels.insert(CANARY_POD_LABEL.to_string(), "true".to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert(FINGERPRINT_ANNOTATION.to_string(), fingerprint.to_string());

    let mut labels = BTreeMap::new();
    labels.insert(IS_KANARY_LABEL.to_string(), "true".to_string());
    labels.insert(NAME_LABEL.to_string(), canary_name.to_string());

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: owner.map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(template.replicas),
            selector,
            template: pod_template,
            ..Default::default()
        }),
        status: None,
    }
}

/// Does `existing`'s fingerprint annotation match `expected`?
pub fn fingerprint_matches(existing: &Deployment, expected: &str) -> bool {
    existing
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(FINGERPRINT_ANNOTATION))
        .map(|v| v == expected)
        .unwrap_or(false)
}

/// Build (or reconcile) the dedicated kanary Service: same ports as
/// `primary`, `type=ClusterIP`, empty `clusterIP` so the API server
/// assigns one, selector scoped to canary pods only (§4.4 step 1).
///
/// NodePort/LoadBalancer primaries are downgraded to ClusterIP and their
/// node-port numbers cleared, since the kanary Service only ever needs
/// in-cluster routing to the canary pods.
pub fn build_kanary_service(
    namespace: &str,
    canary_name: &str,
    name: &str,
    primary: &Service,
    owner: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference>,
) -> Service {
    let ports = primary.spec.as_ref().and_then(|s| s.ports.clone()).map(|ports| {
        ports
            .into_iter()
            .map(|mut p| {
                p.node_port = None;
                p
            })
            .collect::<Vec<ServicePort>>()
    });

    let mut selector = BTreeMap::new();
    selector.insert(NAME_LABEL.to_string(), canary_name.to_string());
    selector.insert(CANARY_POD_LABEL.to_string(), "true".to_string());

    let mut labels = BTreeMap::new();
    labels.insert(NAME_LABEL.to_string(), canary_name.to_string());

    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            owner_references: owner.map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports,
            type_: Some("ClusterIP".to_string()),
            cluster_ip: None,
            ..Default::default()
        }),
        status: None,
    }
}

/// Structural equality of two Service specs, excluding `clusterIP` and
/// `loadBalancerIP` (server-assigned fields that must never be compared for
/// the "does this need an update?" check, see §4.4 tie-break policy).
pub fn service_specs_equal(a: &Service, b: &Service) -> bool {
    let normalize = |svc: &Service| {
        let mut spec = svc.spec.clone().unwrap_or_default();
        spec.cluster_ip = None;
        spec.cluster_ips = None;
        spec.load_balancer_ip = None;
        // Node ports are server-assigned when unspecified; normalize them
        // away too so a round-tripped Service doesn't spuriously differ.
        if let Some(ports) = spec.ports.as_mut() {
            for p in ports.iter_mut() {
                p.node_port = None;
            }
        }
        spec
    };
    normalize(a) == normalize(b)
}

#[cfg(test)]
#[path = "factories_test.rs"]
mod tests;
