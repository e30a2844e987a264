//! The two canary resource kinds (`KanaryDeployment`, `KanaryStatefulset`)
//! and the `CanarySpec` fields they share.
//!
//! Both kinds carry an identical set of sub-configurations (scale, traffic,
//! validations) and an identical status shape (`CanaryStatus`, see
//! `crate::crd::types`); the only thing that differs between them is which
//! primary workload kind they target. That's captured by the
//! [`CanaryResource`] trait so the reconcile core (`crate::controller`) can
//! be written once and instantiated twice.

use crate::crd::types::{CanaryStatus, ScaleConfig, TrafficConfig, ValidationList, WorkloadTemplate};
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Fields common to both `KanaryDeploymentSpec` and `KanaryStatefulsetSpec`.
///
/// Flattened into each kind's spec struct so the wire JSON has no extra
/// nesting level; `#[kube(..)]` can only be derived on the outer struct, so
/// the common fields live here and get pulled in via `#[serde(flatten)]`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanarySpec {
    /// Name of the Service that governs traffic to the primary workload.
    /// Required when `traffic.source` needs to read or patch it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// The candidate pod template, replica count and selector used to
    /// materialize the canary artefact.
    pub template: WorkloadTemplate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validations: Option<ValidationList>,

    /// Absolute start time; activation is gated until the wall clock
    /// crosses it. `None` means "activate immediately".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<DateTime<Utc>>,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kanary.k8s-operators.dev",
    version = "v1alpha1",
    kind = "KanaryDeployment",
    namespaced,
    status = "CanaryStatus",
    shortname = "kd",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.report.status"}"#,
    printcolumn = r#"{"name":"Validation", "type":"string", "jsonPath":".status.report.validation"}"#,
    printcolumn = r#"{"name":"Scale", "type":"string", "jsonPath":".status.report.scale"}"#,
    printcolumn = r#"{"name":"Traffic", "type":"string", "jsonPath":".status.report.traffic"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KanaryDeploymentSpec {
    /// Name of the primary `Deployment` this canary validates a change to.
    pub deployment_name: String,
    #[serde(flatten)]
    pub common: CanarySpec,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kanary.k8s-operators.dev",
    version = "v1alpha1",
    kind = "KanaryStatefulset",
    namespaced,
    status = "CanaryStatus",
    shortname = "ks",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.report.status"}"#,
    printcolumn = r#"{"name":"Validation", "type":"string", "jsonPath":".status.report.validation"}"#,
    printcolumn = r#"{"name":"Scale", "type":"string", "jsonPath":".status.report.scale"}"#,
    printcolumn = r#"{"name":"Traffic", "type":"string", "jsonPath":".status.report.traffic"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KanaryStatefulsetSpec {
    /// Name of the primary `StatefulSet` this canary validates a change to.
    pub statefulset_name: String,
    #[serde(flatten)]
    pub common: CanarySpec,
}

/// The rollout mode a canary resource targets: which kind of primary
/// workload it drives, and that workload's name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RolloutMode<'a> {
    Deployment(&'a str),
    Statefulset(&'a str),
}

impl RolloutMode<'_> {
    pub fn workload_name(&self) -> &str {
        match self {
            RolloutMode::Deployment(name) | RolloutMode::Statefulset(name) => name,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            RolloutMode::Deployment(_) => "deployment",
            RolloutMode::Statefulset(_) => "statefulset",
        }
    }
}

/// Uniform access to the fields the reconcile core needs from either canary
/// kind, so `crate::controller::reconcile` is written once and invoked from
/// two thin per-kind entry points.
pub trait CanaryResource:
    kube::Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + Serialize
    + for<'de> Deserialize<'de>
    + Send
    + Sync
    + 'static
{
    fn rollout_mode(&self) -> RolloutMode<'_>;
    fn common(&self) -> &CanarySpec;
    fn common_mut(&mut self) -> &mut CanarySpec;
    fn status(&self) -> Option<&CanaryStatus>;
    fn status_mut(&mut self) -> &mut Option<CanaryStatus>;
}

impl CanaryResource for KanaryDeployment {
    fn rollout_mode(&self) -> RolloutMode<'_> {
        RolloutMode::Deployment(&self.spec.deployment_name)
    }
    fn common(&self) -> &CanarySpec {
        &self.spec.common
    }
    fn common_mut(&mut self) -> &mut CanarySpec {
        &mut self.spec.common
    }
    fn status(&self) -> Option<&CanaryStatus> {
        self.status.as_ref()
    }
    fn status_mut(&mut self) -> &mut Option<CanaryStatus> {
        &mut self.status
    }
}

impl CanaryResource for KanaryStatefulset {
    fn rollout_mode(&self) -> RolloutMode<'_> {
        RolloutMode::Statefulset(&self.spec.statefulset_name)
    }
    fn common(&self) -> &CanarySpec {
        &self.spec.common
    }
    fn common_mut(&mut self) -> &mut CanarySpec {
        &mut self.spec.common
    }
    fn status(&self) -> Option<&CanaryStatus> {
        self.status.as_ref()
    }
    fn status_mut(&mut self) -> &mut Option<CanaryStatus> {
        &mut self.status
    }
}

#[cfg(test)]
#[path = "rollout_test.rs"]
mod tests;
