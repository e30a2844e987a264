//! Types shared by both canary resource kinds: scale/traffic/validation
//! configuration, the condition algebra, and the derived status report.
//!
//! These are the "sub-configurations" of §3 of the design: every field here
//! is identical in shape whether the canary targets a Deployment or a
//! StatefulSet, which is what lets the two reconcilers share almost all of
//! their strategy code.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// `schemars` has no derivable schema for arbitrary/foreign types; used on
/// pod template fields that should round-trip through the API server with
/// `x-kubernetes-preserve-unknown-fields: true` rather than a full schema.
pub fn any_object(_generator: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
    })
}

// ---------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScaleConfig {
    Static {
        /// `None` means "unset"; the defaulter fills it to 1, distinguishing
        /// an absent field from an explicit `replicas: 0`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replicas: Option<i32>,
    },
    Hpa {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_replicas: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_replicas: Option<i32>,
        #[serde(default)]
        metrics: Vec<HpaMetric>,
    },
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HpaMetric {
    pub resource: String,
    pub target_average_utilization: i32,
}

// ---------------------------------------------------------------------
// Traffic
// ---------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum TrafficConfig {
    None,
    Service,
    KanaryService {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kanary_service: Option<String>,
    },
    Both {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kanary_service: Option<String>,
    },
    Mirror {
        #[serde(default)]
        mirror: MirrorConfig,
    },
}

impl TrafficConfig {
    pub fn source_name(&self) -> &'static str {
        match self {
            TrafficConfig::None => "none",
            TrafficConfig::Service => "service",
            TrafficConfig::KanaryService { .. } => "kanary-service",
            TrafficConfig::Both { .. } => "both",
            TrafficConfig::Mirror { .. } => "mirror",
        }
    }

    pub fn wants_kanary_service(&self) -> bool {
        matches!(self, TrafficConfig::KanaryService { .. } | TrafficConfig::Both { .. })
    }

    pub fn wants_pod_labeling(&self) -> bool {
        matches!(self, TrafficConfig::Service | TrafficConfig::Both { .. })
    }

    pub fn kanary_service_override(&self) -> Option<&str> {
        match self {
            TrafficConfig::KanaryService { kanary_service } => kanary_service.as_deref(),
            TrafficConfig::Both { kanary_service } => kanary_service.as_deref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<i32>,
}

// ---------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_interval_period: Option<String>,
    #[serde(default)]
    pub no_update: bool,
    #[serde(default)]
    pub items: Vec<Validator>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Validator {
    Manual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ManualStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_after_deadline: Option<ManualDeadlineStatus>,
    },
    LabelWatch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pod_invalidation_labels: Option<LabelSelector>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deployment_invalidation_labels: Option<LabelSelector>,
    },
    #[serde(rename = "PromQL")]
    PromQl {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prometheus_service: Option<String>,
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pod_name_key: Option<String>,
        #[serde(default)]
        all_pods_query: bool,
        outcome: PromQlOutcome,
    },
}

impl Validator {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Validator::Manual { .. } => "manual",
            Validator::LabelWatch { .. } => "labelWatch",
            Validator::PromQl { .. } => "promQL",
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ManualStatus {
    Valid,
    Invalid,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ManualDeadlineStatus {
    None,
    Valid,
    Invalid,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(tag = "shape", rename_all = "camelCase")]
pub enum PromQlOutcome {
    ValueInRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    DiscreteValueOutOfList {
        key: String,
        #[serde(default)]
        good_values: Vec<String>,
        #[serde(default)]
        bad_values: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tolerance_percent: Option<f64>,
    },
    ContinuousValueDeviation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_deviation_percent: Option<f64>,
    },
}

// ---------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    Scheduled,
    Activated,
    Running,
    Succeeded,
    Failed,
    DeploymentUpdated,
    Errored,
    Traffic,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Scheduled => "Scheduled",
            ConditionType::Activated => "Activated",
            ConditionType::Running => "Running",
            ConditionType::Succeeded => "Succeeded",
            ConditionType::Failed => "Failed",
            ConditionType::DeploymentUpdated => "DeploymentUpdated",
            ConditionType::Errored => "Errored",
            ConditionType::Traffic => "Traffic",
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub last_update_time: DateTime<Utc>,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------
// Status report
// ---------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub validation: String,
    #[serde(default)]
    pub scale: String,
    #[serde(default)]
    pub traffic: String,
}

/// The status fields common to both `KanaryDeployment` and
/// `KanaryStatefulset`: condition list, fingerprint, and derived report.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanaryStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub report: StatusReport,
}

// ---------------------------------------------------------------------
// Workload template
// ---------------------------------------------------------------------

/// The embedded workload template: replica count, label selector, and pod
/// template used to materialize the canary artefact. Deliberately mirrors
/// the shape of `DeploymentSpec`/`StatefulSetSpec` without depending on
/// either, since the same template drives both kinds.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadTemplate {
    #[serde(default)]
    pub replicas: i32,
    pub selector: LabelSelector,
    #[schemars(schema_with = "any_object")]
    pub template: k8s_openapi::api::core::v1::PodTemplateSpec,
}
