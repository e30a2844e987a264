//! Custom resource types: schema (§3), defaulting/validation (§4.1) and
//! fingerprinting (§4.2).

pub mod defaulting;
pub mod fingerprint;
pub mod rollout;
pub mod types;

pub use rollout::{
    CanaryResource, CanarySpec, KanaryDeployment, KanaryDeploymentSpec, KanaryStatefulset,
    KanaryStatefulsetSpec, RolloutMode,
};
