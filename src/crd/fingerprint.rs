//! Fingerprinting (C3): a stable content hash of the desired workload
//! template, used as the sole equality token for "has the intended canary
//! changed?".
//!
//! MD5 is used for compactness, not integrity, since nothing here is exposed to
//! an adversarial input, and a 128-bit digest is plenty to distinguish
//! "same template" from "different template" for an annotation value.

use crate::crd::types::WorkloadTemplate;

/// The reserved annotation key carrying the fingerprint on canary artefacts.
pub const FINGERPRINT_ANNOTATION: &str = "kanary.k8s-operators.dev/md5";

/// Canonical JSON serialization of `template`, MD5-hashed, hex-encoded.
///
/// `serde_json`'s map serialization is insertion-order (not sorted), so
/// this is stable across calls for the same Rust value but is not a
/// canonical-JSON hash in the RFC 8785 sense; that's sufficient here since
/// both sides of every comparison are produced by this same function from
/// values built by this same controller.
pub fn fingerprint(template: &WorkloadTemplate) -> String {
    let bytes = serde_json::to_vec(template).unwrap_or_default();
    format!("{:x}", md5::compute(bytes))
}

#[cfg(test)]
#[path = "fingerprint_test.rs"]
mod tests;
