//! Condition algebra (C1): the one routine all condition mutations go
//! through, preserving the transition-time invariant, plus the derived
//! status report (§4.8).

use crate::crd::types::{
    CanaryStatus, Condition, ConditionStatus, ConditionType, StatusReport, Validator,
};
use chrono::{DateTime, Utc};

/// Read the current condition of `type_`, if set.
pub fn get(status: &CanaryStatus, type_: ConditionType) -> Option<&Condition> {
    status.conditions.iter().find(|c| c.type_ == type_)
}

/// Is the condition of `type_` present and `True`?
pub fn is_true(status: &CanaryStatus, type_: ConditionType) -> bool {
    get(status, type_).map(|c| c.status == ConditionStatus::True) == Some(true)
}

/// Upsert a condition, preserving the invariant that `lastTransitionTime`
/// only advances when `status` actually flips. `lastUpdateTime` always
/// advances to `now`.
///
/// At most one entry per condition type is kept (insertion order for new
/// types, in-place update for existing ones).
pub fn set(
    status: &mut CanaryStatus,
    type_: ConditionType,
    condition_status: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    if let Some(existing) = status.conditions.iter_mut().find(|c| c.type_ == type_) {
        let transitioned = existing.status != condition_status;
        existing.status = condition_status;
        existing.last_update_time = now;
        if transitioned {
            existing.last_transition_time = now;
        }
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        return;
    }

    status.conditions.push(Condition {
        type_,
        status: condition_status,
        last_update_time: now,
        last_transition_time: now,
        reason: reason.to_string(),
        message: message.to_string(),
    });
}

/// Clear a condition entirely (used when an error condition should
/// disappear on the first subsequent success rather than flip to False).
pub fn clear(status: &mut CanaryStatus, type_: ConditionType) {
    status.conditions.retain(|c| c.type_ != type_);
}

/// Structural equality of two statuses, ignoring `lastUpdateTime`, for the
/// no-write optimization: if nothing but timestamps changed, skip the API
/// write.
pub fn status_equal_ignoring_update_time(a: &CanaryStatus, b: &CanaryStatus) -> bool {
    if a.current_hash != b.current_hash || a.report != b.report {
        return false;
    }
    if a.conditions.len() != b.conditions.len() {
        return false;
    }
    a.conditions.iter().zip(b.conditions.iter()).all(|(x, y)| {
        x.type_ == y.type_
            && x.status == y.status
            && x.last_transition_time == y.last_transition_time
            && x.reason == y.reason
            && x.message == y.message
    })
}

/// Compute the derived, human-readable status report (§4.8) from the
/// current conditions and configured validators.
pub fn report(status: &CanaryStatus, validators: &[Validator], scale_name: &str, traffic_name: &str) -> StatusReport {
    let status_str = if is_true(status, ConditionType::Failed) {
        "Failed"
    } else if is_true(status, ConditionType::DeploymentUpdated) {
        "kanary statefulset updated"
    } else if is_true(status, ConditionType::Succeeded) {
        "Succeeded"
    } else if is_true(status, ConditionType::Running) {
        "Running"
    } else if is_true(status, ConditionType::Scheduled) {
        "Scheduled"
    } else if is_true(status, ConditionType::Errored) {
        "Errored"
    } else {
        "-"
    };

    let validation = validators
        .iter()
        .map(Validator::kind_name)
        .collect::<Vec<_>>()
        .join(",");

    StatusReport {
        status: status_str.to_string(),
        validation,
        scale: scale_name.to_string(),
        traffic: traffic_name.to_string(),
    }
}

#[cfg(test)]
#[path = "conditions_test.rs"]
mod tests;
