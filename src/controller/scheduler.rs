//! Scheduler (C7): wall-clock gating and requeue-interval arithmetic.
//!
//! Everything here is pure functions of timestamps so it needs no I/O and
//! is trivial to test without a cluster.

use crate::crd::types::{ManualDeadlineStatus, Validator};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid duration {0:?}")]
    Invalid(String),
}

/// Parse a Go-style duration string ("15m", "20s", "0s", "1h30m") into a
/// `std::time::Duration`. Supports the units the CRD actually uses:
/// `h`, `m`, `s`, `ms`.
pub fn parse_duration(raw: &str) -> Result<Duration, DurationParseError> {
    if raw.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let mut total = Duration::ZERO;
    let mut chars = raw.char_indices().peekable();
    let mut num_start = 0;

    while let Some(&(idx, c)) = chars.peek() {
        if c.is_ascii_digit() || c == '.' {
            chars.next();
            continue;
        }
        // First non-digit char after a run of digits: scan the unit suffix.
        let unit_start = idx;
        while let Some(&(_, c)) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                break;
            }
            chars.next();
        }
        let unit_end = chars.peek().map(|&(i, _)| i).unwrap_or(raw.len());
        let number: f64 = raw[num_start..unit_start]
            .parse()
            .map_err(|_| DurationParseError::Invalid(raw.to_string()))?;
        let unit = &raw[unit_start..unit_end];
        let secs = match unit {
            "h" => number * 3600.0,
            "m" => number * 60.0,
            "s" => number,
            "ms" => number / 1000.0,
            other => return Err(DurationParseError::Invalid(format!("unknown unit {other:?}"))),
        };
        total += Duration::from_secs_f64(secs.max(0.0));
        num_start = unit_end;
    }

    if num_start != raw.len() {
        return Err(DurationParseError::Invalid(raw.to_string()));
    }

    Ok(total)
}

/// Is `schedule` in the past (or unset)? If so, the resource is activated.
pub fn is_scheduled(schedule: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match schedule {
        None => true,
        Some(t) => now >= t,
    }
}

/// The wall-clock instant validation must conclude by:
/// `creation + initialDelay + validationPeriod`.
pub fn validation_deadline(
    creation: DateTime<Utc>,
    initial_delay: Duration,
    validation_period: Duration,
) -> DateTime<Utc> {
    creation
        + ChronoDuration::from_std(initial_delay).unwrap_or_default()
        + ChronoDuration::from_std(validation_period).unwrap_or_default()
}

/// `None` once `initialDelay` has elapsed; otherwise the remaining delay.
pub fn initial_delay_remaining(
    creation: DateTime<Utc>,
    initial_delay: Duration,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let deadline = creation + ChronoDuration::from_std(initial_delay).unwrap_or_default();
    if now >= deadline {
        None
    } else {
        (deadline - now).to_std().ok()
    }
}

/// Per-tick requeue interval during validation: `min(maxIntervalPeriod,
/// remaining_to_deadline)`, bounded below by 1s.
pub fn requeue_interval(now: DateTime<Utc>, deadline: DateTime<Utc>, max_interval: Duration) -> Duration {
    let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
    remaining.min(max_interval).max(Duration::from_secs(1))
}

/// Is there a Manual validator carrying `statusAfterDeadline="none"`? A
/// single such validator parks the rollout once the deadline passes, even
/// if other validators in the list would otherwise resolve the window.
pub fn any_manual_status_after_deadline_none(validators: &[Validator]) -> bool {
    validators.iter().any(|v| match v {
        Validator::Manual {
            status_after_deadline,
            ..
        } => matches!(status_after_deadline, Some(ManualDeadlineStatus::None) | None),
        _ => false,
    })
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
