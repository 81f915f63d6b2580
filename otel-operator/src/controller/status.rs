//! Status assembly for the instance after a reconciliation pass.

use chrono::Utc;

use crate::crd::{
    Condition, ConditionStatus, ConditionType, OpenTelemetryCollectorStatus,
};
use crate::error::Error;

/// Status after a pass where every child converged.
pub fn ready(observed_generation: Option<i64>, applied: usize) -> OpenTelemetryCollectorStatus {
    let now = Utc::now().to_rfc3339();
    OpenTelemetryCollectorStatus {
        phase: Some("Running".to_string()),
        message: Some(format!("{applied} resources applied")),
        observed_generation,
        last_updated: Some(now.clone()),
        conditions: Some(vec![
            condition(
                ConditionType::Available,
                ConditionStatus::True,
                "ApplySucceeded",
                "All resources applied",
                &now,
            ),
            condition(
                ConditionType::Degraded,
                ConditionStatus::False,
                "ApplySucceeded",
                "All resources applied",
                &now,
            ),
        ]),
    }
}

/// Status after a failed pass. The error message lands verbatim in both
/// the phase message and the Degraded condition so a bad spec value is
/// visible from the instance itself.
pub fn degraded(observed_generation: Option<i64>, err: &Error) -> OpenTelemetryCollectorStatus {
    let now = Utc::now().to_rfc3339();
    let message = err.to_string();
    OpenTelemetryCollectorStatus {
        phase: Some("Failed".to_string()),
        message: Some(message.clone()),
        observed_generation,
        last_updated: Some(now.clone()),
        conditions: Some(vec![
            condition(
                ConditionType::Available,
                ConditionStatus::False,
                reason_for(err),
                &message,
                &now,
            ),
            condition(
                ConditionType::Degraded,
                ConditionStatus::True,
                reason_for(err),
                &message,
                &now,
            ),
        ]),
    }
}

fn reason_for(err: &Error) -> &'static str {
    match err {
        Error::Validation { .. } => "InvalidSpec",
        Error::Generation(_) => "GenerationFailed",
        Error::Apply { .. } => "ApplyFailed",
        Error::KubeApi(_) | Error::Serialization(_) => "InternalError",
    }
}

fn condition(
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: &str,
) -> Condition {
    Condition {
        type_,
        status,
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(now.to_string()),
    }
}

/// Upsert new conditions over the previous set by type, keeping foreign
/// types and a stable order to avoid churny status diffs.
pub fn merge_conditions(
    existing: Option<&Vec<Condition>>,
    incoming: Vec<Condition>,
) -> Vec<Condition> {
    let mut out = existing.cloned().unwrap_or_default();
    for inc in incoming {
        if let Some(idx) = out.iter().position(|c| c.type_ == inc.type_) {
            out[idx] = inc;
        } else {
            out.push(inc);
        }
    }
    out.sort_by_key(|c| cond_rank(&c.type_));
    out
}

fn cond_rank(t: &ConditionType) -> u8 {
    match t {
        ConditionType::Available => 0,
        ConditionType::Progressing => 1,
        ConditionType::Degraded => 2,
        ConditionType::Unknown => 250,
    }
}
