//! Condition helpers
//!
//! Etcd conditions are keyed by type: at most one entry per type, in the
//! order the types were first seen.

use k8s_openapi::api::apps::v1::StatefulSetCondition;

use crate::crd::Condition;

pub const CONDITION_STATUS_TRUE: &str = "True";

/// Convert a StatefulSet condition verbatim
pub fn from_statefulset_condition(condition: &StatefulSetCondition) -> Condition {
    Condition {
        type_: condition.type_.clone(),
        status: condition.status.clone(),
        last_transition_time: condition.last_transition_time.as_ref().map(|t| t.0.to_rfc3339()),
        reason: condition.reason.clone().unwrap_or_default(),
        message: condition.message.clone().unwrap_or_default(),
    }
}

/// Insert `condition`, replacing any existing condition of the same type in place
pub fn upsert_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

/// Build the Etcd condition list from a StatefulSet's conditions.
///
/// The last condition of a given type wins.
pub fn conditions_from_statefulset(conditions: &[StatefulSetCondition]) -> Vec<Condition> {
    let mut result = Vec::with_capacity(conditions.len());
    for condition in conditions {
        upsert_condition(&mut result, from_statefulset_condition(condition));
    }
    result
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check if a condition is true
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == CONDITION_STATUS_TRUE)
        .unwrap_or(false)
}
