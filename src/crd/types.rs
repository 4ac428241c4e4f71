//! Shared types for the Etcd custom resource

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the workload object backing an Etcd, independent of the
/// API version it was read with.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrossVersionObjectReference {
    /// API version of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Kind of the referent, e.g. "StatefulSet"
    pub kind: String,
    /// Name of the referent
    pub name: String,
}

/// Condition reported on the Etcd resource.
///
/// Conditions are observed on the owned StatefulSet and copied over one per
/// type.
///
/// # Examples
///
/// ```rust,no_run
/// use etcd_custodian::crd::Condition;
///
/// let condition = Condition::new("Available", "True", "MinimumReplicasAvailable", "");
/// ```
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

impl Condition {
    pub fn new(type_: &str, status: &str, reason: &str, message: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: None,
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }
}
