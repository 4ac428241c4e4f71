//! Response bodies of the REST API

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One Etcd with the parts of its status worth showing in a listing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSummary {
    pub name: String,
    pub namespace: String,
    /// Name of the owned StatefulSet, once one has been reported
    pub statefulset: Option<String>,
    pub ready: bool,
    pub ready_replicas: i32,
    pub current_replicas: i32,
    pub available: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EtcdListResponse {
    pub items: Vec<EtcdSummary>,
    pub total: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}
