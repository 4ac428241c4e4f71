//! Etcd Custom Resource Definition
//!
//! An Etcd describes an etcd cluster. The custodian does not create its
//! workload; it claims the StatefulSet matching `spec.selector` and mirrors
//! that StatefulSet's observed state into `status`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, CrossVersionObjectReference};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "druid.gardener.cloud",
    version = "v1alpha1",
    kind = "Etcd",
    namespaced,
    status = "EtcdStatus",
    shortname = "etcd",
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"StatefulSet","type":"string","jsonPath":".status.etcd.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSpec {
    /// Label query over the StatefulSets this Etcd should own.
    /// A missing selector claims nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "label_selector_schema")]
    pub selector: Option<LabelSelector>,
}

/// `LabelSelector` carries no schema of its own; accept any object and let
/// the selector parser validate it.
fn label_selector_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        metadata: Some(Box::new(schemars::schema::Metadata {
            description: Some(
                "Label query over the StatefulSets this Etcd should own".to_string(),
            ),
            ..Default::default()
        })),
        ..Default::default()
    };
    schema
        .extensions
        .insert("nullable".to_string(), serde_json::Value::Bool(true));
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    schemars::schema::Schema::Object(schema)
}

/// Observed state of an Etcd
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdStatus {
    /// The StatefulSet currently owned by this Etcd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd: Option<CrossVersionObjectReference>,

    /// Conditions copied from the owned StatefulSet, one per type
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub current_replicas: i32,

    #[serde(default)]
    pub ready_replicas: i32,

    #[serde(default)]
    pub updated_replicas: i32,

    /// Whether the owned StatefulSet passed its health check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
}
