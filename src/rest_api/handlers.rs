//! HTTP handlers for the REST API

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use kube::ResourceExt;
use serde::Deserialize;
use tracing::{error, instrument};

use crate::controller::conditions::is_condition_true;
use crate::controller::ControllerState;
use crate::crd::Etcd;

use super::dto::{ErrorResponse, EtcdListResponse, EtcdSummary, HealthResponse};

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Metrics endpoint handler
pub async fn metrics() -> Result<String, StatusCode> {
    use prometheus_client::encoding::text::encode;
    let mut buffer = String::new();
    encode(&mut buffer, &crate::controller::metrics::REGISTRY).map_err(|e| {
        error!("Failed to encode metrics: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub namespace: Option<String>,
}

pub fn summarize(etcd: &Etcd) -> EtcdSummary {
    let status = etcd.status.clone().unwrap_or_default();
    EtcdSummary {
        name: etcd.name_any(),
        namespace: etcd.namespace().unwrap_or_default(),
        statefulset: status.etcd.map(|r| r.name),
        ready: status.ready.unwrap_or(false),
        ready_replicas: status.ready_replicas,
        current_replicas: status.current_replicas,
        available: is_condition_true(&status.conditions, "Available"),
    }
}

/// List Etcds, optionally limited to `?namespace=`
///
/// When the custodian watches a single namespace, asking for any other one
/// is a bad request.
#[instrument(skip(state))]
pub async fn list_etcds(
    State(state): State<Arc<ControllerState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<EtcdListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let namespace = match (&state.config.namespace, query.namespace) {
        (Some(watched), Some(requested)) if *watched != requested => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "namespace_not_watched",
                    &format!("only namespace {} is watched", watched),
                )),
            ));
        }
        (Some(watched), _) => Some(watched.clone()),
        (None, requested) => requested,
    };

    match state.store.list_etcds(namespace.as_deref()).await {
        Ok(etcds) => {
            let mut items: Vec<EtcdSummary> = etcds.iter().map(summarize).collect();
            items.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
            let total = items.len();
            Ok(Json(EtcdListResponse { items, total }))
        }
        Err(e) => {
            error!("Failed to list etcds: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("list_failed", &e.to_string())),
            ))
        }
    }
}
