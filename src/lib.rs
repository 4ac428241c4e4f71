//! etcd-custodian: ownership reconciliation for Etcd resources
//!
//! This crate provides a Kubernetes controller that keeps each `Etcd`
//! resource in charge of the StatefulSet its label selector picks out:
//! matching orphans are adopted, owned StatefulSets that stop matching are
//! released, and the Etcd status mirrors the owned StatefulSet.

pub mod controller;
pub mod crd;
pub mod error;
pub mod telemetry;

#[cfg(feature = "rest-api")]
pub mod rest_api;

use std::time::Duration;

pub use crate::error::{Error, Result};

/// Delay before an Etcd without a StatefulSet is looked at again
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// Delay before a failed reconciliation is retried
pub const DEFAULT_ERROR_REQUEUE_DELAY: Duration = Duration::from_secs(1);

/// Runtime configuration of the custodian
#[derive(Clone, Debug)]
pub struct CustodianConfig {
    /// Namespace to watch, all namespaces when `None`
    pub namespace: Option<String>,
    /// Number of Etcds reconciled concurrently
    pub workers: u16,
    pub requeue_delay: Duration,
    pub error_requeue_delay: Duration,
}

impl Default for CustodianConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            workers: 3,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            error_requeue_delay: DEFAULT_ERROR_REQUEUE_DELAY,
        }
    }
}
