//! Controller module for Etcd reconciliation
//! This module contains the main controller loop, the ownership logic
//! between Etcds and StatefulSets, and the status projection.

pub mod conditions;
pub mod health;
#[cfg(feature = "metrics")]
pub mod metrics;
mod reconciler;
pub mod ref_manager;
pub mod revalidator;
pub mod selector;
pub mod status;
pub mod store;
#[cfg(test)]
pub(crate) mod test_support;

pub use health::{HealthCheck, StatefulSetHealth};
pub use reconciler::{
    owners_for_statefulset, reconcile_etcd, run_controller, ControllerState, Disposition,
};
pub use ref_manager::{controller_of, controller_reference, StatefulSetRefManager};
pub use revalidator::{DeletionRevalidator, OwnerIdentity};
pub use selector::LabelMatcher;
pub use status::{desired_status, StatusAggregator};
pub use store::{EtcdStore, KubeStore};
