//! Status aggregation from the owned StatefulSet into the Etcd
//!
//! The Etcd status is a projection of one StatefulSet snapshot. It is
//! rebuilt from scratch on every pass, so a status either reflects the
//! latest committed snapshot or the previous one, never a mix.

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::conditions::conditions_from_statefulset;
use super::health::HealthCheck;
use super::store::EtcdStore;
use crate::crd::{CrossVersionObjectReference, Etcd, EtcdStatus};
use crate::error::Result;

/// Compute the Etcd status for a StatefulSet snapshot
pub fn desired_status(sts: &StatefulSet, health: &dyn HealthCheck) -> EtcdStatus {
    let observed = sts.status.as_ref();
    let ready = match health.check(sts) {
        Ok(()) => true,
        Err(reason) => {
            debug!("StatefulSet {} is not healthy: {}", sts.name_any(), reason);
            false
        }
    };

    EtcdStatus {
        etcd: Some(CrossVersionObjectReference {
            api_version: Some(<StatefulSet as k8s_openapi::Resource>::API_VERSION.to_string()),
            kind: <StatefulSet as k8s_openapi::Resource>::KIND.to_string(),
            name: sts.name_any(),
        }),
        conditions: observed
            .and_then(|s| s.conditions.as_deref())
            .map(conditions_from_statefulset)
            .unwrap_or_default(),
        current_replicas: observed.and_then(|s| s.current_replicas).unwrap_or(0),
        ready_replicas: observed.and_then(|s| s.ready_replicas).unwrap_or(0),
        updated_replicas: observed.and_then(|s| s.updated_replicas).unwrap_or(0),
        ready: Some(ready),
    }
}

pub struct StatusAggregator<'a> {
    store: &'a dyn EtcdStore,
    health: &'a dyn HealthCheck,
}

impl<'a> StatusAggregator<'a> {
    pub fn new(store: &'a dyn EtcdStore, health: &'a dyn HealthCheck) -> Self {
        Self { store, health }
    }

    /// Project `sts` into the status of `etcd` and commit it.
    ///
    /// No write is issued when the status is already up to date. An Etcd
    /// deleted since it was fetched is not an error. A stale resource
    /// version surfaces as `Error::Conflict`; this function does not retry.
    #[instrument(skip(self, etcd, sts), fields(name = %etcd.name_any(), namespace = etcd.namespace()))]
    pub async fn update_status(&self, etcd: &Etcd, sts: &StatefulSet) -> Result<()> {
        let status = desired_status(sts, self.health);

        if etcd.status.as_ref() == Some(&status) {
            debug!("Status of etcd {} already up to date", etcd.name_any());
            return Ok(());
        }

        info!(
            "Updating etcd {} status from statefulset {} (ready: {:?})",
            etcd.name_any(),
            sts.name_any(),
            status.ready
        );

        let mut updated = etcd.clone();
        updated.status = Some(status);

        match self.store.update_etcd_status(&updated).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                info!(
                    "Etcd {} was deleted before its status could be committed",
                    etcd.name_any()
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
