//! Ownership arbitration between an Etcd and StatefulSets
//!
//! The ref manager decides which StatefulSets in the Etcd's namespace belong
//! to it. Orphans matching the selector are adopted, owned StatefulSets that
//! stopped matching are released, and StatefulSets controlled by anybody
//! else are left alone. Every adoption and release re-reads the owner first
//! (see [`DeletionRevalidator`]).

use std::fmt;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use super::revalidator::{DeletionRevalidator, OwnerIdentity};
use super::selector::LabelMatcher;
use super::store::EtcdStore;
#[cfg(feature = "metrics")]
use super::metrics;
use crate::crd::Etcd;
use crate::error::Result;

/// Controller reference pointing at `etcd`
pub fn controller_reference(etcd: &Etcd) -> OwnerReference {
    OwnerReference {
        api_version: Etcd::api_version(&()).to_string(),
        kind: Etcd::kind(&()).to_string(),
        name: etcd.name_any(),
        uid: etcd.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// The controlling owner reference of an object, if any
pub fn controller_of<K: Resource>(obj: &K) -> Option<&OwnerReference> {
    obj.meta()
        .owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOperation {
    Adopt,
    Release,
}

impl ClaimOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimOperation::Adopt => "adopt",
            ClaimOperation::Release => "release",
        }
    }
}

/// An intended ownership change, valid for one reconciliation only
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipClaim {
    pub owner: OwnerIdentity,
    pub child: String,
    pub operation: ClaimOperation,
}

impl fmt::Display for OwnershipClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} statefulset {}/{} for etcd {}",
            self.operation.as_str(),
            self.owner.namespace,
            self.child,
            self.owner
        )
    }
}

#[derive(Debug)]
enum Ownership<'o> {
    Ours,
    Orphan,
    Foreign(&'o OwnerReference),
}

pub struct StatefulSetRefManager<'a> {
    store: &'a dyn EtcdStore,
    owner: &'a Etcd,
    identity: OwnerIdentity,
    matcher: LabelMatcher,
    revalidator: DeletionRevalidator<'a, Etcd>,
}

impl<'a> StatefulSetRefManager<'a> {
    pub fn new(
        store: &'a dyn EtcdStore,
        owner: &'a Etcd,
        matcher: LabelMatcher,
        revalidator: DeletionRevalidator<'a, Etcd>,
    ) -> Self {
        Self {
            store,
            owner,
            identity: OwnerIdentity::of(owner),
            matcher,
            revalidator,
        }
    }

    fn ownership<'o>(&self, sts: &'o StatefulSet) -> Ownership<'o> {
        match controller_of(sts) {
            None => Ownership::Orphan,
            Some(r) if r.uid == self.identity.uid => Ownership::Ours,
            Some(r) => Ownership::Foreign(r),
        }
    }

    /// List the StatefulSets in the owner's namespace, adopt and release as
    /// needed, and return those now controlled by the owner, sorted by name.
    ///
    /// Only a failed listing is an error. Adoptions and releases that fail
    /// are logged and skipped; they show up as a shorter result.
    #[instrument(skip(self), fields(name = %self.identity.name, namespace = %self.identity.namespace))]
    pub async fn claim_statefulsets(&self) -> Result<Vec<StatefulSet>> {
        let candidates = self
            .store
            .list_statefulsets(&self.identity.namespace)
            .await?;

        let (matching, non_matching): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|sts| self.matcher.matches(sts.labels()));

        // An owner on its way out adopts nothing and releases nothing
        let owner_deleting = self.owner.meta().deletion_timestamp.is_some();
        let mut claimed = Vec::new();

        for sts in matching {
            match self.ownership(&sts) {
                Ownership::Ours => claimed.push(sts),
                Ownership::Foreign(r) => {
                    info!(
                        "StatefulSet {} matches but is controlled by {} {} (uid {}), skipping",
                        sts.name_any(),
                        r.kind,
                        r.name,
                        r.uid
                    );
                }
                Ownership::Orphan => {
                    if owner_deleting {
                        debug!(
                            "Not adopting StatefulSet {}: owner is being deleted",
                            sts.name_any()
                        );
                        continue;
                    }
                    if sts.meta().deletion_timestamp.is_some() {
                        debug!(
                            "Not adopting StatefulSet {}: it is being deleted",
                            sts.name_any()
                        );
                        continue;
                    }
                    if let Some(adopted) = self.commit(ClaimOperation::Adopt, &sts).await {
                        claimed.push(adopted);
                    }
                }
            }
        }

        for sts in non_matching {
            if owner_deleting || !matches!(self.ownership(&sts), Ownership::Ours) {
                continue;
            }
            self.commit(ClaimOperation::Release, &sts).await;
        }

        claimed.sort_by_key(|sts| sts.name_any());
        Ok(claimed)
    }

    /// Revalidate the owner and apply one ownership change.
    ///
    /// Returns the stored StatefulSet on success; failures are logged and
    /// swallowed.
    async fn commit(&self, operation: ClaimOperation, sts: &StatefulSet) -> Option<StatefulSet> {
        let claim = OwnershipClaim {
            owner: self.identity.clone(),
            child: sts.name_any(),
            operation,
        };

        let result = match operation {
            ClaimOperation::Adopt => self.adopt(sts).await,
            ClaimOperation::Release => self.release(sts).await,
        };

        match result {
            Ok(updated) => {
                info!("Committed {}", claim);
                record(operation, "committed");
                Some(updated)
            }
            Err(e) if e.is_adoption_abort() => {
                info!("Abandoned {}: {}", claim, e);
                record(operation, "aborted");
                None
            }
            Err(e) => {
                warn!("Failed to {}: {}", claim, e);
                record(operation, "failed");
                None
            }
        }
    }

    async fn adopt(&self, sts: &StatefulSet) -> Result<StatefulSet> {
        let fresh = self.revalidator.revalidate().await?;

        let mut updated = sts.clone();
        let refs = updated.metadata.owner_references.get_or_insert_with(Vec::new);
        refs.retain(|r| r.controller != Some(true));
        refs.push(controller_reference(&fresh));

        self.store.update_statefulset(&updated).await
    }

    async fn release(&self, sts: &StatefulSet) -> Result<StatefulSet> {
        self.revalidator.revalidate().await?;

        let mut updated = sts.clone();
        if let Some(refs) = updated.metadata.owner_references.as_mut() {
            refs.retain(|r| r.uid != self.identity.uid);
            if refs.is_empty() {
                updated.metadata.owner_references = None;
            }
        }

        match self.store.update_statefulset(&updated).await {
            // Already gone, nothing left to release
            Err(e) if e.is_not_found() => Ok(updated),
            other => other,
        }
    }
}

#[cfg(feature = "metrics")]
fn record(operation: ClaimOperation, outcome: &str) {
    metrics::inc_ownership_change(operation.as_str(), outcome);
}

#[cfg(not(feature = "metrics"))]
fn record(_operation: ClaimOperation, _outcome: &str) {}
