//! Deletion-safe revalidation of an owner before ownership changes
//!
//! StatefulSets are listed some time before they are adopted or released.
//! In between, the owning Etcd may have been deleted, or deleted and
//! recreated under the same name. Before each ownership mutation the owner
//! is re-read, bypassing any cache, and checked again.

use std::fmt;

use futures::future::BoxFuture;
use futures::FutureExt;
use kube::{Resource, ResourceExt};
use tracing::debug;

use super::store::EtcdStore;
use crate::crd::Etcd;
use crate::error::{Error, Result};

/// Identity of an owner as captured when reconciliation began
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerIdentity {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl OwnerIdentity {
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_else(|| "default".to_string()),
            name: obj.name_any(),
            uid: obj.uid().unwrap_or_default(),
        }
    }
}

impl fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

type FetchOwner<'a, K> = Box<dyn Fn() -> BoxFuture<'a, Result<Option<K>>> + Send + Sync + 'a>;

/// Re-reads an owner right before an ownership mutation is committed.
///
/// Nothing is fetched until [`revalidate`](Self::revalidate) is called.
pub struct DeletionRevalidator<'a, K> {
    expected: OwnerIdentity,
    fetch: FetchOwner<'a, K>,
}

impl<'a, K> DeletionRevalidator<'a, K>
where
    K: Resource + Send,
{
    /// Wrap an uncached fetch of the owner identified by `expected`
    pub fn new<F>(expected: OwnerIdentity, fetch: F) -> Self
    where
        F: Fn() -> BoxFuture<'a, Result<Option<K>>> + Send + Sync + 'a,
    {
        Self {
            expected,
            fetch: Box::new(fetch),
        }
    }

    /// Fetch the owner again and confirm it may still adopt or release.
    ///
    /// # Errors
    ///
    /// - `Error::OwnerVanished` if the owner no longer exists
    /// - `Error::OwnerBeingDeleted` if it carries a deletion timestamp
    /// - `Error::OwnerIdentityChanged` if its uid differs from the one
    ///   captured at the start of reconciliation
    /// - any other store error unchanged
    pub async fn revalidate(&self) -> Result<K> {
        let found = match (self.fetch)().await {
            Ok(Some(owner)) => owner,
            Ok(None) => return Err(self.vanished()),
            Err(e) if e.is_not_found() => return Err(self.vanished()),
            Err(e) => return Err(e),
        };

        if found.meta().deletion_timestamp.is_some() {
            return Err(Error::OwnerBeingDeleted {
                namespace: self.expected.namespace.clone(),
                name: self.expected.name.clone(),
            });
        }

        let found_uid = found.uid().unwrap_or_default();
        if found_uid != self.expected.uid {
            return Err(Error::OwnerIdentityChanged {
                namespace: self.expected.namespace.clone(),
                name: self.expected.name.clone(),
                expected: self.expected.uid.clone(),
                found: found_uid,
            });
        }

        debug!("Revalidated owner {} (uid {})", self.expected, found_uid);
        Ok(found)
    }

    fn vanished(&self) -> Error {
        Error::OwnerVanished {
            namespace: self.expected.namespace.clone(),
            name: self.expected.name.clone(),
        }
    }
}

impl<'a> DeletionRevalidator<'a, Etcd> {
    /// Revalidator reading the Etcd straight from the store
    pub fn for_etcd(store: &'a dyn EtcdStore, etcd: &Etcd) -> Self {
        let expected = OwnerIdentity::of(etcd);
        let namespace = expected.namespace.clone();
        let name = expected.name.clone();

        Self::new(expected, move || {
            let namespace = namespace.clone();
            let name = name.clone();
            async move { store.get_etcd(&namespace, &name).await }.boxed()
        })
    }
}
