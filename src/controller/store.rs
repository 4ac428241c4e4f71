//! Object store access for the custodian
//!
//! Every read and write the reconcile path performs goes through
//! [`EtcdStore`], so the ownership logic can run against the API server or
//! an in-memory fake.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use crate::crd::Etcd;
use crate::error::{Error, Result};

/// Typed object store used by the reconcile path.
///
/// Writes carry the `resourceVersion` of the object passed in; a stale
/// version fails with `Error::Conflict` and is never silently overwritten.
#[async_trait]
pub trait EtcdStore: Send + Sync {
    /// Read an Etcd directly from the API server.
    ///
    /// Returns `Ok(None)` when it does not exist.
    async fn get_etcd(&self, namespace: &str, name: &str) -> Result<Option<Etcd>>;

    /// List Etcds in one namespace, or in all namespaces for `None`
    async fn list_etcds(&self, namespace: Option<&str>) -> Result<Vec<Etcd>>;

    /// List all StatefulSets in a namespace
    async fn list_statefulsets(&self, namespace: &str) -> Result<Vec<StatefulSet>>;

    /// Replace a StatefulSet, guarded by its resource version
    async fn update_statefulset(&self, sts: &StatefulSet) -> Result<StatefulSet>;

    /// Replace the status subresource of an Etcd, guarded by its resource version
    async fn update_etcd_status(&self, etcd: &Etcd) -> Result<Etcd>;
}

/// [`EtcdStore`] backed by the Kubernetes API
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map 404/409 API responses onto the store's error taxonomy
fn classify(err: kube::Error, what: String) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound(what),
        kube::Error::Api(ae) if ae.code == 409 => Error::Conflict(what),
        e => Error::KubeError(e),
    }
}

#[async_trait]
impl EtcdStore for KubeStore {
    async fn get_etcd(&self, namespace: &str, name: &str) -> Result<Option<Etcd>> {
        let api: Api<Etcd> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(etcd) => Ok(Some(etcd)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    async fn list_etcds(&self, namespace: Option<&str>) -> Result<Vec<Etcd>> {
        let api: Api<Etcd> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?;
        Ok(list.items)
    }

    async fn list_statefulsets(&self, namespace: &str) -> Result<Vec<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?;
        debug!(
            "Listed {} StatefulSets in namespace {}",
            list.items.len(),
            namespace
        );
        Ok(list.items)
    }

    async fn update_statefulset(&self, sts: &StatefulSet) -> Result<StatefulSet> {
        let namespace = sts.namespace().unwrap_or_else(|| "default".to_string());
        let name = sts.name_any();
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &namespace);

        api.replace(&name, &PostParams::default(), sts)
            .await
            .map_err(|e| classify(e, format!("statefulset {}/{}", namespace, name)))
    }

    async fn update_etcd_status(&self, etcd: &Etcd) -> Result<Etcd> {
        let namespace = etcd.namespace().unwrap_or_else(|| "default".to_string());
        let name = etcd.name_any();
        let api: Api<Etcd> = Api::namespaced(self.client.clone(), &namespace);

        let body = serde_json::to_vec(etcd)?;

        api.replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|e| classify(e, format!("etcd {}/{}", namespace, name)))
    }
}
