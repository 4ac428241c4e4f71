//! In-memory object store and fixtures for controller tests
//!
//! `FakeStore` enforces resource versions the way the API server does: a
//! write carrying a stale `resourceVersion` is rejected with a conflict and
//! a write that changes nothing keeps the current version.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::{
    StatefulSet, StatefulSetCondition, StatefulSetSpec, StatefulSetStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, Time};
use kube::ResourceExt;

use super::ref_manager::controller_reference;
use super::store::EtcdStore;
use crate::crd::{Etcd, EtcdSpec};
use crate::error::{Error, Result};

type Key = (String, String);
type GetHook = Box<dyn FnMut(usize, &mut BTreeMap<Key, Etcd>) + Send>;
type StatefulSetHook = Box<dyn FnMut(usize, &mut BTreeMap<Key, StatefulSet>) + Send>;

#[derive(Default)]
struct Inner {
    etcds: BTreeMap<Key, Etcd>,
    statefulsets: BTreeMap<Key, StatefulSet>,
    version: u64,
    uids: u64,
    fail_list: bool,
    conflict_next_status_update: bool,
    fail_statefulset_updates: Vec<String>,
    etcd_gets: usize,
    etcd_get_hook: Option<GetHook>,
    statefulset_hook: Option<StatefulSetHook>,
    statefulset_writes: usize,
    status_writes: usize,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn next_uid(&mut self, name: &str) -> String {
        self.uids += 1;
        format!("uid-{}-{}", name, self.uids)
    }
}

#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
}

fn key_of<K: ResourceExt>(obj: &K) -> Key {
    (
        obj.namespace().unwrap_or_else(|| "default".to_string()),
        obj.name_any(),
    )
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an Etcd, assigning a uid when missing and a fresh resource version
    pub fn insert_etcd(&self, mut etcd: Etcd) -> Etcd {
        let mut inner = self.inner.lock().unwrap();
        if etcd.metadata.uid.is_none() {
            etcd.metadata.uid = Some(inner.next_uid(&etcd.name_any()));
        }
        etcd.metadata.resource_version = Some(inner.next_version());
        inner.etcds.insert(key_of(&etcd), etcd.clone());
        etcd
    }

    pub fn insert_statefulset(&self, mut sts: StatefulSet) -> StatefulSet {
        let mut inner = self.inner.lock().unwrap();
        if sts.metadata.uid.is_none() {
            sts.metadata.uid = Some(inner.next_uid(&sts.name_any()));
        }
        sts.metadata.resource_version = Some(inner.next_version());
        inner.statefulsets.insert(key_of(&sts), sts.clone());
        sts
    }

    pub fn etcd(&self, namespace: &str, name: &str) -> Option<Etcd> {
        self.inner
            .lock()
            .unwrap()
            .etcds
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn statefulset(&self, namespace: &str, name: &str) -> Option<StatefulSet> {
        self.inner
            .lock()
            .unwrap()
            .statefulsets
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn delete_etcd(&self, namespace: &str, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .etcds
            .remove(&key(namespace, name));
    }

    pub fn mark_etcd_deleted(&self, namespace: &str, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        let version = inner.next_version();
        if let Some(etcd) = inner.etcds.get_mut(&key(namespace, name)) {
            etcd.metadata.deletion_timestamp = Some(Time(Utc::now()));
            etcd.metadata.resource_version = Some(version);
        }
    }

    /// Replace an Etcd with a same-named one carrying a new uid
    pub fn recreate_etcd(&self, namespace: &str, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        let uid = inner.next_uid(name);
        let version = inner.next_version();
        if let Some(etcd) = inner.etcds.get_mut(&key(namespace, name)) {
            etcd.metadata.uid = Some(uid);
            etcd.metadata.resource_version = Some(version);
            etcd.metadata.deletion_timestamp = None;
            etcd.status = None;
        }
    }

    /// Change the labels of a stored StatefulSet, as an external actor would
    pub fn relabel_statefulset(&self, namespace: &str, name: &str, labels: &[(&str, &str)]) {
        let mut inner = self.inner.lock().unwrap();
        let version = inner.next_version();
        if let Some(sts) = inner.statefulsets.get_mut(&key(namespace, name)) {
            sts.metadata.labels = Some(label_map(labels));
            sts.metadata.resource_version = Some(version);
        }
    }

    pub fn fail_list(&self) {
        self.inner.lock().unwrap().fail_list = true;
    }

    pub fn conflict_next_status_update(&self) {
        self.inner.lock().unwrap().conflict_next_status_update = true;
    }

    pub fn fail_statefulset_update(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_statefulset_updates
            .push(name.to_string());
    }

    /// Run `hook` after every `get_etcd` with the 1-based call number
    pub fn on_get_etcd<F>(&self, hook: F)
    where
        F: FnMut(usize, &mut BTreeMap<Key, Etcd>) + Send + 'static,
    {
        self.inner.lock().unwrap().etcd_get_hook = Some(Box::new(hook));
    }

    /// Run `hook` on the stored StatefulSets after every `get_etcd`, as a
    /// concurrent writer would. Every StatefulSet it changes gets a fresh
    /// resource version.
    pub fn on_get_etcd_statefulsets<F>(&self, hook: F)
    where
        F: FnMut(usize, &mut BTreeMap<Key, StatefulSet>) + Send + 'static,
    {
        self.inner.lock().unwrap().statefulset_hook = Some(Box::new(hook));
    }

    pub fn etcd_gets(&self) -> usize {
        self.inner.lock().unwrap().etcd_gets
    }

    pub fn statefulset_writes(&self) -> usize {
        self.inner.lock().unwrap().statefulset_writes
    }

    pub fn status_writes(&self) -> usize {
        self.inner.lock().unwrap().status_writes
    }
}

#[async_trait]
impl EtcdStore for FakeStore {
    async fn get_etcd(&self, namespace: &str, name: &str) -> Result<Option<Etcd>> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.etcd_gets += 1;
        let found = inner.etcds.get(&key(namespace, name)).cloned();
        if let Some(hook) = inner.etcd_get_hook.as_mut() {
            hook(inner.etcd_gets, &mut inner.etcds);
        }
        if let Some(mut hook) = inner.statefulset_hook.take() {
            let before = inner.statefulsets.clone();
            hook(inner.etcd_gets, &mut inner.statefulsets);
            inner.statefulset_hook = Some(hook);

            let changed: Vec<Key> = inner
                .statefulsets
                .iter()
                .filter(|(k, sts)| before.get(*k) != Some(*sts))
                .map(|(k, _)| k.clone())
                .collect();
            for k in changed {
                let version = inner.next_version();
                if let Some(sts) = inner.statefulsets.get_mut(&k) {
                    sts.metadata.resource_version = Some(version);
                }
            }
        }
        Ok(found)
    }

    async fn list_etcds(&self, namespace: Option<&str>) -> Result<Vec<Etcd>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .etcds
            .iter()
            .filter(|((ns, _), _)| namespace.map_or(true, |want| ns == want))
            .map(|(_, etcd)| etcd.clone())
            .collect())
    }

    async fn list_statefulsets(&self, namespace: &str) -> Result<Vec<StatefulSet>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_list {
            return Err(Error::ConfigError("list statefulsets failed".to_string()));
        }
        Ok(inner
            .statefulsets
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, sts)| sts.clone())
            .collect())
    }

    async fn update_statefulset(&self, sts: &StatefulSet) -> Result<StatefulSet> {
        let mut inner = self.inner.lock().unwrap();
        let k = key_of(sts);
        let what = format!("statefulset {}/{}", k.0, k.1);

        if inner.fail_statefulset_updates.contains(&k.1) {
            return Err(Error::ConfigError(format!("injected failure for {}", what)));
        }
        let Some(current) = inner.statefulsets.get(&k).cloned() else {
            return Err(Error::NotFound(what));
        };
        if current.metadata.resource_version != sts.metadata.resource_version {
            return Err(Error::Conflict(what));
        }
        if &current == sts {
            return Ok(current);
        }

        let mut stored = sts.clone();
        stored.metadata.resource_version = Some(inner.next_version());
        inner.statefulset_writes += 1;
        inner.statefulsets.insert(k, stored.clone());
        Ok(stored)
    }

    async fn update_etcd_status(&self, etcd: &Etcd) -> Result<Etcd> {
        let mut inner = self.inner.lock().unwrap();
        let k = key_of(etcd);
        let what = format!("etcd {}/{}", k.0, k.1);

        let Some(current) = inner.etcds.get(&k).cloned() else {
            return Err(Error::NotFound(what));
        };
        if inner.conflict_next_status_update {
            inner.conflict_next_status_update = false;
            return Err(Error::Conflict(what));
        }
        if current.metadata.resource_version != etcd.metadata.resource_version {
            return Err(Error::Conflict(what));
        }
        if current.status == etcd.status {
            return Ok(current);
        }

        let mut stored = current;
        stored.status = etcd.status.clone();
        stored.metadata.resource_version = Some(inner.next_version());
        inner.status_writes += 1;
        inner.etcds.insert(k, stored.clone());
        Ok(stored)
    }
}

pub fn label_map(labels: &[(&str, &str)]) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Etcd in namespace `default` selecting `key=value`
pub fn etcd(name: &str, key: &str, value: &str) -> Etcd {
    let mut etcd = Etcd::new(
        name,
        EtcdSpec {
            selector: Some(LabelSelector {
                match_labels: Some(label_map(&[(key, value)])),
                ..Default::default()
            }),
        },
    );
    etcd.metadata.namespace = Some("default".to_string());
    etcd
}

/// StatefulSet in namespace `default` with observed state of a healthy
/// single replica
pub fn statefulset(name: &str, labels: &[(&str, &str)]) -> StatefulSet {
    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            labels: Some(label_map(labels)),
            generation: Some(1),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            ..Default::default()
        }),
        status: Some(StatefulSetStatus {
            observed_generation: Some(1),
            replicas: 1,
            current_replicas: Some(1),
            ready_replicas: Some(1),
            updated_replicas: Some(1),
            conditions: Some(vec![StatefulSetCondition {
                type_: "Available".to_string(),
                status: "True".to_string(),
                reason: Some("MinimumReplicasAvailable".to_string()),
                message: Some("1/1 ready".to_string()),
                last_transition_time: None,
            }]),
            ..Default::default()
        }),
    }
}

/// Mark `sts` as controlled by `owner`
pub fn owned_by(mut sts: StatefulSet, owner: &Etcd) -> StatefulSet {
    sts.metadata.owner_references = Some(vec![controller_reference(owner)]);
    sts
}
