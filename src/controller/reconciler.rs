//! Main reconciler for Etcd resources
//!
//! Implements the controller pattern using kube-rs runtime. Each pass runs
//! `Start -> OwnerFetched -> ChildrenResolved -> StatusCommitted -> Done`
//! and ends in one of: done, requeue after a fixed delay, or an error that
//! the error policy requeues right away.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{
        controller::{self, Action, Controller},
        reflector::ObjectRef,
        watcher,
    },
    Resource, ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use crate::crd::Etcd;
use crate::error::{Error, Result};
use crate::CustodianConfig;

use super::health::HealthCheck;
#[cfg(feature = "metrics")]
use super::metrics;
use super::ref_manager::{controller_of, StatefulSetRefManager};
use super::revalidator::DeletionRevalidator;
use super::selector::LabelMatcher;
use super::status::StatusAggregator;
use super::store::EtcdStore;

/// Shared state for the controller
pub struct ControllerState {
    pub store: Arc<dyn EtcdStore>,
    pub health: Arc<dyn HealthCheck>,
    pub config: CustodianConfig,
}

/// How a reconciliation pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing left to do until the Etcd or its StatefulSet changes
    Done,
    /// Try again after a fixed delay
    RequeueAfter(Duration),
}

impl Disposition {
    pub fn into_action(self) -> Action {
        match self {
            Disposition::Done => Action::await_change(),
            Disposition::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    OwnerFetched,
    ChildrenResolved,
    StatusCommitted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Start => "Start",
            Phase::OwnerFetched => "OwnerFetched",
            Phase::ChildrenResolved => "ChildrenResolved",
            Phase::StatusCommitted => "StatusCommitted",
        };
        f.write_str(s)
    }
}

/// Main entry point to start the controller
pub async fn run_controller(client: Client, state: Arc<ControllerState>) -> Result<()> {
    let (etcds, statefulsets): (Api<Etcd>, Api<StatefulSet>) = match &state.config.namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    info!(
        "Starting Etcd custodian with {} workers",
        state.config.workers
    );

    // Verify CRD exists
    match etcds.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("Etcd CRD is available"),
        Err(e) => {
            error!("Etcd CRD not found. Please install the CRD first: {:?}", e);
            return Err(Error::ConfigError("Etcd CRD not installed".to_string()));
        }
    }

    let controller = Controller::new(etcds, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(state.config.workers));
    let owners = controller.store();

    controller
        .watches(statefulsets, watcher::Config::default(), move |sts| {
            owners_for_statefulset(&sts, &owners.state())
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => warn!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// Etcds that should look at a changed StatefulSet: its controller if it has
/// one, otherwise every Etcd in its namespace whose selector matches it.
pub fn owners_for_statefulset(sts: &StatefulSet, etcds: &[Arc<Etcd>]) -> Vec<ObjectRef<Etcd>> {
    let namespace = sts.namespace().unwrap_or_else(|| "default".to_string());

    if let Some(owner) = controller_of(sts) {
        if owner.kind == Etcd::kind(&()) && owner.api_version == Etcd::api_version(&()) {
            return vec![ObjectRef::new(&owner.name).within(&namespace)];
        }
        return Vec::new();
    }

    etcds
        .iter()
        .filter(|etcd| etcd.namespace().as_deref() == Some(namespace.as_str()))
        .filter(|etcd| {
            LabelMatcher::from_selector(etcd.spec.selector.as_ref())
                .map(|m| m.matches(sts.labels()))
                .unwrap_or(false)
        })
        .map(|etcd| ObjectRef::from_obj(etcd.as_ref()))
        .collect()
}

/// The main reconciliation function
///
/// This function is called whenever:
/// - An Etcd is created, updated, or deleted
/// - A StatefulSet it owns or could adopt changes
/// - The requeue timer expires
#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Etcd>, ctx: Arc<ControllerState>) -> Result<Action> {
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let result = reconcile_etcd(&ctx, &namespace, &obj.name_any()).await;

    #[cfg(feature = "metrics")]
    metrics::observe_reconcile_duration_seconds("etcd", started.elapsed().as_secs_f64());

    result.map(Disposition::into_action)
}

/// Run one reconciliation pass for the Etcd `namespace/name`.
///
/// The Etcd is read fresh from the store. An `Err` means the pass should be
/// retried immediately.
pub async fn reconcile_etcd(
    ctx: &ControllerState,
    namespace: &str,
    name: &str,
) -> Result<Disposition> {
    let store = ctx.store.as_ref();
    let mut phase = Phase::Start;
    debug!("Reconciling etcd {}/{}: {}", namespace, name, phase);

    let etcd = match store.get_etcd(namespace, name).await {
        Ok(Some(etcd)) => etcd,
        Ok(None) => {
            // Owned StatefulSets are garbage collected through their owner references
            info!("Etcd {}/{} not found, nothing to do", namespace, name);
            return Ok(Disposition::Done);
        }
        Err(e) if e.is_not_found() => {
            info!("Etcd {}/{} not found, nothing to do", namespace, name);
            return Ok(Disposition::Done);
        }
        Err(e) => return Err(e),
    };
    phase = Phase::OwnerFetched;
    debug!("Reconciling etcd {}/{}: {}", namespace, name, phase);

    let matcher = LabelMatcher::from_selector(etcd.spec.selector.as_ref()).map_err(|e| {
        error!("Error converting etcd {}/{} selector: {}", namespace, name, e);
        e
    })?;
    if matcher.selects_nothing() {
        warn!("Etcd {}/{} has no selector and can own nothing", namespace, name);
    }

    let revalidator = DeletionRevalidator::for_etcd(store, &etcd);
    let manager = StatefulSetRefManager::new(store, &etcd, matcher, revalidator);
    let claimed = manager.claim_statefulsets().await?;
    phase = Phase::ChildrenResolved;
    debug!(
        "Reconciling etcd {}/{}: {} ({} statefulsets)",
        namespace,
        name,
        phase,
        claimed.len()
    );

    let Some(primary) = claimed.first() else {
        info!(
            "No statefulset owned by etcd {}/{} yet, requeuing in {:?}",
            namespace, name, ctx.config.requeue_delay
        );
        return Ok(Disposition::RequeueAfter(ctx.config.requeue_delay));
    };
    if claimed.len() > 1 {
        warn!(
            "Etcd {}/{} owns {} statefulsets, reporting status of {}",
            namespace,
            name,
            claimed.len(),
            primary.name_any()
        );
    }

    StatusAggregator::new(store, ctx.health.as_ref())
        .update_status(&etcd, primary)
        .await?;
    phase = Phase::StatusCommitted;
    debug!("Reconciling etcd {}/{}: {}", namespace, name, phase);

    Ok(Disposition::Done)
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(etcd: Arc<Etcd>, error: &Error, ctx: Arc<ControllerState>) -> Action {
    if error.is_retriable() {
        warn!("Reconciliation error for {}, retrying: {:?}", etcd.name_any(), error);
    } else {
        // Retried too, but only a change to the Etcd can fix it
        error!("Reconciliation error for {}: {:?}", etcd.name_any(), error);
    }

    #[cfg(feature = "metrics")]
    metrics::inc_reconcile_error("etcd", error.kind());

    Action::requeue(ctx.config.error_requeue_delay)
}
