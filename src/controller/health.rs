//! Health evaluation of the owned StatefulSet

use k8s_openapi::api::apps::v1::StatefulSet;

/// Decides whether a StatefulSet is healthy from its own observed state
pub trait HealthCheck: Send + Sync {
    /// `Ok(())` when healthy, otherwise a description of the failing check
    fn check(&self, sts: &StatefulSet) -> Result<(), String>;

    fn is_healthy(&self, sts: &StatefulSet) -> bool {
        self.check(sts).is_ok()
    }
}

/// Default StatefulSet health check.
///
/// A StatefulSet is healthy once the controller has observed its latest
/// generation and at least `spec.replicas` (default 1) pods are ready.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatefulSetHealth;

impl HealthCheck for StatefulSetHealth {
    fn check(&self, sts: &StatefulSet) -> Result<(), String> {
        let generation = sts.metadata.generation.unwrap_or(0);
        let status = sts.status.as_ref();

        let observed = status.and_then(|s| s.observed_generation).unwrap_or(0);
        if observed < generation {
            return Err(format!(
                "observed generation outdated ({}/{})",
                observed, generation
            ));
        }

        let replicas = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
        if ready < replicas {
            return Err(format!("not enough ready replicas ({}/{})", ready, replicas));
        }

        Ok(())
    }
}
