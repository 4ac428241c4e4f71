//! Error types for the Etcd custodian
//!
//! Errors are classified so the reconcile loop can tell benign outcomes
//! (an object disappeared) from ones that need a retry.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflicting write to {0}: resource version is stale")]
    Conflict(String),

    #[error("invalid label selector: {0}")]
    SelectorInvalid(String),

    #[error("{namespace}/{name} etcd is gone")]
    OwnerVanished { namespace: String, name: String },

    #[error("{namespace}/{name} etcd is marked for deletion")]
    OwnerBeingDeleted { namespace: String, name: String },

    #[error("original {namespace}/{name} etcd gone: got uid {found}, wanted {expected}")]
    OwnerIdentityChanged {
        namespace: String,
        name: String,
        expected: String,
        found: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// The object addressed by the call does not exist (anymore)
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::KubeError(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }

    /// The write carried a stale resource version
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::KubeError(kube::Error::Api(e)) => e.code == 409,
            _ => false,
        }
    }

    /// Revalidation refused an ownership mutation. These abort a single
    /// adoption or release, never the whole reconciliation.
    pub fn is_adoption_abort(&self) -> bool {
        matches!(
            self,
            Error::OwnerVanished { .. }
                | Error::OwnerBeingDeleted { .. }
                | Error::OwnerIdentityChanged { .. }
        )
    }

    /// Whether retrying the same request may succeed
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(e)) => {
                e.code >= 500 || e.code == 429 || e.code == 409
            }
            Error::KubeError(_) => true,
            Error::Conflict(_) | Error::NotFound(_) => true,
            Error::SelectorInvalid(_) | Error::ConfigError(_) | Error::SerializationError(_) => {
                false
            }
            Error::OwnerVanished { .. }
            | Error::OwnerBeingDeleted { .. }
            | Error::OwnerIdentityChanged { .. } => false,
        }
    }

    /// Short category used as a metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::SelectorInvalid(_) => "selector",
            Error::OwnerVanished { .. }
            | Error::OwnerBeingDeleted { .. }
            | Error::OwnerIdentityChanged { .. } => "adoption",
            Error::ConfigError(_) => "config",
            Error::SerializationError(_) => "serialization",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
