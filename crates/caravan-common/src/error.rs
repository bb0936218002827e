//! Error types for the Caravan migration engine
//!
//! Errors are structured with fields to aid debugging in production. Each
//! variant carries the reference that failed to resolve or the remote call
//! context. Reference-resolution failures are surfaced to the caller and
//! never retried by the engine itself.

use thiserror::Error;

/// Main error type for Caravan operations
#[derive(Debug, Error)]
pub enum Error {
    /// A cluster descriptor referenced by a plan or token does not exist
    #[error("cluster {namespace}/{name} not found")]
    ClusterNotFound {
        /// Name of the referenced CaravanCluster
        name: String,
        /// Namespace of the referenced CaravanCluster
        namespace: String,
    },

    /// The identity secret is missing, or its `token` entry is absent/empty
    #[error("identity secret {namespace}/{name} missing or has no token")]
    TokenMissing {
        /// Name of the referenced secret
        name: String,
        /// Namespace of the referenced secret
        namespace: String,
    },

    /// A storage or snapshot location required by the plan is not set
    #[error("{kind} for plan {plan} not found")]
    LocationMissing {
        /// Location kind (BackupStorageLocation or VolumeSnapshotLocation)
        kind: &'static str,
        /// Name of the plan that references the location
        plan: String,
    },

    /// A restore was requested before its backup exists
    #[error("backup for {role} restore not found")]
    BackupNotFound {
        /// Role of the missing backup (initial or stage)
        role: &'static str,
    },

    /// Kubernetes API error from a local or remote cluster
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Remote client construction failed
    #[error("remote client for cluster {cluster}: {message}")]
    RemoteConfig {
        /// Name of the cluster the client was built for
        cluster: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization of a remote object failed
    #[error("serialization error for {kind}: {message}")]
    Serialization {
        /// The resource kind being converted
        kind: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a serialization error for the given resource kind
    pub fn serialization(kind: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            kind: kind.into(),
            message: err.to_string(),
        }
    }

    /// Create a remote-config error for the given cluster
    pub fn remote_config(cluster: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::RemoteConfig {
            cluster: cluster.into(),
            message: err.to_string(),
        }
    }

    /// True when the underlying API error is a 404
    ///
    /// NotFound is load-bearing in several places: a missing replicated
    /// backup is a progress signal, and deletes of already-gone migrated
    /// resources are tolerated.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 404
        )
    }

    /// True when the remote API rejected the operation with 405
    ///
    /// Collection deletes are optional server-side; callers fall back to
    /// per-item deletes on MethodNotSupported.
    pub fn is_method_not_supported(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 405
        )
    }
}
