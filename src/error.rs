use crate::child::ChildKind;
use crate::store::{ObjectKey, StoreError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to get NginxCluster: {0}")]
    GetClusterFailed(#[source] StoreError),
    #[error("Failed to reconcile Deployment: {0}")]
    ReconcileDeploymentFailed(#[source] StoreError),
    #[error("Failed to reconcile Service: {0}")]
    ReconcileServiceFailed(#[source] StoreError),
    #[error("Failed to update NginxCluster status: {0}")]
    ProjectStatusFailed(#[source] StoreError),
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
    #[error("{kind} {key} is controlled by {owner}")]
    ControlledByOther {
        kind: ChildKind,
        key: ObjectKey,
        owner: String,
    },
    #[error("Invalid NginxCluster spec: {0}")]
    InvalidSpec(String),
    #[error("Reconcile did not finish within {0:?}")]
    Timeout(Duration),
}

impl Error {
    pub fn reconcile_child_failed(kind: ChildKind, error: StoreError) -> Error {
        match kind {
            ChildKind::Workload => Error::ReconcileDeploymentFailed(error),
            ChildKind::Endpoint => Error::ReconcileServiceFailed(error),
        }
    }

    /// The store error underneath, if the failure came from a store call.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Error::GetClusterFailed(e)
            | Error::ReconcileDeploymentFailed(e)
            | Error::ReconcileServiceFailed(e)
            | Error::ProjectStatusFailed(e) => Some(e),
            Error::MissingObjectKey(_)
            | Error::ControlledByOther { .. }
            | Error::InvalidSpec(_)
            | Error::Timeout(_) => None,
        }
    }

    /// Retry hint for whoever schedules the next attempt. Non-retryable
    /// errors need someone to change the NginxCluster (or the cluster's
    /// permissions) before another attempt can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::MissingObjectKey(_) | Error::ControlledByOther { .. } | Error::InvalidSpec(_) => {
                false
            }
            _ => self.store_error().map_or(false, StoreError::is_retryable),
        }
    }
}
