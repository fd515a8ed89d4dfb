//! One reconcile cycle for one NginxCluster: build the desired children,
//! bring each live child in line with them, then report the Deployment's
//! availability back onto the cluster's status.
//!
//! Every step can be re-run from scratch at any time. The resource version
//! check in the store is the only thing that keeps two racing cycles for the
//! same cluster from overwriting each other, so a write rejected as stale is
//! always redone from a fresh read and never merged.
use crate::child::{ChildSpec, ManagedChild};
use crate::common::deployment_name;
use crate::error::Error;
use crate::nginxcluster_types::{NginxCluster, NginxClusterStatus};
use crate::resources::build_children;
use crate::store::{ObjectKey, Store, StoreError};
use k8s_openapi::api::apps::v1::Deployment;
use std::time::Duration;
use tracing::*;

pub struct Reconciler<S> {
    store: S,
}

impl<S: Store> Reconciler<S> {
    pub fn new(store: S) -> Reconciler<S> {
        Reconciler { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs a full cycle for the NginxCluster at `key`.
    ///
    /// Stops at the first child that fails and returns its error; children
    /// already reconciled in this cycle stay as they are and the next cycle
    /// picks up from there. Success never asks for a specific requeue delay,
    /// so the returned duration is always `None`.
    #[instrument(skip(self, key), fields(cluster = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Option<Duration>, Error> {
        let cluster = match self.store.get::<NginxCluster>(key).await {
            Err(StoreError::NotFound) => {
                info!("{} not found, end reconcile", key);
                return Ok(None);
            }
            Err(e) => return Err(Error::GetClusterFailed(e)),
            Ok(cluster) => cluster,
        };
        info!(replicas = ?cluster.spec.replicas, "Reconciling NginxCluster");

        let children = build_children(&cluster)?;
        for child in children.values() {
            match child {
                ChildSpec::Workload(deployment) => self.reconcile_child(deployment).await?,
                ChildSpec::Endpoint(service) => self.reconcile_child(service).await?,
            }
        }

        self.project_status(&cluster).await?;
        Ok(None)
    }

    /// Same as [`Reconciler::reconcile`], but gives up with [`Error::Timeout`]
    /// once `timeout` has passed. The cycle is dropped at whichever store call
    /// it was waiting on, so that call never completes.
    pub async fn reconcile_within(
        &self,
        key: &ObjectKey,
        timeout: Duration,
    ) -> Result<Option<Duration>, Error> {
        tokio::time::timeout(timeout, self.reconcile(key))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Brings the live child named by `desired` in line with it: creates it
    /// when missing, replaces it when a controlled field differs, and leaves
    /// it alone otherwise. A child that another controller already controls
    /// is never adopted.
    pub async fn reconcile_child<K: ManagedChild>(&self, desired: &K) -> Result<(), Error> {
        let failed = |e: StoreError| Error::reconcile_child_failed(K::KIND, e);
        let key = ObjectKey::of(desired).map_err(Error::MissingObjectKey)?;
        loop {
            let mut live = match self.store.get::<K>(&key).await {
                Err(StoreError::NotFound) => {
                    info!("Create {}: {}", K::KIND, key);
                    return match self.store.create(desired).await {
                        // Someone else created it between our read and write.
                        Ok(_) | Err(StoreError::AlreadyExists) => Ok(()),
                        Err(e) => Err(failed(e)),
                    };
                }
                Err(e) => return Err(failed(e)),
                Ok(live) => live,
            };

            if let Some(owner) = live.foreign_controller(desired) {
                warn!("{} {} is controlled by {} {}", K::KIND, key, owner.kind, owner.name);
                return Err(Error::ControlledByOther {
                    kind: K::KIND,
                    owner: format!("{}/{}", owner.kind, owner.name),
                    key,
                });
            }

            if live.matches(desired) {
                debug!("{} {} is up to date", K::KIND, key);
                return Ok(());
            }

            live.apply_controlled(desired);
            info!(
                resource_version = ?live.meta().resource_version,
                "Update {}: {}", K::KIND, key
            );
            match self.store.replace(&live).await {
                Ok(_) => return Ok(()),
                Err(StoreError::Conflict) => {
                    info!("{} {} changed since it was read, retrying", K::KIND, key);
                }
                // Deleted since it was read; the next pass creates it again.
                Err(StoreError::NotFound) => {
                    info!("{} {} disappeared before the update, retrying", K::KIND, key);
                }
                Err(e) => return Err(failed(e)),
            }
        }
    }

    /// Copies the Deployment's available replica count onto the cluster's
    /// status. Writes only when the count changed, and does nothing while the
    /// Deployment does not exist yet.
    pub async fn project_status(&self, cluster: &NginxCluster) -> Result<(), Error> {
        let cluster_key = ObjectKey::of(cluster).map_err(Error::MissingObjectKey)?;
        let deployment_key = ObjectKey::new(
            cluster_key.namespace.clone(),
            deployment_name(&cluster_key.name),
        );
        let deployment = match self.store.get::<Deployment>(&deployment_key).await {
            Err(StoreError::NotFound) => {
                debug!("{} not found, leave status unchanged", deployment_key);
                return Ok(());
            }
            Err(e) => return Err(Error::ProjectStatusFailed(e)),
            Ok(deployment) => deployment,
        };
        let observed = deployment
            .status
            .as_ref()
            .and_then(|status| status.available_replicas)
            .unwrap_or(0);

        let mut cluster = cluster.clone();
        loop {
            if cluster.available_replicas() == observed {
                return Ok(());
            }
            info!(
                from = cluster.available_replicas(),
                to = observed,
                "Update status of {}", cluster_key
            );
            cluster.status = Some(NginxClusterStatus {
                available_replicas: observed,
            });
            match self.store.replace_status(&cluster).await {
                Ok(_) => return Ok(()),
                Err(StoreError::Conflict) => {
                    info!("{} changed since it was read, retrying", cluster_key);
                }
                Err(StoreError::NotFound) => {
                    info!("{} was deleted, leave status alone", cluster_key);
                    return Ok(());
                }
                Err(e) => return Err(Error::ProjectStatusFailed(e)),
            }
            cluster = match self.store.get::<NginxCluster>(&cluster_key).await {
                Err(StoreError::NotFound) => return Ok(()),
                Err(e) => return Err(Error::ProjectStatusFailed(e)),
                Ok(cluster) => cluster,
            };
        }
    }
}
