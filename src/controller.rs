//! Hooks the reconciler up to kube-rs.
//!
//! The kube-rs controller decides when to reconcile: on any change to an
//! NginxCluster or to a Deployment or Service it owns, and on every resync.
//! It also owns queueing and backoff. This module only translates between
//! its callbacks and [`Reconciler`].
use crate::common::CONTROLLER_NAME;
use crate::config::ControllerConfig;
use crate::error::Error;
use crate::nginxcluster_types::NginxCluster;
use crate::reconciler::Reconciler;
use crate::store::{KubeStore, ObjectKey};
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, ListParams},
    runtime::{
        controller::{self, Action, Controller},
        reflector::ObjectRef,
    },
    Client, Resource,
};
use std::sync::Arc;
use tracing::*;

// Data we want access to in error/reconcile calls
struct Data {
    reconciler: Reconciler<KubeStore>,
    config: ControllerConfig,
}

pub async fn run(client: Client, config: ControllerConfig) -> Result<()> {
    let (clusters, deployments, services) = match &config.namespace {
        Some(namespace) => (
            Api::<NginxCluster>::namespaced(client.clone(), namespace),
            Api::<Deployment>::namespaced(client.clone(), namespace),
            Api::<Service>::namespaced(client.clone(), namespace),
        ),
        None => (
            Api::<NginxCluster>::all(client.clone()),
            Api::<Deployment>::all(client.clone()),
            Api::<Service>::all(client.clone()),
        ),
    };
    info!(namespace = ?config.namespace, "running {}", CONTROLLER_NAME);

    let data = Arc::new(Data {
        reconciler: Reconciler::new(KubeStore::new(client)),
        config,
    });
    Controller::new(clusters, ListParams::default())
        .owns(deployments, ListParams::default())
        .owns(services, ListParams::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, data)
        .for_each(|res| async move { report_controller_reconciled(CONTROLLER_NAME, &res) })
        .await;
    info!("controller terminated");
    Ok(())
}

/// Controller triggers this whenever our main object or our children changed
async fn reconcile(cluster: Arc<NginxCluster>, ctx: Arc<Data>) -> Result<Action, Error> {
    let key = ObjectKey::of(cluster.as_ref()).map_err(Error::MissingObjectKey)?;
    let requeue_after = ctx
        .reconciler
        .reconcile_within(&key, ctx.config.reconcile_timeout)
        .await?;
    Ok(Action::requeue(
        requeue_after.unwrap_or(ctx.config.resync_interval),
    ))
}

/// The controller triggers this on reconcile errors
fn error_policy(_cluster: Arc<NginxCluster>, error: &Error, ctx: Arc<Data>) -> Action {
    if error.is_retryable() {
        warn!("Reconcile failed due to error: {}", error);
        Action::requeue(ctx.config.error_backoff)
    } else {
        error!(
            "Reconcile failed due to error: {}, waiting for the NginxCluster to change",
            error
        );
        Action::await_change()
    }
}

pub fn report_controller_reconciled<K, QueueErr>(
    controller_name: &str,
    result: &Result<(ObjectRef<K>, Action), controller::Error<Error, QueueErr>>,
) where
    K: Resource,
    QueueErr: std::error::Error + 'static,
{
    match result {
        Ok((obj, _)) => {
            tracing::info!(
                controller.name = controller_name,
                object = %obj,
                "Reconciled object"
            );
        }
        Err(err) => {
            tracing::error!(
                controller.name = controller_name,
                error = err as &dyn std::error::Error,
                "Failed to reconcile object",
            );
        }
    }
}
