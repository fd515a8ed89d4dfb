//! A controller that keeps one Deployment and one Service per `NginxCluster`
//! in line with the cluster's spec, and reports the Deployment's available
//! replicas back onto the cluster's status.
//!
//! [`Reconciler`] is the reconcile loop itself and reaches the API server only
//! through a [`store::Store`], so it runs unchanged against a real cluster
//! ([`store::KubeStore`]) or in memory ([`store::InMemoryStore`]).
//! [`controller::run`] plugs it into a kube-rs controller.

pub mod child;
pub mod common;
pub mod config;
pub mod controller;
pub mod error;
pub mod nginxcluster_types;
pub mod reconciler;
pub mod resources;
pub mod store;

pub use error::Error;
pub use nginxcluster_types::{NginxCluster, NginxClusterSpec, NginxClusterStatus};
pub use reconciler::Reconciler;
