use crate::child::{ChildKind, ChildSpec};
use crate::common::*;
use crate::error::Error;
use crate::nginxcluster_types::NginxCluster;
use crate::store::ObjectKey;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::api::{ObjectMeta, Resource};
use std::collections::BTreeMap;

/// The desired children of one NginxCluster, iterated in reconcile order.
pub type DesiredChildren = BTreeMap<ChildKind, ChildSpec>;

/// Computes every child an NginxCluster should have. Never touches the store,
/// so it is rebuilt from the current spec on each reconcile.
pub fn build_children(cluster: &NginxCluster) -> Result<DesiredChildren, Error> {
    let key = ObjectKey::of(cluster).map_err(Error::MissingObjectKey)?;
    // Needs both name and uid; the name was checked above.
    let owner = cluster
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey(".metadata.uid"))?;
    if let Some(replicas) = cluster.spec.replicas {
        if replicas < 0 {
            return Err(Error::InvalidSpec(format!(
                "replicas must not be negative, got {}",
                replicas
            )));
        }
    }

    Ok(BTreeMap::from([
        (
            ChildKind::Workload,
            ChildSpec::Workload(make_deployment(&key, cluster.spec.replicas, &owner)),
        ),
        (
            ChildKind::Endpoint,
            ChildSpec::Endpoint(make_service(&key, &owner)),
        ),
    ]))
}

pub fn make_deployment(
    key: &ObjectKey,
    replicas: Option<i32>,
    owner: &metav1::OwnerReference,
) -> appsv1::Deployment {
    let labels = selector_labels(&key.name);
    appsv1::Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(&key.name)),
            namespace: Some(key.namespace.clone()),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner.clone()]),
            ..ObjectMeta::default()
        },
        spec: Some(appsv1::DeploymentSpec {
            replicas,
            selector: metav1::LabelSelector {
                match_labels: Some(labels.clone()),
                ..metav1::LabelSelector::default()
            },
            template: corev1::PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(corev1::PodSpec {
                    containers: vec![corev1::Container {
                        name: NGINX_CONTAINER_NAME.to_string(),
                        image: Some(NGINX_IMAGE.to_string()),
                        ports: Some(vec![corev1::ContainerPort {
                            container_port: NGINX_PORT,
                            ..corev1::ContainerPort::default()
                        }]),
                        ..corev1::Container::default()
                    }],
                    ..corev1::PodSpec::default()
                }),
            },
            ..appsv1::DeploymentSpec::default()
        }),
        ..appsv1::Deployment::default()
    }
}

pub fn make_service(key: &ObjectKey, owner: &metav1::OwnerReference) -> corev1::Service {
    let labels = selector_labels(&key.name);
    corev1::Service {
        metadata: ObjectMeta {
            name: Some(service_name(&key.name)),
            namespace: Some(key.namespace.clone()),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner.clone()]),
            ..ObjectMeta::default()
        },
        spec: Some(corev1::ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![corev1::ServicePort {
                port: NGINX_PORT,
                protocol: Some("TCP".to_string()),
                ..corev1::ServicePort::default()
            }]),
            ..corev1::ServiceSpec::default()
        }),
        ..corev1::Service::default()
    }
}
