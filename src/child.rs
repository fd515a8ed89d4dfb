//! The objects an NginxCluster owns, and which of their fields belong to us.
//!
//! Only the controlled subset of each child is ever compared or written.
//! Anything else on a live object, set by users or by other controllers,
//! is carried through updates untouched.
use crate::store::Object;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, ContainerPort, Service, ServicePort};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use std::fmt;

/// The kinds of child objects, in the order they are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChildKind {
    Workload,
    Endpoint,
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildKind::Workload => write!(f, "Deployment"),
            ChildKind::Endpoint => write!(f, "Service"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChildSpec {
    Workload(Deployment),
    Endpoint(Service),
}

impl ChildSpec {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildSpec::Workload(_) => ChildKind::Workload,
            ChildSpec::Endpoint(_) => ChildKind::Endpoint,
        }
    }
}

pub trait ManagedChild: Object {
    const KIND: ChildKind;

    /// Whether every controlled field of `self` already agrees with `desired`.
    fn matches(&self, desired: &Self) -> bool;

    /// Copies the controlled fields of `desired` onto `self`.
    ///
    /// Callers check [`ManagedChild::foreign_controller`] first: an object
    /// may carry only one controller reference.
    fn apply_controlled(&mut self, desired: &Self);

    /// The controller reference on `self` that `desired` does not carry, if
    /// any. Such an object is managed by someone else and must not be adopted.
    fn foreign_controller(&self, desired: &Self) -> Option<&OwnerReference> {
        let ours = desired.meta().owner_references.as_deref().unwrap_or_default();
        self.meta()
            .owner_references
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|owner| {
                owner.controller == Some(true) && !ours.iter().any(|want| want.uid == owner.uid)
            })
    }
}

impl ManagedChild for Deployment {
    const KIND: ChildKind = ChildKind::Workload;

    fn matches(&self, desired: &Deployment) -> bool {
        if !metadata_matches(&self.metadata, &desired.metadata) {
            return false;
        }
        let (live, desired) = match (&self.spec, &desired.spec) {
            (_, None) => return true,
            (None, Some(_)) => return false,
            (Some(live), Some(desired)) => (live, desired),
        };
        if desired.replicas.is_some() && live.replicas != desired.replicas {
            return false;
        }
        if !labels_contain(&live.selector.match_labels, &desired.selector.match_labels) {
            return false;
        }
        let template_labels = |spec: &k8s_openapi::api::apps::v1::DeploymentSpec| {
            spec.template
                .metadata
                .as_ref()
                .and_then(|meta| meta.labels.clone())
        };
        if !labels_contain(&template_labels(live), &template_labels(desired)) {
            return false;
        }
        let live_containers = live
            .template
            .spec
            .as_ref()
            .map(|pod| pod.containers.as_slice())
            .unwrap_or_default();
        let desired_containers = desired
            .template
            .spec
            .as_ref()
            .map(|pod| pod.containers.as_slice())
            .unwrap_or_default();
        desired_containers.iter().all(|want| {
            live_containers
                .iter()
                .find(|have| have.name == want.name)
                .map_or(false, |have| container_matches(have, want))
        })
    }

    fn apply_controlled(&mut self, desired: &Deployment) {
        apply_metadata(&mut self.metadata, &desired.metadata);
        let desired = match &desired.spec {
            Some(spec) => spec,
            None => return,
        };
        let live = self.spec.get_or_insert_with(Default::default);
        if desired.replicas.is_some() {
            live.replicas = desired.replicas;
        }
        merge_labels(
            &mut live.selector.match_labels,
            &desired.selector.match_labels,
        );
        if let Some(desired_meta) = &desired.template.metadata {
            let live_meta = live.template.metadata.get_or_insert_with(Default::default);
            merge_labels(&mut live_meta.labels, &desired_meta.labels);
        }
        if let Some(desired_pod) = &desired.template.spec {
            let live_pod = live.template.spec.get_or_insert_with(Default::default);
            for want in &desired_pod.containers {
                match live_pod.containers.iter_mut().find(|have| have.name == want.name) {
                    Some(have) => apply_container(have, want),
                    None => live_pod.containers.push(want.clone()),
                }
            }
        }
    }
}

impl ManagedChild for Service {
    const KIND: ChildKind = ChildKind::Endpoint;

    fn matches(&self, desired: &Service) -> bool {
        if !metadata_matches(&self.metadata, &desired.metadata) {
            return false;
        }
        let (live, desired) = match (&self.spec, &desired.spec) {
            (_, None) => return true,
            (None, Some(_)) => return false,
            (Some(live), Some(desired)) => (live, desired),
        };
        if !labels_contain(&live.selector, &desired.selector) {
            return false;
        }
        let live_ports = live.ports.as_deref().unwrap_or_default();
        desired
            .ports
            .as_deref()
            .unwrap_or_default()
            .iter()
            .all(|want| live_ports.iter().any(|have| service_port_matches(have, want)))
    }

    fn apply_controlled(&mut self, desired: &Service) {
        apply_metadata(&mut self.metadata, &desired.metadata);
        let desired = match &desired.spec {
            Some(spec) => spec,
            None => return,
        };
        let live = self.spec.get_or_insert_with(Default::default);
        merge_labels(&mut live.selector, &desired.selector);
        if let Some(desired_ports) = &desired.ports {
            let live_ports = live.ports.get_or_insert_with(Vec::new);
            for want in desired_ports {
                if let Some(have) = live_ports.iter_mut().find(|have| have.port == want.port) {
                    have.protocol = want.protocol.clone();
                } else {
                    live_ports.push(want.clone());
                }
            }
        }
    }
}

fn metadata_matches(live: &ObjectMeta, desired: &ObjectMeta) -> bool {
    labels_contain(&live.labels, &desired.labels)
        && owned_by_all(&live.owner_references, &desired.owner_references)
}

fn apply_metadata(live: &mut ObjectMeta, desired: &ObjectMeta) {
    merge_labels(&mut live.labels, &desired.labels);
    if let Some(wanted) = &desired.owner_references {
        let refs = live.owner_references.get_or_insert_with(Vec::new);
        for owner in wanted {
            if !refs.iter().any(|have| have.uid == owner.uid) {
                refs.push(owner.clone());
            }
        }
    }
}

fn owned_by_all(live: &Option<Vec<OwnerReference>>, desired: &Option<Vec<OwnerReference>>) -> bool {
    let live = live.as_deref().unwrap_or_default();
    desired
        .as_deref()
        .unwrap_or_default()
        .iter()
        .all(|owner| live.iter().any(|have| have.uid == owner.uid))
}

/// Every desired label is present with the same value; extra live labels are fine.
fn labels_contain(
    live: &Option<BTreeMap<String, String>>,
    desired: &Option<BTreeMap<String, String>>,
) -> bool {
    match desired {
        None => true,
        Some(desired) => desired.iter().all(|(key, value)| {
            live.as_ref()
                .and_then(|live| live.get(key))
                .map_or(false, |have| have == value)
        }),
    }
}

fn merge_labels(
    live: &mut Option<BTreeMap<String, String>>,
    desired: &Option<BTreeMap<String, String>>,
) {
    if let Some(desired) = desired {
        let live = live.get_or_insert_with(BTreeMap::new);
        for (key, value) in desired {
            live.insert(key.clone(), value.clone());
        }
    }
}

fn container_matches(have: &Container, want: &Container) -> bool {
    if want.image.is_some() && have.image != want.image {
        return false;
    }
    let have_ports = have.ports.as_deref().unwrap_or_default();
    want.ports
        .as_deref()
        .unwrap_or_default()
        .iter()
        .all(|port| have_ports.iter().any(|p| container_port_matches(p, port)))
}

fn apply_container(have: &mut Container, want: &Container) {
    if want.image.is_some() {
        have.image = want.image.clone();
    }
    if let Some(want_ports) = &want.ports {
        let have_ports = have.ports.get_or_insert_with(Vec::new);
        for port in want_ports {
            if !have_ports.iter().any(|p| container_port_matches(p, port)) {
                have_ports.push(port.clone());
            }
        }
    }
}

fn container_port_matches(have: &ContainerPort, want: &ContainerPort) -> bool {
    have.container_port == want.container_port
}

// An unset protocol is TCP on the API server.
fn service_port_matches(have: &ServicePort, want: &ServicePort) -> bool {
    let protocol = |port: &ServicePort| port.protocol.clone().unwrap_or_else(|| "TCP".to_string());
    have.port == want.port && protocol(have) == protocol(want)
}
