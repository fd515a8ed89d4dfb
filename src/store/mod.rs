//! The resource client the reconciler talks to.
//!
//! [`Store`] is the only way the reconciler reaches the API server. Every call
//! is namespace-scoped and identity-addressed, and writes go through the
//! server's optimistic concurrency check on `metadata.resourceVersion`.
//! [`KubeStore`] forwards to a real cluster through kube-rs, and
//! [`InMemoryStore`] reproduces the same semantics in process for tests.

pub mod kube_store;
pub mod memory;

pub use kube_store::KubeStore;
pub use memory::{Call, InMemoryStore, Verb};

use async_trait::async_trait;
use kube::core::NamespaceResourceScope;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use thiserror::Error;

/// Any namespaced object the store can hold.
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> ObjectKey {
        ObjectKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Reads the identity off an object's metadata.
    /// The error names the missing metadata field.
    pub fn of<K: Resource>(obj: &K) -> Result<ObjectKey, &'static str> {
        let meta = obj.meta();
        let name = meta.name.as_ref().ok_or(".metadata.name")?;
        let namespace = meta.namespace.as_ref().ok_or(".metadata.namespace")?;
        Ok(ObjectKey::new(namespace.clone(), name.clone()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error("object already exists")]
    AlreadyExists,
    #[error("stale resource version")]
    Conflict,
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("request rejected: {0}")]
    Permanent(String),
}

impl StoreError {
    /// Whether retrying the same request later can succeed without anyone
    /// changing the object first.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transient(_) | StoreError::Conflict => true,
            StoreError::NotFound | StoreError::AlreadyExists | StoreError::Permanent(_) => false,
        }
    }

    pub(crate) fn missing_key(field: &'static str) -> StoreError {
        StoreError::Permanent(format!("object is missing {}", field))
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get<K: Object>(&self, key: &ObjectKey) -> Result<K, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] if an object with the same
    /// kind and identity is already stored.
    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replaces everything but the status. Fails with [`StoreError::Conflict`]
    /// when `obj` carries a resource version other than the stored one.
    async fn replace<K: Object>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replaces only the status subresource, with the same version check as
    /// [`Store::replace`].
    async fn replace_status<K: Object>(&self, obj: &K) -> Result<K, StoreError>;
}

#[async_trait]
impl<S: Store> Store for std::sync::Arc<S> {
    async fn get<K: Object>(&self, key: &ObjectKey) -> Result<K, StoreError> {
        (**self).get(key).await
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        (**self).create(obj).await
    }

    async fn replace<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        (**self).replace(obj).await
    }

    async fn replace_status<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        (**self).replace_status(obj).await
    }
}
