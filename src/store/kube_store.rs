use crate::store::{Object, ObjectKey, Store, StoreError};
use async_trait::async_trait;
use kube::{
    api::{Api, PostParams},
    core::ErrorResponse,
    Client,
};

/// Store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> KubeStore {
        KubeStore { client }
    }

    fn api<K: Object>(&self, namespace: &str) -> Api<K> {
        Api::<K>::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get<K: Object>(&self, key: &ObjectKey) -> Result<K, StoreError> {
        Ok(self.api::<K>(&key.namespace).get(&key.name).await?)
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj).map_err(StoreError::missing_key)?;
        Ok(self
            .api::<K>(&key.namespace)
            .create(&PostParams::default(), obj)
            .await?)
    }

    async fn replace<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj).map_err(StoreError::missing_key)?;
        Ok(self
            .api::<K>(&key.namespace)
            .replace(&key.name, &PostParams::default(), obj)
            .await?)
    }

    async fn replace_status<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj).map_err(StoreError::missing_key)?;
        let data = serde_json::to_vec(obj)
            .map_err(|e| StoreError::Permanent(format!("cannot serialize status: {}", e)))?;
        Ok(self
            .api::<K>(&key.namespace)
            .replace_status(&key.name, &PostParams::default(), data)
            .await?)
    }
}

// Classifies by the API server's reason first and falls back to the HTTP code
// for reasons this controller has no special handling for.
impl From<kube::Error> for StoreError {
    fn from(error: kube::Error) -> StoreError {
        match error {
            kube::Error::Api(ErrorResponse {
                reason,
                code,
                message,
                ..
            }) => match reason.as_str() {
                "NotFound" => StoreError::NotFound,
                "AlreadyExists" => StoreError::AlreadyExists,
                "Conflict" => StoreError::Conflict,
                "InternalError" | "Timeout" | "ServerTimeout" | "TooManyRequests"
                | "ServiceUnavailable" => StoreError::Transient(format!("{}: {}", reason, message)),
                _ if code == 404 => StoreError::NotFound,
                _ if code == 429 || code >= 500 => {
                    StoreError::Transient(format!("{} ({}): {}", reason, code, message))
                }
                _ => StoreError::Permanent(format!("{} ({}): {}", reason, code, message)),
            },
            other => StoreError::Transient(other.to_string()),
        }
    }
}
