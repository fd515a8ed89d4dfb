use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Default, Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "apps.example.com", version = "v1alpha1", kind = "NginxCluster")]
#[kube(shortname = "nginx", namespaced)]
#[kube(status = "NginxClusterStatus")]
pub struct NginxClusterSpec {
    /// Unset means the Deployment keeps whatever replica count the API server defaults it to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

#[derive(Default, Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct NginxClusterStatus {
    #[serde(rename = "availableReplicas", default)]
    pub available_replicas: i32,
}

impl NginxCluster {
    pub fn available_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .map_or(0, |status| status.available_replicas)
    }
}
