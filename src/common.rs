use std::collections::BTreeMap;

pub const CONTROLLER_NAME: &str = "nginx-controller";

pub const APP_LABEL_KEY: &str = "app";
pub const NGINX_CONTAINER_NAME: &str = "nginx";
pub const NGINX_IMAGE: &str = "docker.io/nginxinc/nginx-unprivileged:latest";
pub const NGINX_PORT: i32 = 8080;

pub fn deployment_name(cluster_name: &str) -> String {
    cluster_name.to_string()
}

pub fn service_name(cluster_name: &str) -> String {
    cluster_name.to_string()
}

pub fn selector_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL_KEY.to_string(), cluster_name.to_string())])
}
