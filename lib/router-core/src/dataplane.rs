//! Objects pushed to the data-plane and the API used to push them

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Deterministic data-plane id for an object name
pub fn object_id(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    hex::encode(&digest[..8])
}

/// Timeouts in seconds
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TimeoutObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteObject {
    pub id: String,
    pub name: String,
    pub uris: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    pub priority: i32,
    pub upstream_id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub enable_websocket: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_config_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub plugins: BTreeMap<String, serde_json::Value>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpstreamNode {
    pub host: String,
    pub port: u16,
    pub weight: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UpstreamObject {
    pub id: String,
    pub name: String,
    pub r#type: String,
    pub nodes: Vec<UpstreamNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_host: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// Control API of the external proxy.
///
/// Every call replaces the named object wholesale, so repeating a call is
/// harmless. Deleting an object that does not exist succeeds.
#[async_trait]
pub trait DataPlane: Send + Sync {
    async fn apply_route(&self, route: &RouteObject) -> Result<()>;

    async fn apply_upstream(&self, upstream: &UpstreamObject) -> Result<()>;

    async fn delete_route(&self, id: &str) -> Result<()>;

    async fn delete_upstream(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_is_stable() {
        let id = object_id("default_httpbin-route_rule1");
        assert_eq!(id.len(), 16);
        assert_eq!(id, object_id("default_httpbin-route_rule1"));
        assert_ne!(id, object_id("default_httpbin-route_rule2"));
    }

    #[test]
    fn test_route_object_omits_empty_fields() {
        let route = RouteObject {
            id: "abc".to_string(),
            name: "default_r_rule1".to_string(),
            uris: vec!["/ip".to_string()],
            hosts: Vec::new(),
            methods: Vec::new(),
            priority: 0,
            upstream_id: "def".to_string(),
            enable_websocket: false,
            timeout: None,
            plugin_config_id: None,
            plugins: BTreeMap::new(),
            labels: BTreeMap::new(),
        };
        let value = serde_json::to_value(&route).unwrap();
        assert!(value.get("hosts").is_none());
        assert!(value.get("enable_websocket").is_none());
        assert!(value.get("plugins").is_none());
        assert_eq!(value["upstream_id"], "def");
    }
}
