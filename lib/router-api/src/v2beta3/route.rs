use crate::ApisixStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ApisixRoute defines Layer 7 routing rules from hosts/paths to Services
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v2beta3",
    kind = "ApisixRoute",
    plural = "apisixroutes",
    shortname = "ar",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    status = "ApisixStatus",
)]
pub struct ApisixRouteSpec {
    /// HTTP routing rules
    #[serde(default)]
    pub http: Vec<ApisixRouteHttp>,
}

/// A single named HTTP routing rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteHttp {
    /// Rule name, unique within the route
    pub name: String,

    /// Priority among overlapping rules
    #[serde(default)]
    pub priority: i32,

    /// Match conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#match: Option<ApisixRouteHttpMatch>,

    /// Destination services
    #[serde(default)]
    pub backends: Vec<ApisixRouteHttpBackend>,

    /// Enable websocket proxying
    #[serde(default)]
    pub websocket: bool,

    /// Plugins attached to this rule
    #[serde(default)]
    pub plugins: Vec<ApisixRoutePlugin>,
}

/// Match conditions for a rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApisixRouteHttpMatch {
    /// URI paths, `*` suffix for prefix matching
    #[serde(default)]
    pub paths: Vec<String>,

    /// HTTP methods (GET, POST, etc)
    #[serde(default)]
    pub methods: Vec<String>,

    /// Host names
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// Kubernetes Service a rule forwards to
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteHttpBackend {
    /// Name of the Service
    pub service_name: String,

    /// Port of the Service
    pub service_port: i32,

    /// "endpoint" or "service"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_granularity: Option<String>,

    /// Traffic weight relative to the rule's other backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

/// Plugin configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApisixRoutePlugin {
    pub name: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}
