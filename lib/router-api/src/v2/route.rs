use crate::ApisixStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ApisixRoute defines Layer 7 routing rules from hosts/paths to Services
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixRoute",
    plural = "apisixroutes",
    shortname = "ar",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    status = "ApisixStatus",
    printcolumn = r#"{"name":"Hosts","type":"string","jsonPath":".spec.http[].match.hosts"}"#,
    printcolumn = r#"{"name":"URIs","type":"string","jsonPath":".spec.http[].match.paths"}"#,
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

    /// Proxy timeouts for this rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<RouteTimeout>,

    /// Match conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#match: Option<ApisixRouteHttpMatch>,

    /// Destination services
    #[serde(default)]
    pub backends: Vec<ApisixRouteHttpBackend>,

    /// Enable websocket proxying
    #[serde(default)]
    pub websocket: bool,

    /// Name of a shared plugin config on the data-plane
    #[serde(
        rename = "plugin_config_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub plugin_config_name: Option<String>,

    /// Plugins attached to this rule
    #[serde(default)]
    pub plugins: Vec<ApisixRoutePlugin>,
}

/// Timeouts as duration strings ("5s", "500ms", "1m")
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteTimeout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_route_manifest() {
        let spec: ApisixRouteSpec = serde_json::from_value(serde_json::json!({
            "http": [{
                "name": "rule1",
                "match": { "hosts": ["httpbin.com"], "paths": ["/ip"] },
                "backends": [{ "serviceName": "httpbin", "servicePort": 80 }],
                "timeout": { "read": "30s" },
                "plugin_config_name": "shared"
            }]
        }))
        .unwrap();

        let rule = &spec.http[0];
        assert_eq!(rule.name, "rule1");
        assert_eq!(rule.r#match.as_ref().unwrap().hosts, vec!["httpbin.com"]);
        assert_eq!(rule.backends[0].service_port, 80);
        assert_eq!(rule.timeout.as_ref().unwrap().read.as_deref(), Some("30s"));
        assert_eq!(rule.plugin_config_name.as_deref(), Some("shared"));
        assert!(!rule.websocket);
    }
}
