use crate::ApisixStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ApisixUpstream decorates the upstream generated for a Service with
/// load balancing, retry, timeout and host passing policy. Its name is the
/// Service's name.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixUpstream",
    plural = "apisixupstreams",
    shortname = "au",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    status = "ApisixStatus",
)]
#[serde(rename_all = "camelCase")]
pub struct ApisixUpstreamSpec {
    /// Load balancing algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loadbalancer: Option<LoadBalancer>,

    /// Protocol used to talk to the upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    /// Number of retries on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<i32>,

    /// Upstream timeouts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<UpstreamTimeout>,

    /// pass, node or rewrite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_host: Option<String>,

    /// Host header sent upstream when pass_host is "rewrite"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_host: Option<String>,
}

/// Load balancing configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// roundrobin, chash, ewma or least_conn
    pub r#type: String,

    /// Hash source for chash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_on: Option<String>,

    /// Hash key for chash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Timeouts as duration strings ("5s", "500ms", "1m")
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpstreamTimeout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
}
