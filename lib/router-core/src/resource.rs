//! Resource identity and the raw objects read from the cluster

use crate::error::{CoreError, Result};
use k8s_openapi::api::networking::v1::IngressSpec;
use router_api::{v2, v2beta3, Condition};
use std::fmt;
use std::str::FromStr;

/// Kinds of resources the controller reconciles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Route,
    Upstream,
    Ingress,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Route => "ApisixRoute",
            ResourceKind::Upstream => "ApisixUpstream",
            ResourceKind::Ingress => "Ingress",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a watched resource; the unit of serialization in the work queue
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Served schema versions of the custom resources
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    V2beta3,
    #[default]
    V2,
}

impl SchemaVersion {
    pub fn api_version(&self) -> &'static str {
        match self {
            SchemaVersion::V2beta3 => v2beta3::API_VERSION,
            SchemaVersion::V2 => v2::API_VERSION,
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_start_matches("apisix.apache.org/") {
            "v2beta3" => Ok(SchemaVersion::V2beta3),
            "v2" => Ok(SchemaVersion::V2),
            other => Err(CoreError::config(format!(
                "unsupported schema version {:?}, expected v2 or v2beta3",
                other
            ))),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_version())
    }
}

/// An ApisixRoute spec tagged with the version it was read at
#[derive(Clone, Debug, PartialEq)]
pub enum VersionedRoute {
    V2beta3(v2beta3::ApisixRouteSpec),
    V2(v2::ApisixRouteSpec),
}

/// An ApisixUpstream spec tagged with the version it was read at
#[derive(Clone, Debug, PartialEq)]
pub enum VersionedUpstream {
    V2beta3(v2beta3::ApisixUpstreamSpec),
    V2(v2::ApisixUpstreamSpec),
}

impl VersionedRoute {
    pub fn version(&self) -> SchemaVersion {
        match self {
            VersionedRoute::V2beta3(_) => SchemaVersion::V2beta3,
            VersionedRoute::V2(_) => SchemaVersion::V2,
        }
    }
}

impl VersionedUpstream {
    pub fn version(&self) -> SchemaVersion {
        match self {
            VersionedUpstream::V2beta3(_) => SchemaVersion::V2beta3,
            VersionedUpstream::V2(_) => SchemaVersion::V2,
        }
    }
}

/// User-authored desired state as read from the cluster
#[derive(Clone, Debug, PartialEq)]
pub enum RawResource {
    Route(VersionedRoute),
    Upstream(VersionedUpstream),
    Ingress(Box<IngressSpec>),
}

/// Load balancer ingress point written onto an Ingress
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadBalancerIngress {
    pub ip: Option<String>,
    pub hostname: Option<String>,
}

/// Version-agnostic view of a resource's status subresource
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceStatus {
    pub conditions: Vec<Condition>,
    pub load_balancer: Vec<LoadBalancerIngress>,
}

impl ResourceStatus {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.load_balancer.is_empty()
    }
}

/// A resource as currently stored on the cluster
#[derive(Clone, Debug, PartialEq)]
pub struct StoredResource {
    pub generation: i64,
    pub resource_version: String,
    pub object: RawResource,
    pub status: ResourceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = ResourceKey::new(ResourceKind::Route, "default", "httpbin-route");
        assert_eq!(key.to_string(), "ApisixRoute/default/httpbin-route");
    }

    #[test]
    fn test_parse_schema_version() {
        assert_eq!("v2".parse::<SchemaVersion>().unwrap(), SchemaVersion::V2);
        assert_eq!(
            "apisix.apache.org/v2beta3".parse::<SchemaVersion>().unwrap(),
            SchemaVersion::V2beta3
        );
        assert!(matches!(
            "v1".parse::<SchemaVersion>(),
            Err(CoreError::FatalConfig(_))
        ));
    }
}
