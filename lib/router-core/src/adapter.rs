//! Versioned resource adapter
//!
//! Every served schema version of a resource is normalized into one internal
//! shape so that the executor and reporter never branch on versions. The
//! inverse direction rebuilds a version-specific spec and the status patch
//! written back at that version.

use crate::error::{CoreError, Result};
use crate::resource::{
    RawResource, ResourceKey, ResourceKind, ResourceStatus, SchemaVersion, VersionedRoute,
    VersionedUpstream,
};
use k8s_openapi::api::networking::v1::IngressSpec;
use router_api::{v2, v2beta3};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Version-agnostic desired state, consumed read-only by the executor
#[derive(Clone, Debug, PartialEq)]
pub enum NormalizedResource {
    Route(NormalizedRoute),
    Upstream(NormalizedUpstream),
    Ingress(NormalizedRoute),
}

impl NormalizedResource {
    pub fn key(&self) -> &ResourceKey {
        match self {
            NormalizedResource::Route(route) | NormalizedResource::Ingress(route) => &route.key,
            NormalizedResource::Upstream(upstream) => &upstream.key,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedRoute {
    pub key: ResourceKey,
    pub rules: Vec<RouteRule>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteRule {
    pub name: String,
    pub priority: i32,
    pub hosts: Vec<String>,
    pub paths: Vec<String>,
    pub methods: Vec<String>,
    pub backends: Vec<Backend>,
    pub websocket: bool,
    pub timeout: Option<Timeouts>,
    pub plugin_config_name: Option<String>,
    pub plugins: Vec<Plugin>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Backend {
    pub service_name: String,
    pub service_port: u16,
    pub weight: Option<u32>,
    pub resolve_granularity: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Plugin {
    pub name: String,
    pub enable: bool,
    pub config: BTreeMap<String, serde_json::Value>,
}

/// Timeouts kept as the user wrote them; each has been checked to parse
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Timeouts {
    pub connect: Option<String>,
    pub send: Option<String>,
    pub read: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedUpstream {
    pub key: ResourceKey,
    pub policy: UpstreamPolicy,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpstreamPolicy {
    pub load_balancer: Option<LoadBalancerPolicy>,
    pub scheme: Option<String>,
    pub retries: Option<u32>,
    pub timeout: Option<Timeouts>,
    pub pass_host: Option<String>,
    pub upstream_host: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoadBalancerPolicy {
    pub kind: String,
    pub hash_on: Option<String>,
    pub key: Option<String>,
}

const LOAD_BALANCER_TYPES: &[&str] = &["roundrobin", "chash", "ewma", "least_conn"];
const SCHEMES: &[&str] = &["http", "https", "grpc", "grpcs"];
const PASS_HOST_MODES: &[&str] = &["pass", "node", "rewrite"];

/// Normalize a raw resource read from the cluster
pub fn normalize(key: &ResourceKey, raw: &RawResource) -> Result<NormalizedResource> {
    match raw {
        RawResource::Route(route) => normalize_route(key, route).map(NormalizedResource::Route),
        RawResource::Upstream(upstream) => {
            normalize_upstream(key, upstream).map(NormalizedResource::Upstream)
        }
        RawResource::Ingress(spec) => normalize_ingress(key, spec).map(NormalizedResource::Ingress),
    }
}

pub fn normalize_route(key: &ResourceKey, route: &VersionedRoute) -> Result<NormalizedRoute> {
    let rules = match route {
        VersionedRoute::V2beta3(spec) => spec
            .http
            .iter()
            .map(|http| {
                let matches = http.r#match.clone().unwrap_or_default();
                let backends = http
                    .backends
                    .iter()
                    .map(|b| {
                        backend(
                            &http.name,
                            &b.service_name,
                            b.service_port,
                            b.weight,
                            b.resolve_granularity.clone(),
                        )
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(RouteRule {
                    name: http.name.clone(),
                    priority: http.priority,
                    hosts: matches.hosts,
                    paths: matches.paths,
                    methods: matches.methods,
                    backends,
                    websocket: http.websocket,
                    timeout: None,
                    plugin_config_name: None,
                    plugins: http
                        .plugins
                        .iter()
                        .map(|p| Plugin {
                            name: p.name.clone(),
                            enable: p.enable,
                            config: p.config.clone(),
                        })
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?,
        VersionedRoute::V2(spec) => spec
            .http
            .iter()
            .map(|http| {
                let matches = http.r#match.clone().unwrap_or_default();
                let backends = http
                    .backends
                    .iter()
                    .map(|b| {
                        backend(
                            &http.name,
                            &b.service_name,
                            b.service_port,
                            b.weight,
                            b.resolve_granularity.clone(),
                        )
                    })
                    .collect::<Result<Vec<_>>>()?;
                let timeout = http
                    .timeout
                    .as_ref()
                    .map(|t| timeouts(&http.name, &t.connect, &t.send, &t.read))
                    .transpose()?;
                Ok(RouteRule {
                    name: http.name.clone(),
                    priority: http.priority,
                    hosts: matches.hosts,
                    paths: matches.paths,
                    methods: matches.methods,
                    backends,
                    websocket: http.websocket,
                    timeout,
                    plugin_config_name: http.plugin_config_name.clone(),
                    plugins: http
                        .plugins
                        .iter()
                        .map(|p| Plugin {
                            name: p.name.clone(),
                            enable: p.enable,
                            config: p.config.clone(),
                        })
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?,
    };

    validate_rules(&rules)?;
    Ok(NormalizedRoute {
        key: key.clone(),
        rules,
    })
}

pub fn normalize_upstream(
    key: &ResourceKey,
    upstream: &VersionedUpstream,
) -> Result<NormalizedUpstream> {
    let policy = match upstream {
        VersionedUpstream::V2beta3(spec) => UpstreamPolicy {
            load_balancer: spec.loadbalancer.as_ref().map(|lb| LoadBalancerPolicy {
                kind: lb.r#type.clone(),
                hash_on: lb.hash_on.clone(),
                key: lb.key.clone(),
            }),
            scheme: spec.scheme.clone(),
            retries: retries(spec.retries)?,
            timeout: spec
                .timeout
                .as_ref()
                .map(|t| timeouts("upstream", &t.connect, &t.send, &t.read))
                .transpose()?,
            pass_host: None,
            upstream_host: None,
        },
        VersionedUpstream::V2(spec) => UpstreamPolicy {
            load_balancer: spec.loadbalancer.as_ref().map(|lb| LoadBalancerPolicy {
                kind: lb.r#type.clone(),
                hash_on: lb.hash_on.clone(),
                key: lb.key.clone(),
            }),
            scheme: spec.scheme.clone(),
            retries: retries(spec.retries)?,
            timeout: spec
                .timeout
                .as_ref()
                .map(|t| timeouts("upstream", &t.connect, &t.send, &t.read))
                .transpose()?,
            pass_host: spec.pass_host.clone(),
            upstream_host: spec.upstream_host.clone(),
        },
    };

    validate_policy(&policy)?;
    Ok(NormalizedUpstream {
        key: key.clone(),
        policy,
    })
}

pub fn normalize_ingress(key: &ResourceKey, spec: &IngressSpec) -> Result<NormalizedRoute> {
    let mut rules = Vec::new();

    for (i, rule) in spec.rules.iter().flatten().enumerate() {
        let Some(http) = &rule.http else { continue };
        for (j, path) in http.paths.iter().enumerate() {
            let service = path.backend.service.as_ref().ok_or_else(|| {
                CoreError::validation(format!(
                    "ingress rule {} path {}: only service backends are supported",
                    i, j
                ))
            })?;
            let port = service
                .port
                .as_ref()
                .and_then(|p| p.number)
                .ok_or_else(|| {
                    CoreError::validation(format!(
                        "ingress rule {} path {}: service {:?} must reference a port number",
                        i, j, service.name
                    ))
                })?;

            let name = format!("{}-{}", i, j);
            let raw_path = path.path.clone().unwrap_or_else(|| "/".to_string());
            rules.push(RouteRule {
                backends: vec![backend(&name, &service.name, port, None, None)?],
                paths: ingress_uris(&raw_path, &path.path_type),
                hosts: rule.host.clone().into_iter().collect(),
                name,
                ..Default::default()
            });
        }
    }

    if rules.is_empty() {
        return Err(CoreError::validation(
            "ingress has no HTTP rules with service backends",
        ));
    }
    validate_rules(&rules)?;

    Ok(NormalizedRoute {
        key: key.clone(),
        rules,
    })
}

fn ingress_uris(path: &str, path_type: &str) -> Vec<String> {
    match path_type {
        "Prefix" => {
            let trimmed = path.trim_end_matches('/');
            if trimmed.is_empty() {
                vec!["/*".to_string()]
            } else {
                vec![trimmed.to_string(), format!("{}/*", trimmed)]
            }
        }
        _ => vec![path.to_string()],
    }
}

fn backend(
    rule: &str,
    service_name: &str,
    port: i32,
    weight: Option<i32>,
    resolve_granularity: Option<String>,
) -> Result<Backend> {
    if service_name.is_empty() {
        return Err(CoreError::validation(format!(
            "rule {:?}: backend serviceName is required",
            rule
        )));
    }
    let service_port = u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| {
            CoreError::validation(format!(
                "rule {:?}: servicePort {} of {:?} is out of range",
                rule, port, service_name
            ))
        })?;
    let weight = weight
        .map(|w| {
            u32::try_from(w).map_err(|_| {
                CoreError::validation(format!(
                    "rule {:?}: backend weight {} must not be negative",
                    rule, w
                ))
            })
        })
        .transpose()?;
    if let Some(granularity) = &resolve_granularity {
        if granularity != "endpoint" && granularity != "service" {
            return Err(CoreError::validation(format!(
                "rule {:?}: resolveGranularity must be \"endpoint\" or \"service\", got {:?}",
                rule, granularity
            )));
        }
    }

    Ok(Backend {
        service_name: service_name.to_string(),
        service_port,
        weight,
        resolve_granularity,
    })
}

fn retries(retries: Option<i32>) -> Result<Option<u32>> {
    retries
        .map(|r| {
            u32::try_from(r).map_err(|_| {
                CoreError::validation(format!("retries must not be negative, got {}", r))
            })
        })
        .transpose()
}

fn timeouts(
    owner: &str,
    connect: &Option<String>,
    send: &Option<String>,
    read: &Option<String>,
) -> Result<Timeouts> {
    for value in [connect, send, read].into_iter().flatten() {
        if parse_duration(value).is_none() {
            return Err(CoreError::validation(format!(
                "{}: invalid timeout {:?}, expected a duration such as \"30s\"",
                owner, value
            )));
        }
    }
    Ok(Timeouts {
        connect: connect.clone(),
        send: send.clone(),
        read: read.clone(),
    })
}

fn validate_rules(rules: &[RouteRule]) -> Result<()> {
    if rules.is_empty() {
        return Err(CoreError::validation("route must declare at least one http rule"));
    }

    let mut names = HashSet::new();
    for rule in rules {
        if rule.name.is_empty() {
            return Err(CoreError::validation("every http rule needs a name"));
        }
        if !names.insert(rule.name.as_str()) {
            return Err(CoreError::validation(format!(
                "duplicate http rule name {:?}",
                rule.name
            )));
        }
        if rule.paths.is_empty() {
            return Err(CoreError::validation(format!(
                "rule {:?}: match.paths must contain at least one path",
                rule.name
            )));
        }
        if let Some(path) = rule.paths.iter().find(|p| !p.starts_with('/')) {
            return Err(CoreError::validation(format!(
                "rule {:?}: path {:?} must start with \"/\"",
                rule.name, path
            )));
        }
        if rule.backends.is_empty() {
            return Err(CoreError::validation(format!(
                "rule {:?}: at least one backend is required",
                rule.name
            )));
        }
    }
    Ok(())
}

fn validate_policy(policy: &UpstreamPolicy) -> Result<()> {
    if let Some(lb) = &policy.load_balancer {
        if !LOAD_BALANCER_TYPES.contains(&lb.kind.as_str()) {
            return Err(CoreError::validation(format!(
                "unknown load balancer type {:?}",
                lb.kind
            )));
        }
        if lb.kind == "chash" && lb.key.is_none() {
            return Err(CoreError::validation(
                "load balancer type \"chash\" requires a key",
            ));
        }
    }
    if let Some(scheme) = &policy.scheme {
        if !SCHEMES.contains(&scheme.as_str()) {
            return Err(CoreError::validation(format!("unknown scheme {:?}", scheme)));
        }
    }
    if let Some(mode) = &policy.pass_host {
        if !PASS_HOST_MODES.contains(&mode.as_str()) {
            return Err(CoreError::validation(format!(
                "unknown passHost mode {:?}",
                mode
            )));
        }
        if mode == "rewrite" && policy.upstream_host.is_none() {
            return Err(CoreError::validation(
                "passHost \"rewrite\" requires upstreamHost",
            ));
        }
    }
    Ok(())
}

/// Parse a duration such as "30s", "500ms", "1m30s" or "1.5s"
pub fn parse_duration(value: &str) -> Option<Duration> {
    let mut rest = value.trim();
    if rest.is_empty() {
        return None;
    }

    let mut total = 0f64;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let amount: f64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += amount * scale;
    }
    if !total.is_finite() {
        return None;
    }
    Duration::try_from_secs_f64(total).ok()
}

/// Rebuild the version-specific spec of a normalized route.
///
/// Fields a version cannot express are dropped.
pub fn denormalize_route(route: &NormalizedRoute, version: SchemaVersion) -> VersionedRoute {
    match version {
        SchemaVersion::V2beta3 => VersionedRoute::V2beta3(v2beta3::ApisixRouteSpec {
            http: route
                .rules
                .iter()
                .map(|rule| v2beta3::route::ApisixRouteHttp {
                    name: rule.name.clone(),
                    priority: rule.priority,
                    r#match: Some(v2beta3::route::ApisixRouteHttpMatch {
                        paths: rule.paths.clone(),
                        methods: rule.methods.clone(),
                        hosts: rule.hosts.clone(),
                    }),
                    backends: rule
                        .backends
                        .iter()
                        .map(|b| v2beta3::route::ApisixRouteHttpBackend {
                            service_name: b.service_name.clone(),
                            service_port: i32::from(b.service_port),
                            resolve_granularity: b.resolve_granularity.clone(),
                            weight: b.weight.map(|w| w as i32),
                        })
                        .collect(),
                    websocket: rule.websocket,
                    plugins: rule
                        .plugins
                        .iter()
                        .map(|p| v2beta3::route::ApisixRoutePlugin {
                            name: p.name.clone(),
                            enable: p.enable,
                            config: p.config.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }),
        SchemaVersion::V2 => VersionedRoute::V2(v2::ApisixRouteSpec {
            http: route
                .rules
                .iter()
                .map(|rule| v2::route::ApisixRouteHttp {
                    name: rule.name.clone(),
                    priority: rule.priority,
                    timeout: rule.timeout.as_ref().map(|t| v2::route::RouteTimeout {
                        connect: t.connect.clone(),
                        send: t.send.clone(),
                        read: t.read.clone(),
                    }),
                    r#match: Some(v2::route::ApisixRouteHttpMatch {
                        paths: rule.paths.clone(),
                        methods: rule.methods.clone(),
                        hosts: rule.hosts.clone(),
                    }),
                    backends: rule
                        .backends
                        .iter()
                        .map(|b| v2::route::ApisixRouteHttpBackend {
                            service_name: b.service_name.clone(),
                            service_port: i32::from(b.service_port),
                            resolve_granularity: b.resolve_granularity.clone(),
                            weight: b.weight.map(|w| w as i32),
                        })
                        .collect(),
                    websocket: rule.websocket,
                    plugin_config_name: rule.plugin_config_name.clone(),
                    plugins: rule
                        .plugins
                        .iter()
                        .map(|p| v2::route::ApisixRoutePlugin {
                            name: p.name.clone(),
                            enable: p.enable,
                            config: p.config.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }),
    }
}

/// Rebuild the version-specific spec of a normalized upstream
pub fn denormalize_upstream(
    upstream: &NormalizedUpstream,
    version: SchemaVersion,
) -> VersionedUpstream {
    let policy = &upstream.policy;
    match version {
        SchemaVersion::V2beta3 => VersionedUpstream::V2beta3(v2beta3::ApisixUpstreamSpec {
            loadbalancer: policy
                .load_balancer
                .as_ref()
                .map(|lb| v2beta3::upstream::LoadBalancer {
                    r#type: lb.kind.clone(),
                    hash_on: lb.hash_on.clone(),
                    key: lb.key.clone(),
                }),
            scheme: policy.scheme.clone(),
            retries: policy.retries.map(|r| r as i32),
            timeout: policy
                .timeout
                .as_ref()
                .map(|t| v2beta3::upstream::UpstreamTimeout {
                    connect: t.connect.clone(),
                    send: t.send.clone(),
                    read: t.read.clone(),
                }),
        }),
        SchemaVersion::V2 => VersionedUpstream::V2(v2::ApisixUpstreamSpec {
            loadbalancer: policy
                .load_balancer
                .as_ref()
                .map(|lb| v2::upstream::LoadBalancer {
                    r#type: lb.kind.clone(),
                    hash_on: lb.hash_on.clone(),
                    key: lb.key.clone(),
                }),
            scheme: policy.scheme.clone(),
            retries: policy.retries.map(|r| r as i32),
            timeout: policy
                .timeout
                .as_ref()
                .map(|t| v2::upstream::UpstreamTimeout {
                    connect: t.connect.clone(),
                    send: t.send.clone(),
                    read: t.read.clone(),
                }),
            pass_host: policy.pass_host.clone(),
            upstream_host: policy.upstream_host.clone(),
        }),
    }
}

/// Build the merge patch that writes `status` onto the resource at `version`.
///
/// The patch carries `metadata.resourceVersion`, so the API server rejects it
/// with a conflict if the object changed since it was read.
pub fn status_patch(
    key: &ResourceKey,
    version: SchemaVersion,
    resource_version: &str,
    status: &ResourceStatus,
) -> Result<serde_json::Value> {
    let (api_version, status) = match key.kind {
        ResourceKind::Route | ResourceKind::Upstream => (
            version.api_version(),
            serde_json::to_value(router_api::ApisixStatus {
                conditions: status.conditions.clone(),
            })?,
        ),
        ResourceKind::Ingress => {
            let ingress: Vec<serde_json::Value> = status
                .load_balancer
                .iter()
                .map(|lb| {
                    let mut entry = serde_json::Map::new();
                    if let Some(ip) = &lb.ip {
                        entry.insert("ip".to_string(), json!(ip));
                    }
                    if let Some(hostname) = &lb.hostname {
                        entry.insert("hostname".to_string(), json!(hostname));
                    }
                    serde_json::Value::Object(entry)
                })
                .collect();
            (
                "networking.k8s.io/v1",
                json!({ "loadBalancer": { "ingress": ingress } }),
            )
        }
    };

    Ok(json!({
        "apiVersion": api_version,
        "kind": key.kind.as_str(),
        "metadata": {
            "name": key.name,
            "namespace": key.namespace,
            "resourceVersion": resource_version,
        },
        "status": status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::LoadBalancerIngress;
    use k8s_openapi::api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressRule,
        IngressServiceBackend, ServiceBackendPort,
    };

    fn route_key() -> ResourceKey {
        ResourceKey::new(ResourceKind::Route, "default", "httpbin-route")
    }

    fn v2beta3_route() -> v2beta3::ApisixRouteSpec {
        serde_json::from_value(json!({
            "http": [{
                "name": "rule1",
                "match": { "hosts": ["httpbin.com"], "paths": ["/ip"] },
                "backends": [{ "serviceName": "httpbin", "servicePort": 80 }]
            }]
        }))
        .unwrap()
    }

    fn v2_route() -> v2::ApisixRouteSpec {
        serde_json::from_value(json!({
            "http": [{
                "name": "rule1",
                "match": { "hosts": ["httpbin.com"], "paths": ["/ip"] },
                "backends": [{ "serviceName": "httpbin", "servicePort": 80 }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_both_versions_normalize_identically() {
        let old = normalize_route(&route_key(), &VersionedRoute::V2beta3(v2beta3_route())).unwrap();
        let new = normalize_route(&route_key(), &VersionedRoute::V2(v2_route())).unwrap();
        assert_eq!(old, new);

        let rule = &new.rules[0];
        assert_eq!(rule.hosts, vec!["httpbin.com"]);
        assert_eq!(rule.paths, vec!["/ip"]);
        assert_eq!(rule.backends[0].service_name, "httpbin");
        assert_eq!(rule.backends[0].service_port, 80);
    }

    #[test]
    fn test_route_round_trips_in_each_version() {
        let mut v2_spec = v2_route();
        v2_spec.http[0].timeout = Some(v2::route::RouteTimeout {
            connect: Some("5s".to_string()),
            send: None,
            read: Some("1m".to_string()),
        });
        v2_spec.http[0].plugin_config_name = Some("shared".to_string());
        v2_spec.http[0].backends[0].weight = Some(10);
        v2_spec.http[0].r#match.as_mut().unwrap().methods = vec!["GET".to_string()];
        v2_spec.http[0].plugins.push(v2::route::ApisixRoutePlugin {
            name: "cors".to_string(),
            enable: true,
            config: BTreeMap::from([("allow_origins".to_string(), json!("*"))]),
        });

        for raw in [
            VersionedRoute::V2beta3(v2beta3_route()),
            VersionedRoute::V2(v2_spec),
        ] {
            let normalized = normalize_route(&route_key(), &raw).unwrap();
            assert_eq!(denormalize_route(&normalized, raw.version()), raw);
        }
    }

    #[test]
    fn test_upstream_round_trips_in_each_version() {
        let key = ResourceKey::new(ResourceKind::Upstream, "default", "httpbin");
        let old = VersionedUpstream::V2beta3(v2beta3::ApisixUpstreamSpec {
            retries: Some(2),
            ..Default::default()
        });
        let new = VersionedUpstream::V2(v2::ApisixUpstreamSpec {
            retries: Some(2),
            scheme: Some("https".to_string()),
            loadbalancer: Some(v2::upstream::LoadBalancer {
                r#type: "chash".to_string(),
                hash_on: Some("header".to_string()),
                key: Some("x-user".to_string()),
            }),
            pass_host: Some("rewrite".to_string()),
            upstream_host: Some("internal.example.com".to_string()),
            ..Default::default()
        });

        for raw in [old, new] {
            let normalized = normalize_upstream(&key, &raw).unwrap();
            assert_eq!(denormalize_upstream(&normalized, raw.version()), raw);
        }
    }

    #[test]
    fn test_missing_backends_is_invalid() {
        let mut spec = v2_route();
        spec.http[0].backends.clear();
        let err = normalize_route(&route_key(), &VersionedRoute::V2(spec)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("at least one backend"));
    }

    #[test]
    fn test_missing_match_is_invalid() {
        let mut spec = v2beta3_route();
        spec.http[0].r#match = None;
        let err = normalize_route(&route_key(), &VersionedRoute::V2beta3(spec)).unwrap_err();
        assert!(err.to_string().contains("match.paths"));
    }

    #[test]
    fn test_out_of_range_port_is_invalid() {
        let mut spec = v2_route();
        spec.http[0].backends[0].service_port = 70000;
        let err = normalize_route(&route_key(), &VersionedRoute::V2(spec)).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_duplicate_rule_names_are_invalid() {
        let mut spec = v2_route();
        spec.http.push(spec.http[0].clone());
        let err = normalize_route(&route_key(), &VersionedRoute::V2(spec)).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_bad_timeout_is_invalid() {
        let mut spec = v2_route();
        spec.http[0].timeout = Some(v2::route::RouteTimeout {
            read: Some("forever".to_string()),
            ..Default::default()
        });
        let err = normalize_route(&route_key(), &VersionedRoute::V2(spec)).unwrap_err();
        assert!(err.to_string().contains("invalid timeout"));
    }

    #[test]
    fn test_overflowing_timeout_is_invalid() {
        let key = ResourceKey::new(ResourceKind::Upstream, "default", "httpbin");
        let raw = VersionedUpstream::V2(v2::ApisixUpstreamSpec {
            timeout: Some(v2::upstream::UpstreamTimeout {
                connect: Some("99999999999999999999999h".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(matches!(
            normalize_upstream(&key, &raw),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_negative_retries_is_invalid() {
        let key = ResourceKey::new(ResourceKind::Upstream, "default", "httpbin");
        let raw = VersionedUpstream::V2(v2::ApisixUpstreamSpec {
            retries: Some(-1),
            ..Default::default()
        });
        assert!(matches!(
            normalize_upstream(&key, &raw),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_chash_requires_key() {
        let key = ResourceKey::new(ResourceKind::Upstream, "default", "httpbin");
        let raw = VersionedUpstream::V2beta3(v2beta3::ApisixUpstreamSpec {
            loadbalancer: Some(v2beta3::upstream::LoadBalancer {
                r#type: "chash".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });
        let err = normalize_upstream(&key, &raw).unwrap_err();
        assert!(err.to_string().contains("requires a key"));
    }

    fn ingress_path(path: &str, path_type: &str, port: Option<i32>) -> HTTPIngressPath {
        HTTPIngressPath {
            path: Some(path.to_string()),
            path_type: path_type.to_string(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: "httpbin".to_string(),
                    port: Some(ServiceBackendPort {
                        number: port,
                        name: port.is_none().then(|| "http".to_string()),
                    }),
                }),
                ..Default::default()
            },
        }
    }

    fn ingress_spec(paths: Vec<HTTPIngressPath>) -> IngressSpec {
        IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some("httpbin.org".to_string()),
                http: Some(HTTPIngressRuleValue { paths }),
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_ingress_path_types() {
        let key = ResourceKey::new(ResourceKind::Ingress, "default", "ingress-v1-lb");
        let spec = ingress_spec(vec![
            ingress_path("/ip", "Exact", Some(80)),
            ingress_path("/api/", "Prefix", Some(80)),
            ingress_path("/", "Prefix", Some(80)),
        ]);

        let route = normalize_ingress(&key, &spec).unwrap();
        assert_eq!(route.rules.len(), 3);
        assert_eq!(route.rules[0].name, "0-0");
        assert_eq!(route.rules[0].paths, vec!["/ip"]);
        assert_eq!(route.rules[0].hosts, vec!["httpbin.org"]);
        assert_eq!(route.rules[1].paths, vec!["/api", "/api/*"]);
        assert_eq!(route.rules[2].paths, vec!["/*"]);
    }

    #[test]
    fn test_ingress_named_port_is_invalid() {
        let key = ResourceKey::new(ResourceKind::Ingress, "default", "named");
        let spec = ingress_spec(vec![ingress_path("/ip", "Exact", None)]);
        let err = normalize_ingress(&key, &spec).unwrap_err();
        assert!(err.to_string().contains("port number"));
    }

    #[test]
    fn test_ingress_without_rules_is_invalid() {
        let key = ResourceKey::new(ResourceKind::Ingress, "default", "empty");
        assert!(normalize_ingress(&key, &IngressSpec::default()).is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("99999999999999999999999h"), None);
    }

    #[test]
    fn test_route_status_patch_uses_target_version() {
        let status = ResourceStatus {
            conditions: vec![router_api::Condition {
                r#type: "ResourcesAvailable".to_string(),
                status: "True".to_string(),
                reason: "Succeeded".to_string(),
                message: "Sync Successfully".to_string(),
                observed_generation: Some(1),
                last_transition_time: "2024-01-01T00:00:00Z".to_string(),
            }],
            load_balancer: Vec::new(),
        };

        let patch = status_patch(&route_key(), SchemaVersion::V2beta3, "42", &status).unwrap();
        assert_eq!(patch["apiVersion"], "apisix.apache.org/v2beta3");
        assert_eq!(patch["kind"], "ApisixRoute");
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["status"]["conditions"][0]["type"], "ResourcesAvailable");
        assert_eq!(patch["status"]["conditions"][0]["message"], "Sync Successfully");
    }

    #[test]
    fn test_ingress_status_patch() {
        let key = ResourceKey::new(ResourceKind::Ingress, "default", "ingress-v1-lb");
        let status = ResourceStatus {
            conditions: Vec::new(),
            load_balancer: vec![LoadBalancerIngress {
                ip: Some("10.6.6.6".to_string()),
                hostname: None,
            }],
        };

        let patch = status_patch(&key, SchemaVersion::V2, "7", &status).unwrap();
        assert_eq!(patch["apiVersion"], "networking.k8s.io/v1");
        assert_eq!(
            patch["status"],
            json!({ "loadBalancer": { "ingress": [{ "ip": "10.6.6.6" }] } })
        );
    }
}
