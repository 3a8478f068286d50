//! Sync executor: pushes normalized desired state to the data-plane

use crate::adapter::{
    parse_duration, NormalizedResource, NormalizedRoute, NormalizedUpstream, RouteRule, Timeouts,
};
use crate::dataplane::{
    object_id, DataPlane, RouteObject, TimeoutObject, UpstreamNode, UpstreamObject,
};
use crate::error::{CoreError, Result};
use crate::registry::{SyncRegistry, SyncedObjects, UpstreamTarget};
use crate::resource::{ResourceKey, ResourceKind};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_WEIGHT: u32 = 100;
const DEFAULT_LOAD_BALANCER: &str = "roundrobin";

/// Result of one apply, consumed once by the status reporter
#[derive(Debug)]
pub struct SyncOutcome {
    error: Option<CoreError>,
}

impl SyncOutcome {
    pub fn success() -> Self {
        Self { error: None }
    }

    pub fn failed(error: CoreError) -> Self {
        Self { error: Some(error) }
    }

    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&CoreError> {
        self.error.as_ref()
    }

    /// Human-readable failure detail
    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    #[cfg(test)]
    pub fn is_retryable(&self) -> bool {
        self.error.as_ref().is_some_and(CoreError::is_retryable)
    }
}

/// SyncExecutor translates normalized resources into data-plane objects.
///
/// It never retries; callers serialize applies per resource key.
pub struct SyncExecutor {
    dataplane: Arc<dyn DataPlane>,
    registry: Arc<SyncRegistry>,
    cluster_domain: String,
}

impl SyncExecutor {
    pub fn new(
        dataplane: Arc<dyn DataPlane>,
        registry: Arc<SyncRegistry>,
        cluster_domain: impl Into<String>,
    ) -> Self {
        Self {
            dataplane,
            registry,
            cluster_domain: cluster_domain.into(),
        }
    }

    /// Make the resource's desired state live on the data-plane
    pub async fn apply(&self, resource: &NormalizedResource) -> SyncOutcome {
        let result = match resource {
            NormalizedResource::Route(route) | NormalizedResource::Ingress(route) => {
                self.apply_route(route).await
            }
            NormalizedResource::Upstream(upstream) => self.apply_upstream(upstream).await,
        };

        match result {
            Ok(()) => {
                debug!("Synced {} to the data plane", resource.key());
                SyncOutcome::success()
            }
            Err(e) => {
                warn!("Failed to sync {}: {}", resource.key(), e);
                SyncOutcome::failed(e)
            }
        }
    }

    /// Remove everything applied for a deleted resource
    pub async fn remove(&self, key: &ResourceKey) -> Result<()> {
        match key.kind {
            ResourceKind::Upstream => {
                self.registry.remove_policy(&key.namespace, &key.name).await;
                self.reapply_service(&key.namespace, &key.name).await
            }
            ResourceKind::Route | ResourceKind::Ingress => {
                let Some(objects) = self.registry.forget(key).await else {
                    debug!("Nothing synced for {}, skipping data plane cleanup", key);
                    return Ok(());
                };

                let mut first_error = None;
                for id in &objects.routes {
                    if let Err(e) = self.dataplane.delete_route(id).await {
                        warn!("Failed to delete route {} of {}: {}", id, key, e);
                        first_error.get_or_insert(e);
                    }
                }
                for id in objects.upstreams.keys() {
                    if let Err(e) = self.collect_upstream(id, key).await {
                        warn!("Failed to delete upstream {} of {}: {}", id, key, e);
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
        }
    }

    async fn apply_route(&self, route: &NormalizedRoute) -> Result<()> {
        let key = &route.key;
        let previous = self.registry.synced(key).await.unwrap_or_default();

        let mut current = SyncedObjects::default();
        let mut upstreams = BTreeMap::new();
        let mut routes = Vec::with_capacity(route.rules.len());

        for rule in &route.rules {
            let mut weighted = Vec::with_capacity(rule.backends.len());
            for backend in &rule.backends {
                let target = UpstreamTarget {
                    namespace: key.namespace.clone(),
                    service: backend.service_name.clone(),
                    port: backend.service_port,
                };
                let upstream = self.build_upstream(&target).await;
                weighted.push((upstream.id.clone(), backend.weight.unwrap_or(DEFAULT_WEIGHT)));
                current.upstreams.insert(upstream.id.clone(), target);
                upstreams.insert(upstream.id.clone(), upstream);
            }

            let object = build_route(key, rule, &weighted)?;
            current.routes.insert(object.id.clone());
            routes.push(object);
        }

        // Track the union until the apply finishes so a failed pass still
        // knows about every object it may have left behind.
        let mut pending = previous.clone();
        pending.routes.extend(current.routes.iter().cloned());
        pending
            .upstreams
            .extend(current.upstreams.iter().map(|(k, v)| (k.clone(), v.clone())));

        {
            let _locks = self.registry.lock_upstreams(upstreams.keys()).await;
            self.registry.record(key, pending).await;
            for upstream in upstreams.values() {
                self.dataplane.apply_upstream(upstream).await?;
            }
        }
        for object in &routes {
            self.dataplane.apply_route(object).await?;
        }

        for id in previous.routes.difference(&current.routes) {
            debug!("Deleting stale route {} of {}", id, key);
            self.dataplane.delete_route(id).await?;
        }
        for id in previous.upstreams.keys() {
            if !current.upstreams.contains_key(id) {
                self.collect_upstream(id, key).await?;
            }
        }

        self.registry.record(key, current).await;
        Ok(())
    }

    // Delete an upstream no other resource references. The check and the
    // delete run under the upstream's lock so a concurrent apply of the same
    // upstream lands after the delete.
    async fn collect_upstream(&self, id: &str, owner: &ResourceKey) -> Result<()> {
        let _lock = self.registry.lock_upstreams([id]).await;
        if self.registry.upstream_in_use(id, owner).await {
            return Ok(());
        }
        debug!("Deleting unreferenced upstream {} of {}", id, owner);
        self.dataplane.delete_upstream(id).await
    }

    async fn apply_upstream(&self, upstream: &NormalizedUpstream) -> Result<()> {
        let key = &upstream.key;
        self.registry
            .set_policy(&key.namespace, &key.name, upstream.policy.clone())
            .await;
        self.reapply_service(&key.namespace, &key.name).await
    }

    // Push every upstream object generated for a Service again so that it
    // picks up the currently registered policy.
    async fn reapply_service(&self, namespace: &str, service: &str) -> Result<()> {
        let targets = self.registry.targets_for_service(namespace, service).await;
        debug!(
            "Re-applying {} upstreams of service {}/{}",
            targets.len(),
            namespace,
            service
        );
        for (id, target) in &targets {
            let _lock = self.registry.lock_upstreams([id]).await;
            if !self.registry.upstream_referenced(id).await {
                continue;
            }
            let upstream = self.build_upstream(target).await;
            self.dataplane.apply_upstream(&upstream).await?;
        }
        Ok(())
    }

    async fn build_upstream(&self, target: &UpstreamTarget) -> UpstreamObject {
        let name = format!("{}_{}_{}", target.namespace, target.service, target.port);
        let policy = self
            .registry
            .policy(&target.namespace, &target.service)
            .await
            .unwrap_or_default();
        let (kind, hash_on, key) = match policy.load_balancer {
            Some(lb) => (lb.kind, lb.hash_on, lb.key),
            None => (DEFAULT_LOAD_BALANCER.to_string(), None, None),
        };

        UpstreamObject {
            id: object_id(&name),
            r#type: kind,
            nodes: vec![UpstreamNode {
                host: format!(
                    "{}.{}.svc.{}",
                    target.service, target.namespace, self.cluster_domain
                ),
                port: target.port,
                weight: DEFAULT_WEIGHT,
            }],
            retries: policy.retries,
            timeout: policy.timeout.as_ref().map(timeout_object),
            scheme: policy.scheme,
            hash_on,
            key,
            pass_host: policy.pass_host,
            upstream_host: policy.upstream_host,
            labels: labels(ResourceKind::Upstream),
            name,
        }
    }
}

/// Data-plane name of the route generated for one rule
pub fn route_name(key: &ResourceKey, rule: &str) -> String {
    match key.kind {
        ResourceKind::Ingress => format!("ingress_{}_{}_{}", key.namespace, key.name, rule),
        _ => format!("{}_{}_{}", key.namespace, key.name, rule),
    }
}

fn build_route(
    key: &ResourceKey,
    rule: &RouteRule,
    weighted: &[(String, u32)],
) -> Result<RouteObject> {
    let name = route_name(key, &rule.name);
    let (upstream_id, primary_weight) = weighted
        .first()
        .cloned()
        .ok_or_else(|| CoreError::validation(format!("rule {:?} has no backends", rule.name)))?;

    let mut plugins: BTreeMap<String, serde_json::Value> = rule
        .plugins
        .iter()
        .filter(|p| p.enable)
        .map(|p| {
            let config: serde_json::Map<String, serde_json::Value> =
                p.config.clone().into_iter().collect();
            (p.name.clone(), serde_json::Value::Object(config))
        })
        .collect();

    if weighted.len() > 1 {
        let mut upstreams: Vec<serde_json::Value> = weighted[1..]
            .iter()
            .map(|(id, weight)| json!({ "upstream_id": id, "weight": weight }))
            .collect();
        // The entry without an upstream_id stands for the route's own upstream
        upstreams.push(json!({ "weight": primary_weight }));
        plugins.insert(
            "traffic-split".to_string(),
            json!({ "rules": [{ "weighted_upstreams": upstreams }] }),
        );
    }

    Ok(RouteObject {
        id: object_id(&name),
        name,
        uris: rule.paths.clone(),
        hosts: rule.hosts.clone(),
        methods: rule.methods.clone(),
        priority: rule.priority,
        upstream_id,
        enable_websocket: rule.websocket,
        timeout: rule.timeout.as_ref().map(timeout_object),
        plugin_config_id: rule
            .plugin_config_name
            .as_ref()
            .map(|n| object_id(&format!("{}_{}", key.namespace, n))),
        plugins,
        labels: labels(key.kind),
    })
}

fn timeout_object(timeouts: &Timeouts) -> TimeoutObject {
    let secs = |value: &Option<String>| {
        value
            .as_deref()
            .and_then(parse_duration)
            .map(|d| d.as_secs_f64())
    };
    TimeoutObject {
        connect: secs(&timeouts.connect),
        send: secs(&timeouts.send),
        read: secs(&timeouts.read),
    }
}

fn labels(kind: ResourceKind) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("managed-by".to_string(), "router-controller".to_string()),
        ("kind".to_string(), kind.as_str().to_string()),
    ])
}
