//! Kubernetes-backed resource store

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::{Ingress, IngressLoadBalancerIngress};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource};
use router_api::{v2, v2beta3, ApisixStatus};
use router_core::adapter::status_patch;
use router_core::resource::{
    LoadBalancerIngress, RawResource, ResourceKey, ResourceKind, ResourceStatus, SchemaVersion,
    StoredResource, VersionedRoute, VersionedUpstream,
};
use router_core::store::{ResourceStore, StatusWrite};
use router_core::Result;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// True when the Ingress belongs to `class`, by spec field or legacy annotation
pub fn matches_class(ingress: &Ingress, class: &str) -> bool {
    if let Some(name) = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.as_deref())
    {
        return name == class;
    }
    ingress
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(INGRESS_CLASS_ANNOTATION))
        .is_some_and(|value| value == class)
}

/// KubeStore reads watched resources at their configured versions and
/// patches their status subresource
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    route_version: SchemaVersion,
    upstream_version: SchemaVersion,
    ingress_class: String,
}

impl KubeStore {
    pub fn new(
        client: Client,
        route_version: SchemaVersion,
        upstream_version: SchemaVersion,
        ingress_class: impl Into<String>,
    ) -> Self {
        Self {
            client,
            route_version,
            upstream_version,
            ingress_class: ingress_class.into(),
        }
    }

    async fn fetch<K>(&self, key: &ResourceKey) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn patch<K>(&self, key: &ResourceKey, patch: &serde_json::Value) -> kube::Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        api.patch_status(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<StoredResource>> {
        let stored = match (key.kind, self.route_version, self.upstream_version) {
            (ResourceKind::Route, SchemaVersion::V2, _) => {
                self.fetch::<v2::ApisixRoute>(key).await?.map(|r| {
                    stored(&r.metadata, RawResource::Route(VersionedRoute::V2(r.spec)), r.status)
                })
            }
            (ResourceKind::Route, SchemaVersion::V2beta3, _) => {
                self.fetch::<v2beta3::ApisixRoute>(key).await?.map(|r| {
                    stored(
                        &r.metadata,
                        RawResource::Route(VersionedRoute::V2beta3(r.spec)),
                        r.status,
                    )
                })
            }
            (ResourceKind::Upstream, _, SchemaVersion::V2) => {
                self.fetch::<v2::ApisixUpstream>(key).await?.map(|u| {
                    stored(
                        &u.metadata,
                        RawResource::Upstream(VersionedUpstream::V2(u.spec)),
                        u.status,
                    )
                })
            }
            (ResourceKind::Upstream, _, SchemaVersion::V2beta3) => {
                self.fetch::<v2beta3::ApisixUpstream>(key).await?.map(|u| {
                    stored(
                        &u.metadata,
                        RawResource::Upstream(VersionedUpstream::V2beta3(u.spec)),
                        u.status,
                    )
                })
            }
            (ResourceKind::Ingress, _, _) => self
                .fetch::<Ingress>(key)
                .await?
                .filter(|ingress| matches_class(ingress, &self.ingress_class))
                .map(stored_ingress),
        };
        Ok(stored)
    }

    async fn update_status(
        &self,
        key: &ResourceKey,
        resource_version: &str,
        status: &ResourceStatus,
    ) -> Result<StatusWrite> {
        let version = match key.kind {
            ResourceKind::Upstream => self.upstream_version,
            _ => self.route_version,
        };
        let patch = status_patch(key, version, resource_version, status)?;

        let result = match (key.kind, version) {
            (ResourceKind::Route, SchemaVersion::V2) => {
                self.patch::<v2::ApisixRoute>(key, &patch).await
            }
            (ResourceKind::Route, SchemaVersion::V2beta3) => {
                self.patch::<v2beta3::ApisixRoute>(key, &patch).await
            }
            (ResourceKind::Upstream, SchemaVersion::V2) => {
                self.patch::<v2::ApisixUpstream>(key, &patch).await
            }
            (ResourceKind::Upstream, SchemaVersion::V2beta3) => {
                self.patch::<v2beta3::ApisixUpstream>(key, &patch).await
            }
            (ResourceKind::Ingress, _) => self.patch::<Ingress>(key, &patch).await,
        };

        match result {
            Ok(()) => Ok(StatusWrite::Updated),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!("Status patch of {} conflicted: {}", key, e.message);
                Ok(StatusWrite::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn stored(meta: &ObjectMeta, object: RawResource, status: Option<ApisixStatus>) -> StoredResource {
    StoredResource {
        generation: meta.generation.unwrap_or_default(),
        resource_version: meta.resource_version.clone().unwrap_or_default(),
        object,
        status: ResourceStatus {
            conditions: status.map(|s| s.conditions).unwrap_or_default(),
            load_balancer: Vec::new(),
        },
    }
}

fn stored_ingress(ingress: Ingress) -> StoredResource {
    let load_balancer = ingress
        .status
        .and_then(|status| status.load_balancer)
        .and_then(|lb| lb.ingress)
        .unwrap_or_default()
        .into_iter()
        .map(|IngressLoadBalancerIngress { ip, hostname, .. }| LoadBalancerIngress { ip, hostname })
        .collect();

    StoredResource {
        generation: ingress.metadata.generation.unwrap_or_default(),
        resource_version: ingress.metadata.resource_version.unwrap_or_default(),
        object: RawResource::Ingress(Box::new(ingress.spec.unwrap_or_default())),
        status: ResourceStatus {
            conditions: Vec::new(),
            load_balancer,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ingress(value: serde_json::Value) -> Ingress {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_matches_class_by_field() {
        let ing = ingress(json!({
            "metadata": { "name": "ingress-v1-lb", "namespace": "default" },
            "spec": { "ingressClassName": "apisix" }
        }));
        assert!(matches_class(&ing, "apisix"));
        assert!(!matches_class(&ing, "nginx"));
    }

    #[test]
    fn test_field_wins_over_annotation() {
        let ing = ingress(json!({
            "metadata": {
                "name": "ingress-v1-lb",
                "annotations": { "kubernetes.io/ingress.class": "apisix" }
            },
            "spec": { "ingressClassName": "nginx" }
        }));
        assert!(!matches_class(&ing, "apisix"));
    }

    #[test]
    fn test_matches_class_by_annotation() {
        let ing = ingress(json!({
            "metadata": {
                "name": "ingress-v1-lb",
                "annotations": { "kubernetes.io/ingress.class": "apisix" }
            },
            "spec": {}
        }));
        assert!(matches_class(&ing, "apisix"));

        let unclassed = ingress(json!({ "metadata": { "name": "other" } }));
        assert!(!matches_class(&unclassed, "apisix"));
    }

    #[test]
    fn test_stored_ingress_reads_status() {
        let ing = ingress(json!({
            "metadata": {
                "name": "ingress-v1-lb",
                "generation": 3,
                "resourceVersion": "4711"
            },
            "spec": { "ingressClassName": "apisix" },
            "status": { "loadBalancer": { "ingress": [{ "ip": "10.6.6.6" }] } }
        }));
        let stored = stored_ingress(ing);
        assert_eq!(stored.generation, 3);
        assert_eq!(stored.resource_version, "4711");
        assert_eq!(stored.status.load_balancer[0].ip.as_deref(), Some("10.6.6.6"));
        assert!(matches!(stored.object, RawResource::Ingress(_)));
    }

    #[test]
    fn test_stored_route_conditions() {
        let route: v2::ApisixRoute = serde_json::from_value(json!({
            "apiVersion": "apisix.apache.org/v2",
            "kind": "ApisixRoute",
            "metadata": { "name": "httpbin-route", "generation": 2, "resourceVersion": "10" },
            "spec": { "http": [] },
            "status": { "conditions": [{
                "type": "ResourcesAvailable",
                "status": "True",
                "reason": "Succeeded",
                "message": "Sync Successfully",
                "observedGeneration": 2,
                "lastTransitionTime": "2024-01-01T00:00:00Z"
            }]}
        }))
        .unwrap();
        let stored = stored(
            &route.metadata,
            RawResource::Route(VersionedRoute::V2(route.spec.clone())),
            route.status.clone(),
        );
        assert_eq!(stored.generation, 2);
        assert_eq!(stored.status.conditions.len(), 1);
        assert_eq!(stored.status.conditions[0].observed_generation, Some(2));
    }
}
