//! Registry of what has been pushed to the data-plane for each resource

use crate::adapter::UpstreamPolicy;
use crate::resource::ResourceKey;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tracing::debug;

/// SyncRegistry remembers applied objects per resource and the upstream
/// policies declared per Service
pub struct SyncRegistry {
    inner: Arc<RwLock<RegistryState>>,
    upstream_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

#[derive(Default)]
struct RegistryState {
    synced: HashMap<ResourceKey, SyncedObjects>,
    // Keyed by "namespace/service"
    policies: HashMap<String, UpstreamPolicy>,
}

/// Data-plane objects applied on behalf of one resource
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncedObjects {
    pub routes: BTreeSet<String>,
    pub upstreams: BTreeMap<String, UpstreamTarget>,
}

/// The Service port an upstream object points at
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpstreamTarget {
    pub namespace: String,
    pub service: String,
    pub port: u16,
}

fn service_id(namespace: &str, service: &str) -> String {
    format!("{}/{}", namespace, service)
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryState::default())),
            upstream_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the given upstream ids for data-plane writes.
    ///
    /// An upstream is only pushed or garbage collected while its lock is
    /// held. Ids are locked in sorted order.
    pub async fn lock_upstreams<I, S>(&self, ids: I) -> Vec<OwnedMutexGuard<()>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: BTreeSet<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let lock = {
                let mut locks = self.upstream_locks.lock();
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                locks.entry(id).or_default().clone()
            };
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    /// Record the objects now applied for a resource
    pub async fn record(&self, key: &ResourceKey, objects: SyncedObjects) {
        let mut state = self.inner.write().await;
        debug!(
            "Recorded {} routes and {} upstreams for {}",
            objects.routes.len(),
            objects.upstreams.len(),
            key
        );
        state.synced.insert(key.clone(), objects);
    }

    pub async fn synced(&self, key: &ResourceKey) -> Option<SyncedObjects> {
        let state = self.inner.read().await;
        state.synced.get(key).cloned()
    }

    /// Drop and return the objects recorded for a resource
    pub async fn forget(&self, key: &ResourceKey) -> Option<SyncedObjects> {
        let mut state = self.inner.write().await;
        let removed = state.synced.remove(key);
        debug!("Forgot synced objects for {}", key);
        removed
    }

    /// Whether any resource other than `except` still references the upstream
    pub async fn upstream_in_use(&self, id: &str, except: &ResourceKey) -> bool {
        let state = self.inner.read().await;
        state
            .synced
            .iter()
            .any(|(key, objects)| key != except && objects.upstreams.contains_key(id))
    }

    /// Whether any resource references the upstream
    pub async fn upstream_referenced(&self, id: &str) -> bool {
        let state = self.inner.read().await;
        state
            .synced
            .values()
            .any(|objects| objects.upstreams.contains_key(id))
    }

    /// Upstream objects currently referenced for a Service, by id
    pub async fn targets_for_service(
        &self,
        namespace: &str,
        service: &str,
    ) -> BTreeMap<String, UpstreamTarget> {
        let state = self.inner.read().await;
        state
            .synced
            .values()
            .flat_map(|objects| objects.upstreams.iter())
            .filter(|(_, target)| target.namespace == namespace && target.service == service)
            .map(|(id, target)| (id.clone(), target.clone()))
            .collect()
    }

    pub async fn set_policy(&self, namespace: &str, service: &str, policy: UpstreamPolicy) {
        let mut state = self.inner.write().await;
        state.policies.insert(service_id(namespace, service), policy);
        debug!("Registered upstream policy for {}/{}", namespace, service);
    }

    pub async fn remove_policy(&self, namespace: &str, service: &str) -> Option<UpstreamPolicy> {
        let mut state = self.inner.write().await;
        state.policies.remove(&service_id(namespace, service))
    }

    pub async fn policy(&self, namespace: &str, service: &str) -> Option<UpstreamPolicy> {
        let state = self.inner.read().await;
        state.policies.get(&service_id(namespace, service)).cloned()
    }

    /// Number of resources with recorded objects
    #[cfg(test)]
    pub async fn resource_count(&self) -> usize {
        let state = self.inner.read().await;
        state.synced.len()
    }
}

impl Default for SyncRegistry {
    fn default() -> Self {
        Self::new()
    }
}
