//! In-memory fakes for the store and data-plane seams

use crate::dataplane::{DataPlane, RouteObject, UpstreamObject};
use crate::error::{CoreError, Result};
use crate::resource::{RawResource, ResourceKey, ResourceStatus, StoredResource};
use crate::store::{ResourceStore, StatusWrite};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct DataPlaneState {
    routes: BTreeMap<String, RouteObject>,
    upstreams: BTreeMap<String, UpstreamObject>,
    calls: usize,
    failures: usize,
    failure_message: String,
}

/// Data-plane that keeps applied objects in maps
#[derive(Default)]
pub struct MemoryDataPlane {
    state: Mutex<DataPlaneState>,
}

pub type Snapshot = (BTreeMap<String, RouteObject>, BTreeMap<String, UpstreamObject>);

impl MemoryDataPlane {
    /// Fail the next `count` calls with a transient error
    pub fn fail_next(&self, count: usize, message: &str) {
        let mut state = self.state.lock();
        state.failures = count;
        state.failure_message = message.to_string();
    }

    pub fn routes(&self) -> BTreeMap<String, RouteObject> {
        self.state.lock().routes.clone()
    }

    pub fn upstreams(&self) -> BTreeMap<String, UpstreamObject> {
        self.state.lock().upstreams.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        (state.routes.clone(), state.upstreams.clone())
    }

    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    fn call(&self) -> Result<parking_lot::MutexGuard<'_, DataPlaneState>> {
        let mut state = self.state.lock();
        state.calls += 1;
        if state.failures > 0 {
            state.failures -= 1;
            return Err(CoreError::sync(state.failure_message.clone()));
        }
        Ok(state)
    }
}

#[async_trait]
impl DataPlane for MemoryDataPlane {
    async fn apply_route(&self, route: &RouteObject) -> Result<()> {
        self.call()?.routes.insert(route.id.clone(), route.clone());
        Ok(())
    }

    async fn apply_upstream(&self, upstream: &UpstreamObject) -> Result<()> {
        self.call()?
            .upstreams
            .insert(upstream.id.clone(), upstream.clone());
        Ok(())
    }

    async fn delete_route(&self, id: &str) -> Result<()> {
        self.call()?.routes.remove(id);
        Ok(())
    }

    async fn delete_upstream(&self, id: &str) -> Result<()> {
        self.call()?.upstreams.remove(id);
        Ok(())
    }
}

#[derive(Default)]
struct StoreState {
    resources: HashMap<ResourceKey, StoredResource>,
    revision: u64,
    conflicts: usize,
    edit_before_write: Option<RawResource>,
    writes: usize,
}

impl StoreState {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

/// Resource store with API-server-like generation and resourceVersion handling
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// Create or replace a resource's spec, bumping its generation
    pub fn apply(&self, key: &ResourceKey, object: RawResource) -> i64 {
        let mut state = self.state.lock();
        let resource_version = state.next_revision();
        match state.resources.get_mut(key) {
            Some(existing) => {
                existing.generation += 1;
                existing.resource_version = resource_version;
                existing.object = object;
                existing.generation
            }
            None => {
                state.resources.insert(
                    key.clone(),
                    StoredResource {
                        generation: 1,
                        resource_version,
                        object,
                        status: ResourceStatus::default(),
                    },
                );
                1
            }
        }
    }

    pub fn delete(&self, key: &ResourceKey) {
        self.state.lock().resources.remove(key);
    }

    pub fn status(&self, key: &ResourceKey) -> Option<ResourceStatus> {
        self.state.lock().resources.get(key).map(|r| r.status.clone())
    }

    /// Make the next `count` status writes lose to a concurrent writer
    pub fn inject_conflicts(&self, count: usize) {
        self.state.lock().conflicts = count;
    }

    /// Apply a spec edit right before the next status write lands
    pub fn edit_before_next_write(&self, object: RawResource) {
        self.state.lock().edit_before_write = Some(object);
    }

    /// Number of status writes that were accepted
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<StoredResource>> {
        Ok(self.state.lock().resources.get(key).cloned())
    }

    async fn update_status(
        &self,
        key: &ResourceKey,
        resource_version: &str,
        status: &ResourceStatus,
    ) -> Result<StatusWrite> {
        let edit = self.state.lock().edit_before_write.take();
        if let Some(object) = edit {
            self.apply(key, object);
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.conflicts > 0 {
            state.conflicts -= 1;
            let revision = state.next_revision();
            if let Some(existing) = state.resources.get_mut(key) {
                existing.resource_version = revision;
            }
            return Ok(StatusWrite::Conflict);
        }

        let revision = state.next_revision();
        let Some(existing) = state.resources.get_mut(key) else {
            return Err(CoreError::sync(format!("{} not found", key)));
        };
        if existing.resource_version != resource_version {
            return Ok(StatusWrite::Conflict);
        }
        existing.status = status.clone();
        existing.resource_version = revision;
        state.writes += 1;
        Ok(StatusWrite::Updated)
    }
}
