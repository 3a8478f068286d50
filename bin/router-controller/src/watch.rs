//! Watchers feeding resource events into the controller's work queue

use futures::StreamExt;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use router_core::{Controller, ResourceKey, ResourceKind};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity of a watched object
pub fn key_of<K: Resource>(kind: ResourceKind, obj: &K) -> ResourceKey {
    ResourceKey::new(kind, obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Watch `api` and enqueue every accepted object until the stream ends.
///
/// `accept` decides whether an applied object is relevant; rejected objects
/// the controller already tracks are still enqueued so their data-plane
/// state gets removed.
pub async fn watch<K, F>(api: Api<K>, kind: ResourceKind, controller: Arc<Controller>, accept: F)
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
    F: Fn(&K) -> bool + Send,
{
    info!("Watching {} resources", kind);
    let mut stream = watcher::watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    while let Some(event) = stream.next().await {
        match event {
            Ok(Event::Apply(obj)) | Ok(Event::InitApply(obj)) => {
                let key = key_of(kind, &obj);
                if accept(&obj) || controller.phase(&key).is_some() {
                    debug!("Event for {}", key);
                    controller.enqueue(key);
                }
            }
            Ok(Event::Delete(obj)) => {
                let key = key_of(kind, &obj);
                debug!("Deleted {}", key);
                controller.enqueue_deleted(key);
            }
            Ok(Event::Init) => debug!("{} watch (re)started", kind),
            Ok(Event::InitDone) => info!("{} watch initialized", kind),
            Err(e) => warn!("{} watch error: {}", kind, e),
        }
    }
    warn!("{} watch stream ended", kind);
}
