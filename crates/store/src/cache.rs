//! Read-through cache backed by a `kube_runtime` reflector. Reconcilers
//! never call the Kubernetes API to read an object they're watching;
//! they go through the matching `ObjectCache` instead, which is kept
//! current by a background watch task (C2).

use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::StoreError;

/// Handle to one kind's watched cache plus the background task driving it.
/// Dropping this stops the watch.
pub struct ObjectCache<K>
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
    K::DynamicType: Eq + std::hash::Hash + Clone + Default,
{
    store: Store<K>,
    _task: tokio::task::JoinHandle<()>,
}

impl<K> ObjectCache<K>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Eq + std::hash::Hash + Clone + Default,
{
    /// Starts a reflector over `api` and returns once the initial list has
    /// loaded, so callers can immediately index the store.
    pub async fn start(api: Api<K>, config: WatcherConfig) -> Self {
        let (reader, writer) = reflector::store();
        let stream = watcher::watcher(api, config)
            .default_backoff()
            .reflect(writer)
            .touched_objects();

        let task = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(event) = stream.next().await {
                if let Err(err) = event {
                    warn!(error = %err, "watch stream error, relying on kube-runtime backoff");
                }
            }
        });

        reader.wait_until_ready().await.ok();

        Self { store: reader, _task: task }
    }

    pub fn store(&self) -> &Store<K> {
        &self.store
    }

    pub fn state(&self) -> Vec<Arc<K>> {
        self.store.state()
    }
}

/// Finds the first cached object whose name matches, scanning all
/// namespaces this cache was configured for (a no-op scan for
/// cluster-scoped kinds, which only ever have one "namespace": none).
pub fn find_by_name<K>(cache: &ObjectCache<K>, name: &str) -> Option<Arc<K>>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Eq + std::hash::Hash + Clone + Default,
{
    cache.state().into_iter().find(|obj| obj.meta().name.as_deref() == Some(name))
}

/// Looks up an object by name, erroring instead of returning `Option`
/// for call sites where absence is unexpected.
pub fn get_or_not_found<K>(cache: &ObjectCache<K>, name: &str) -> Result<Arc<K>, StoreError>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Eq + std::hash::Hash + Clone + Default,
{
    find_by_name(cache, name).ok_or_else(|| StoreError::NotFound(name.to_string()))
}
