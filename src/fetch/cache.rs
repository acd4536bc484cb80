use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use storekit_reactive::SignalWith;
use tracing::debug;

use super::{FetchHandle, FetchOptions, FetchRequest, FetchSource, UsageError};
use crate::path::PathMode;

/// Fetch instances keyed by id.
///
/// Asking for an id that is already cached returns the same instance, with
/// the new options layered over the stored ones. Options without an id get
/// a fresh instance every time. Clones share the same map.
#[derive(Clone, Default)]
pub struct FetchCache {
    instances: Rc<RefCell<FxHashMap<String, FetchHandle>>>,
}

impl std::fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let instances = self.instances.borrow();
        f.debug_struct("FetchCache")
            .field("ids", &instances.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or creates the instance for `options.id` and starts a primary
    /// fetch on the local task set.
    ///
    /// When a cache window is configured, the instance has no data yet and
    /// the cache collection already holds at least `limit` items, a detached
    /// fulfilled handle with the last `limit` items is returned instead and
    /// nothing is fetched.
    pub fn fetch(
        &self,
        source: FetchSource,
        options: FetchOptions,
    ) -> Result<FetchHandle, UsageError> {
        options.resolve()?;

        let handle = match options.id.clone() {
            Some(id) => {
                let cached = self.instances.borrow().get(&id).cloned();
                match cached {
                    Some(handle) => {
                        debug!(id = %id, "reusing cached fetch");
                        handle.merge_options(&options);
                        handle
                    }
                    None => {
                        let handle = FetchHandle::new(options);
                        self.instances.borrow_mut().insert(id, handle.clone());
                        handle
                    }
                }
            }
            None => FetchHandle::new(options),
        };

        if let Some(snapshot) = snapshot(&handle)? {
            return Ok(snapshot);
        }

        let fetch = handle.fetch(FetchRequest::Primary, source, &FetchOptions::default())?;
        tokio::task::spawn_local(fetch);
        Ok(handle)
    }

    pub fn get(&self, id: &str) -> Option<FetchHandle> {
        self.instances.borrow().get(id).cloned()
    }

    /// Forgets the instance for `id`. Handles already given out stay usable.
    pub fn clear(&self, id: &str) -> Option<FetchHandle> {
        self.instances.borrow_mut().remove(id)
    }

    pub fn clear_all(&self) {
        let removed: Vec<_> = self.instances.borrow_mut().drain().collect();
        drop(removed);
    }

    pub fn len(&self) -> usize {
        self.instances.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.borrow().is_empty()
    }
}

fn snapshot(handle: &FetchHandle) -> Result<Option<FetchHandle>, UsageError> {
    let options = handle.options();
    let resolved = options.resolve()?;
    let (Some(limit), Some(cache)) = (resolved.limit, &resolved.cache) else {
        return Ok(None);
    };
    let has_data = handle
        .0
        .data
        .with_untracked(|data| data.as_ref().is_some_and(|v| !v.is_null()));
    if has_data {
        return Ok(None);
    }
    let items = cache.with_untracked(|cached| {
        (limit > 0 && cached.len() >= limit).then(|| cached[cached.len() - limit..].to_vec())
    });
    let Some(items) = items else {
        return Ok(None);
    };

    let data = match &resolved.path {
        Some(path) => {
            let mut data = Value::Object(Map::new());
            path.set(&mut data, Value::Array(items), PathMode::Vivify)?;
            data
        }
        None => Value::Array(items),
    };
    debug!(id = ?resolved.id, limit, "serving cached snapshot");
    Ok(Some(FetchHandle::snapshot(options, data)))
}
