use serde_json::Value;
use storekit_reactive::{RwSignal, SignalUpdate, SignalWith};

use crate::path::{DataPath, PathError, PathMode};

/// Updates a nested field of one item in a keyed collection.
///
/// The collection is either an array of records, searched linearly for the
/// record whose `id_key` equals the id, or an object whose keys are ids.
/// Each call mutates the collection inside a single signal update, so
/// observers are notified once.
///
/// ```rust
/// use serde_json::json;
/// use storekit::NestedUpdater;
/// use storekit_reactive::{RwSignal, SignalGet};
///
/// let posts = RwSignal::new(json!([{ "id": 1, "stats": { "likes": 0 } }]));
/// let updater = NestedUpdater::new(posts);
/// updater.set(&json!(1), "stats.likes", json!(5)).unwrap();
/// assert_eq!(posts.get_untracked()[0]["stats"]["likes"], 5);
/// ```
#[derive(Debug, Clone)]
pub struct NestedUpdater {
    collection: RwSignal<Value>,
    id_key: String,
    mode: PathMode,
}

impl NestedUpdater {
    pub fn new(collection: RwSignal<Value>) -> Self {
        Self {
            collection,
            id_key: "id".to_string(),
            mode: PathMode::default(),
        }
    }

    /// Field compared against the id when the collection is an array.
    pub fn id_key(mut self, key: impl Into<String>) -> Self {
        self.id_key = key.into();
        self
    }

    pub fn mode(mut self, mode: PathMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the value at `path` inside the item identified by `id`.
    ///
    /// Returns `Ok(false)` when no item matches; nothing is touched then.
    pub fn set(&self, id: &Value, path: &str, value: Value) -> Result<bool, PathError> {
        self.update_with(id, path, move |_| value)
    }

    /// Replace the value at `path` with `f(previous)`.
    pub fn update_with(
        &self,
        id: &Value,
        path: &str,
        f: impl FnOnce(Option<&Value>) -> Value,
    ) -> Result<bool, PathError> {
        let path = DataPath::parse(path)?;
        let mode = self.mode;
        let id_key = &self.id_key;

        let found = self.collection.try_with_untracked(|collection| {
            collection.is_some_and(|collection| contains_item(collection, id_key, id))
        });
        if !found {
            return Ok(false);
        }

        self.collection
            .try_update(|collection| {
                let Some(item) = find_item(collection, id_key, id) else {
                    return Ok(false);
                };
                path.update(item, mode, f)?;
                Ok(true)
            })
            .unwrap_or(Ok(false))
    }
}

fn find_item<'a>(collection: &'a mut Value, id_key: &str, id: &Value) -> Option<&'a mut Value> {
    match collection {
        Value::Array(items) => items
            .iter_mut()
            .find(|item| item.get(id_key).is_some_and(|value| ids_match(value, id))),
        Value::Object(map) => map.get_mut(&map_key(id)),
        _ => None,
    }
}

fn contains_item(collection: &Value, id_key: &str, id: &Value) -> bool {
    match collection {
        Value::Array(items) => items
            .iter()
            .any(|item| item.get(id_key).is_some_and(|value| ids_match(value, id))),
        Value::Object(map) => map.contains_key(&map_key(id)),
        _ => false,
    }
}

fn map_key(id: &Value) -> String {
    match id {
        Value::String(key) => key.clone(),
        other => other.to_string(),
    }
}

// Ids arrive from both numbers and strings; `1` and `"1"` name the same item.
fn ids_match(value: &Value, id: &Value) -> bool {
    match (value, id) {
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            *a == b.to_string()
        }
        _ => value == id,
    }
}
