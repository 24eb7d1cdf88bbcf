use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use duel_core::error::Error;
use duel_core::Result;

use crate::trait_::{PersistenceT, QueryRow};

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn get_in<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut cur = root;
    for seg in segments {
        cur = cur.as_object()?.get(*seg)?;
    }
    Some(cur)
}

/// Walks to the object at `segments`, creating empty objects along the way.
fn get_or_create_mut<'a>(root: &'a mut Value, segments: &[&str]) -> &'a mut Value {
    let mut cur = root;
    for seg in segments {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        cur = cur
            .as_object_mut()
            .unwrap()
            .entry(seg.to_string())
            .or_insert(Value::Object(Map::new()));
    }
    cur
}

fn remove_in(root: &mut Value, segments: &[&str]) {
    if segments.is_empty() {
        *root = Value::Object(Map::new());
        return;
    }
    let (last, parents) = segments.split_last().unwrap();
    let mut cur = root;
    for seg in parents {
        match cur.as_object_mut().and_then(|m| m.get_mut(*seg)) {
            Some(next) => cur = next,
            None => return,
        }
    }
    if let Some(obj) = cur.as_object_mut() {
        obj.remove(*last);
    }
}

/// An in-process, single-node persistence backend, preferred for the
/// dev/test environment over a networked store, generalised here to a
/// path-addressed JSON tree instead of a fixed SQL schema, per §4.3.
pub struct InMemoryStore {
    root: RwLock<Value>,
    push_seq: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
            push_seq: AtomicU64::new(0),
        }
    }

    /// Firebase-style push ids are time-sortable; we don't have a
    /// wall-clock source injected here, so we fall back to a
    /// zero-padded monotonic counter, which sorts identically.
    fn next_push_id(&self) -> String {
        let n = self.push_seq.fetch_add(1, Ordering::SeqCst);
        format!("-{n:020}")
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceT for InMemoryStore {
    async fn push(&self, parent_path: &str, value: Value) -> Result<String> {
        let id = self.next_push_id();
        let mut child_segments = split(parent_path);
        child_segments.push(id.as_str());
        let mut root = self.root.write().await;
        *get_or_create_mut(&mut root, &child_segments) = value;
        Ok(id)
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let segments = split(path);
        let root = self.root.read().await;
        Ok(get_in(&root, &segments).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        let segments = split(path);
        let mut root = self.root.write().await;
        if segments.is_empty() {
            *root = value;
        } else {
            *get_or_create_mut(&mut root, &segments) = value;
        }
        Ok(())
    }

    async fn update(&self, path: &str, partial: Value) -> Result<()> {
        let Value::Object(updates) = partial else {
            return Err(Error::Validation("update() requires a JSON object".into()));
        };
        let segments = split(path);
        let mut root = self.root.write().await;
        let target = get_or_create_mut(&mut root, &segments);
        if !target.is_object() {
            *target = Value::Object(Map::new());
        }
        let obj = target.as_object_mut().unwrap();
        for (k, v) in updates {
            obj.insert(k, v);
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let segments = split(path);
        let mut root = self.root.write().await;
        remove_in(&mut root, &segments);
        Ok(())
    }

    async fn query(&self, path: &str, order_by_child: &str, equal_to: &Value) -> Result<Vec<QueryRow>> {
        let segments = split(path);
        let root = self.root.read().await;
        let Some(node) = get_in(&root, &segments) else {
            return Ok(Vec::new());
        };
        let Some(obj) = node.as_object() else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<QueryRow> = obj
            .iter()
            .filter(|(_, v)| v.get(order_by_child) == Some(equal_to))
            .map(|(k, v)| QueryRow {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryStore::new();
        store.set("users/0xabc", json!({"gamerTag": "foo"})).await.unwrap();
        let got = store.get("users/0xabc").await.unwrap().unwrap();
        assert_eq!(got["gamerTag"], "foo");
    }

    #[tokio::test]
    async fn update_merges_shallowly() {
        let store = InMemoryStore::new();
        store
            .set("users/0xabc", json!({"gamerTag": "foo", "elo": 1000}))
            .await
            .unwrap();
        store.update("users/0xabc", json!({"elo": 1200})).await.unwrap();
        let got = store.get("users/0xabc").await.unwrap().unwrap();
        assert_eq!(got["gamerTag"], "foo");
        assert_eq!(got["elo"], 1200);
    }

    #[tokio::test]
    async fn push_generates_distinct_monotonic_ids() {
        let store = InMemoryStore::new();
        let id1 = store.push("matches", json!({"status": "active"})).await.unwrap();
        let id2 = store.push("matches", json!({"status": "active"})).await.unwrap();
        assert_ne!(id1, id2);
        assert!(id1 < id2);
    }

    #[tokio::test]
    async fn remove_deletes_the_subtree() {
        let store = InMemoryStore::new();
        store.set("users/0xabc", json!({"gamerTag": "foo"})).await.unwrap();
        store.remove("users/0xabc").await.unwrap();
        assert!(store.get("users/0xabc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_filters_children_by_field_equality() {
        let store = InMemoryStore::new();
        store.set("queues/a", json!({"bet": 1000, "player": "p1"})).await.unwrap();
        store.set("queues/b", json!({"bet": 2000, "player": "p2"})).await.unwrap();
        store.set("queues/c", json!({"bet": 1000, "player": "p3"})).await.unwrap();

        let rows = store.query("queues", "bet", &json!(1000)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "a");
        assert_eq!(rows[1].key, "c");
    }
}
