use async_trait::async_trait;
use serde_json::Value;

use duel_core::Result;

/// A single child returned by [`PersistenceT::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub key: String,
    pub value: Value,
}

/// Generic, path-addressed persistence collaborator (§4.3).
///
/// Paths are `/`-separated, e.g. `"users/0xabc"` or
/// `"matches/m1/positions/p1"`. There is no schema: every typed repository
/// in this crate is a thin layer translating domain structs to and from
/// JSON at a fixed path prefix.
///
/// Atomic multi-path update is not assumed — every caller composing more
/// than one of these calls into a logical transaction must make that
/// sequence idempotent and restart-safe (§4.3), typically by keying the
/// second write off something the first write already recorded.
#[async_trait]
pub trait PersistenceT: Send + Sync {
    /// Generates a chronologically-monotonic unique id as a new child of
    /// `parent_path`, and writes `value` there. Returns the generated id.
    async fn push(&self, parent_path: &str, value: Value) -> Result<String>;

    /// Reads the value at `path`, or `None` if nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Overwrites the value at `path` entirely.
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Shallow-merges the keys of `partial` (which must be a JSON object)
    /// into the object at `path`, creating it if absent.
    async fn update(&self, path: &str, partial: Value) -> Result<()>;

    /// Deletes the subtree rooted at `path`. A no-op if nothing is there.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Scans the direct children of `path` and returns every child whose
    /// `order_by_child` field equals `equal_to`.
    async fn query(&self, path: &str, order_by_child: &str, equal_to: &Value) -> Result<Vec<QueryRow>>;
}
