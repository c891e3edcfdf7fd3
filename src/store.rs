//!
//! Powtoon record store
//! --------------------
//! Persists Powtoon records keyed by id under a configured root folder as a
//! single `powtoons.json` table, or fully in memory for tests. Ids are
//! assigned sequentially by the store and never reused within a root.
//!
//! The public API centers around the `Store` type, which is wrapped in a
//! thread-safe `SharedStore` (`Arc<Mutex<Store>>`) by the service and server
//! layers. Every operation is a single read-modify-write under the store
//! lock; in particular `add_shared_users` performs its union atomically so
//! concurrent share requests cannot lose additions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, io};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::identity::UserId;
use crate::policy::ListScope;

const TABLE_FILE: &str = "powtoons.json";

/// A single Powtoon record.
///
/// `owner` is fixed at insertion. `shared_with` keeps insertion order and
/// never holds duplicates; the owner may appear in it but that has no effect
/// on visibility since the owner already has full access.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Powtoon {
    pub id: i64,
    pub owner: UserId,
    pub name: String,
    #[serde(default = "empty_object")]
    pub content: Value,
    #[serde(default)]
    pub shared_with: Vec<UserId>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Partial update payload: only fields present are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PowtoonPatch {
    pub name: Option<String>,
    pub content: Option<Value>,
}

/// Store contract consumed by the service layer. Filtering is expressed
/// through [`ListScope`] so the policy stays store-agnostic.
pub trait RecordStore: Send + Sync {
    fn insert(&self, owner: &str, name: &str, content: Option<Value>) -> Result<Powtoon>;
    fn find_by_id(&self, id: i64) -> Result<Option<Powtoon>>;
    fn query(&self, scope: &ListScope) -> Result<Vec<Powtoon>>;
    fn update(&self, id: i64, patch: &PowtoonPatch) -> Result<Powtoon>;
    /// Idempotent union into `shared_with`, preserving insertion order.
    fn add_shared_users(&self, id: i64, users: &[UserId]) -> Result<Powtoon>;
    fn delete(&self, id: i64) -> Result<()>;
}

/// Serialized table layout: records by id plus the id counter, so ids are
/// not reused after deletes across restarts.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Table {
    next_id: i64,
    records: BTreeMap<i64, Powtoon>,
}

/// Core storage handle. Operates under an optional root folder; when no root
/// is configured the table lives only in memory.
pub struct Store {
    root: Option<PathBuf>,
    table: Table,
}

impl Store {
    /// Create a Store rooted at the given filesystem path, loading any
    /// existing table. The directory is created if it does not exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create store root: {}", root.display()))?;
        let table = Self::load_table(&root)?;
        Ok(Self { root: Some(root), table })
    }

    /// Create a Store with no backing files.
    pub fn in_memory() -> Self {
        Self { root: None, table: Table { next_id: 1, ..Default::default() } }
    }

    fn load_table(root: &Path) -> Result<Table> {
        let path = root.join(TABLE_FILE);
        match fs::read(&path) {
            Ok(bytes) => {
                let table: Table = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt powtoon table: {}", path.display()))?;
                debug!(target: "powtoon::store", "loaded {} records from {}", table.records.len(), path.display());
                Ok(table)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok(Table { next_id: 1, ..Default::default() })
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(root) = &self.root else { return Ok(()) };
        let path = root.join(TABLE_FILE);
        let bytes = serde_json::to_vec_pretty(&self.table)?;
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn insert(&mut self, owner: &str, name: &str, content: Option<Value>) -> Result<Powtoon> {
        let id = self.table.next_id;
        self.table.next_id += 1;
        let rec = Powtoon {
            id,
            owner: owner.to_string(),
            name: name.to_string(),
            content: content.unwrap_or_else(empty_object),
            shared_with: Vec::new(),
        };
        self.table.records.insert(id, rec.clone());
        self.persist()?;
        debug!(target: "powtoon::store", "insert: id={} owner='{}'", id, owner);
        Ok(rec)
    }

    fn update(&mut self, id: i64, patch: &PowtoonPatch) -> Result<Powtoon> {
        let rec = self
            .table
            .records
            .get_mut(&id)
            .with_context(|| format!("update: no record with id {}", id))?;
        if let Some(name) = &patch.name {
            rec.name = name.clone();
        }
        if let Some(content) = &patch.content {
            rec.content = content.clone();
        }
        let out = rec.clone();
        self.persist()?;
        Ok(out)
    }

    fn add_shared_users(&mut self, id: i64, users: &[UserId]) -> Result<Powtoon> {
        let rec = self
            .table
            .records
            .get_mut(&id)
            .with_context(|| format!("add_shared_users: no record with id {}", id))?;
        for user in users {
            if !rec.shared_with.iter().any(|u| u == user) {
                rec.shared_with.push(user.clone());
            }
        }
        let out = rec.clone();
        self.persist()?;
        Ok(out)
    }

    fn delete(&mut self, id: i64) -> Result<()> {
        self.table
            .records
            .remove(&id)
            .with_context(|| format!("delete: no record with id {}", id))?;
        self.persist()?;
        debug!(target: "powtoon::store", "delete: id={}", id);
        Ok(())
    }
}

/// Thread-safe shared handle over [`Store`].
#[derive(Clone)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Store::new(root)?))))
    }

    pub fn in_memory() -> Self {
        Self(Arc::new(Mutex::new(Store::in_memory())))
    }
}

impl RecordStore for SharedStore {
    fn insert(&self, owner: &str, name: &str, content: Option<Value>) -> Result<Powtoon> {
        self.0.lock().insert(owner, name, content)
    }

    fn find_by_id(&self, id: i64) -> Result<Option<Powtoon>> {
        Ok(self.0.lock().table.records.get(&id).cloned())
    }

    fn query(&self, scope: &ListScope) -> Result<Vec<Powtoon>> {
        let guard = self.0.lock();
        Ok(guard
            .table
            .records
            .values()
            .filter(|r| scope.admits(r))
            .cloned()
            .collect())
    }

    fn update(&self, id: i64, patch: &PowtoonPatch) -> Result<Powtoon> {
        self.0.lock().update(id, patch)
    }

    fn add_shared_users(&self, id: i64, users: &[UserId]) -> Result<Powtoon> {
        self.0.lock().add_shared_users(id, users)
    }

    fn delete(&self, id: i64) -> Result<()> {
        self.0.lock().delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_assigns_sequential_ids_and_default_content() {
        let store = SharedStore::in_memory();
        let a = store.insert("alice", "first", None).unwrap();
        let b = store.insert("alice", "second", Some(json!({"k": 1}))).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.content, json!({}));
        assert_eq!(b.content, json!({"k": 1}));
        assert!(a.shared_with.is_empty());
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let store = SharedStore::in_memory();
        let a = store.insert("alice", "a", None).unwrap();
        store.delete(a.id).unwrap();
        let b = store.insert("alice", "b", None).unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.find_by_id(a.id).unwrap(), None);
    }

    #[test]
    fn query_filters_by_scope() {
        let store = SharedStore::in_memory();
        let mine = store.insert("alice", "mine", None).unwrap();
        let shared = store.insert("bob", "shared", None).unwrap();
        store.add_shared_users(shared.id, &["alice".to_string()]).unwrap();
        store.insert("bob", "private", None).unwrap();

        let visible = store
            .query(&ListScope::OwnedOrSharedWith("alice".into()))
            .unwrap();
        let mut ids: Vec<i64> = visible.iter().map(|r| r.id).collect();
        ids.sort();
        assert_eq!(ids, vec![mine.id, shared.id]);

        assert_eq!(store.query(&ListScope::All).unwrap().len(), 3);
    }

    #[test]
    fn partial_update_leaves_missing_fields_alone() {
        let store = SharedStore::in_memory();
        let rec = store.insert("alice", "old", Some(json!({"v": 1}))).unwrap();

        let renamed = store
            .update(rec.id, &PowtoonPatch { name: Some("new".into()), content: None })
            .unwrap();
        assert_eq!(renamed.name, "new");
        assert_eq!(renamed.content, json!({"v": 1}));

        let refilled = store
            .update(rec.id, &PowtoonPatch { name: None, content: Some(json!({"v": 2})) })
            .unwrap();
        assert_eq!(refilled.name, "new");
        assert_eq!(refilled.content, json!({"v": 2}));
    }

    #[test]
    fn shared_union_is_idempotent_and_ordered() {
        let store = SharedStore::in_memory();
        let rec = store.insert("alice", "r", None).unwrap();
        store
            .add_shared_users(rec.id, &["bob".to_string(), "carol".to_string()])
            .unwrap();
        let after = store
            .add_shared_users(rec.id, &["bob".to_string(), "dave".to_string()])
            .unwrap();
        assert_eq!(after.shared_with, vec!["bob", "carol", "dave"]);
    }

    #[test]
    fn persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = SharedStore::new(tmp.path()).unwrap();
            let rec = store.insert("alice", "kept", Some(json!({"x": true}))).unwrap();
            store.add_shared_users(rec.id, &["bob".to_string()]).unwrap();
        }
        let reopened = SharedStore::new(tmp.path()).unwrap();
        let rec = reopened.find_by_id(1).unwrap().expect("record survives reopen");
        assert_eq!(rec.name, "kept");
        assert_eq!(rec.content, json!({"x": true}));
        assert_eq!(rec.shared_with, vec!["bob"]);
        // counter also survives
        let next = reopened.insert("alice", "next", None).unwrap();
        assert_eq!(next.id, 2);
    }
}
