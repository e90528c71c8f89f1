//! In-memory `KvStore` backend.
//!
//! All four collections live in one map guarded by a single mutex, so a
//! committed `WriteBatch` is atomic with respect to every reader. Used by
//! tests and by hosts that want a purely ephemeral vault.

use async_trait::async_trait;
use bytes::Bytes;
use hashfs_core::store::{
    BatchOp, Collection, KvStore, OpenedStore, StoreOpener, StoreResult, WriteBatch,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(Collection, String), Bytes>>,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Bytes>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&(collection, key.to_string())).cloned())
    }

    async fn put(&self, collection: Collection, key: &str, value: Bytes) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert((collection, key.to_string()), value);
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&(collection, key.to_string()));
        Ok(())
    }

    async fn list_keys(&self, collection: Collection) -> StoreResult<Vec<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .keys()
            .filter(|(c, _)| *c == collection)
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        // One lock acquisition for the whole batch keeps it atomic with
        // respect to every other accessor.
        let mut entries = self.entries.lock().unwrap();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put {
                    collection,
                    key,
                    value,
                } => {
                    entries.insert((collection, key), value);
                }
                BatchOp::Delete { collection, key } => {
                    entries.remove(&(collection, key));
                }
            }
        }
        Ok(())
    }

    async fn wipe(&self) -> StoreResult<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}

/// Opens one shared `MemoryStore` per namespace, so unlocking the same
/// vault twice within a process observes the same data.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    namespaces: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreOpener for MemoryOpener {
    async fn open(&self, namespace: &str) -> StoreResult<OpenedStore> {
        let mut namespaces = self.namespaces.lock().unwrap();
        let store = namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new()))
            .clone();
        Ok(OpenedStore {
            store,
            recovered: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashfs_core::testutil::StoreSuite;

    #[tokio::test]
    async fn contract() {
        let store = MemoryStore::new();
        StoreSuite::new(&store).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn opener_reuses_namespace() {
        let opener = MemoryOpener::new();
        let first = opener.open("ns-a").await.unwrap();
        first
            .store
            .put(Collection::Files, "k", Bytes::from_static(b"v"))
            .await
            .unwrap();

        let second = opener.open("ns-a").await.unwrap();
        assert!(second.store.get(Collection::Files, "k").await.unwrap().is_some());

        let other = opener.open("ns-b").await.unwrap();
        assert!(other.store.get(Collection::Files, "k").await.unwrap().is_none());
    }
}
