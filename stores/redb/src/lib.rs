//! RedbStore - a persistent `KvStore` backed by redb.
//!
//! Each vault namespace maps to one database file
//! (`<base_dir>/<namespace>.redb`) holding four tables, one per
//! collection. redb write transactions give the multi-key atomic commit
//! the vault's write pipeline depends on.

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use hashfs_core::store::{
    BatchOp, Collection, KvStore, OpenedStore, StoreOpener, StoreResult, WriteBatch,
};
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const FILES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const CHAINS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("chains");
const INTEGRITY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("integrity");

fn table_def(collection: Collection) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match collection {
        Collection::Files => FILES_TABLE,
        Collection::Meta => META_TABLE,
        Collection::Chains => CHAINS_TABLE,
        Collection::Integrity => INTEGRITY_TABLE,
    }
}

/// Ensure all collection tables exist before the first read.
///
/// `open_table` on a write transaction creates the table if it does not
/// already exist; without this, a fresh database errors on its first
/// read-only access.
fn ensure_tables(db: &Database) -> anyhow::Result<()> {
    let write_txn = db.begin_write()?;
    {
        for collection in Collection::ALL {
            let _ = write_txn.open_table(table_def(collection))?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

struct Inner {
    path: PathBuf,
    db: Mutex<Arc<Database>>,
}

#[derive(Clone)]
pub struct RedbStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.inner.path)
            .finish()
    }
}

impl RedbStore {
    /// Opens (or creates) the database for `namespace` under `base_dir`.
    pub fn open<P: AsRef<Path>>(base_dir: P, namespace: &str) -> anyhow::Result<Self> {
        let base_dir = base_dir.as_ref();
        std::fs::create_dir_all(base_dir)?;
        let path = base_dir.join(format!("{namespace}.redb"));
        let db = Database::create(&path)?;
        ensure_tables(&db)?;
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                db: Mutex::new(Arc::new(db)),
            }),
        })
    }

    /// Opens the database for `namespace`, dropping and recreating it if
    /// it cannot be opened. Returns whether a reset happened.
    pub fn open_or_reset<P: AsRef<Path>>(
        base_dir: P,
        namespace: &str,
    ) -> anyhow::Result<(Self, bool)> {
        let base_dir = base_dir.as_ref();
        match Self::open(base_dir, namespace) {
            Ok(store) => Ok((store, false)),
            Err(err) => {
                log::warn!("namespace {namespace} unopenable ({err}), rebuilding empty");
                let path = base_dir.join(format!("{namespace}.redb"));
                remove_if_present(&path)?;
                Ok((Self::open(base_dir, namespace)?, true))
            }
        }
    }

    fn db(&self) -> Arc<Database> {
        self.inner.db.lock().unwrap().clone()
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn apply_op(table: &mut Table<'_, &str, &[u8]>, op: BatchOp) -> anyhow::Result<()> {
    match op {
        BatchOp::Put { key, value, .. } => {
            table.insert(key.as_str(), value.as_ref())?;
        }
        BatchOp::Delete { key, .. } => {
            table.remove(key.as_str())?;
        }
    }
    Ok(())
}

#[async_trait]
impl KvStore for RedbStore {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Bytes>> {
        let db = self.db();
        let key = key.to_string();
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Bytes>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(table_def(collection))?;
            Ok(table
                .get(key.as_str())?
                .map(|guard| Bytes::copy_from_slice(guard.value())))
        })
        .await
        .map_err(|e| anyhow!("redb read task failed: {e}"))?;
        Ok(result?)
    }

    async fn put(&self, collection: Collection, key: &str, value: Bytes) -> StoreResult<()> {
        let db = self.db();
        let key = key.to_string();
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(table_def(collection))?;
                table.insert(key.as_str(), value.as_ref())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow!("redb write task failed: {e}"))?;
        Ok(result?)
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<()> {
        let db = self.db();
        let key = key.to_string();
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(table_def(collection))?;
                table.remove(key.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow!("redb delete task failed: {e}"))?;
        Ok(result?)
    }

    async fn list_keys(&self, collection: Collection) -> StoreResult<Vec<String>> {
        let db = self.db();
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<String>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(table_def(collection))?;
            let mut keys = Vec::new();
            for entry in table.iter()? {
                let (key, _value) = entry?;
                keys.push(key.value().to_string());
            }
            Ok(keys)
        })
        .await
        .map_err(|e| anyhow!("redb list task failed: {e}"))?;
        Ok(result?)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let db = self.db();
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let write_txn = db.begin_write()?;
            {
                // A table may only be opened once per transaction, so all
                // four are opened up front and ops dispatch to them.
                let mut files = write_txn.open_table(FILES_TABLE)?;
                let mut meta = write_txn.open_table(META_TABLE)?;
                let mut chains = write_txn.open_table(CHAINS_TABLE)?;
                let mut integrity = write_txn.open_table(INTEGRITY_TABLE)?;
                for op in batch.into_ops() {
                    let collection = match &op {
                        BatchOp::Put { collection, .. } => *collection,
                        BatchOp::Delete { collection, .. } => *collection,
                    };
                    let table = match collection {
                        Collection::Files => &mut files,
                        Collection::Meta => &mut meta,
                        Collection::Chains => &mut chains,
                        Collection::Integrity => &mut integrity,
                    };
                    apply_op(table, op)?;
                }
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow!("redb commit task failed: {e}"))?;
        Ok(result?)
    }

    async fn wipe(&self) -> StoreResult<()> {
        let inner = self.inner.clone();
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut guard = inner.db.lock().unwrap();
            remove_if_present(&inner.path)?;
            let db = Database::create(&inner.path)?;
            ensure_tables(&db)?;
            *guard = Arc::new(db);
            Ok(())
        })
        .await
        .map_err(|e| anyhow!("redb wipe task failed: {e}"))?;
        Ok(result?)
    }
}

/// Opens redb-backed namespaces under a fixed base directory.
#[derive(Debug, Clone)]
pub struct RedbOpener {
    base_dir: PathBuf,
}

impl RedbOpener {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl StoreOpener for RedbOpener {
    async fn open(&self, namespace: &str) -> StoreResult<OpenedStore> {
        let base_dir = self.base_dir.clone();
        let namespace = namespace.to_string();
        let result = tokio::task::spawn_blocking(move || {
            RedbStore::open_or_reset(&base_dir, &namespace)
        })
        .await
        .map_err(|e| anyhow!("redb open task failed: {e}"))?;
        let (store, recovered) = result?;
        Ok(OpenedStore {
            store: Arc::new(store),
            recovered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashfs_core::testutil::StoreSuite;

    #[tokio::test]
    async fn contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path(), "test-ns").unwrap();
        StoreSuite::new(&store).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn open_or_reset_recovers_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken-ns.redb");
        std::fs::write(&path, b"this is not a redb database").unwrap();

        let (store, recovered) = RedbStore::open_or_reset(dir.path(), "broken-ns").unwrap();
        assert!(recovered);
        assert!(store.list_keys(Collection::Files).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RedbStore::open(dir.path(), "persist").unwrap();
            store
                .put(Collection::Files, "k", Bytes::from_static(b"v"))
                .await
                .unwrap();
        }
        let store = RedbStore::open(dir.path(), "persist").unwrap();
        let got = store.get(Collection::Files, "k").await.unwrap();
        assert_eq!(got.as_deref(), Some(b"v".as_ref()));
    }
}
