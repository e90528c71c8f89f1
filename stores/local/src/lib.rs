//! LocalStore - a filesystem `KvStore`, one file per key.
//!
//! The filesystem has no multi-file transactions, so `commit` goes
//! through a write-ahead log: the whole batch is staged under a
//! reserved name, applied file by file, and the stage removed last.
//! Opening a namespace replays a complete stage (the batch committed)
//! or discards a torn one (the batch never happened); either way no
//! reader observes half a batch.
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/<namespace>/wal                     staged batch (transient)
//! <base>/<namespace>/<collection>/<key>      one file per value
//! ```

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use hashfs_core::store::{
    BatchOp, Collection, KvStore, OpenedStore, StoreError, StoreOpener, StoreResult, WriteBatch,
};
use minicbor::bytes::ByteVec;
use minicbor::{CborLen, Decode, Encode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reserved stage file name inside a namespace directory.
const WAL_NAME: &str = "wal";

/// Suffix of in-flight value writes, excluded from key listings.
const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalStoreConfig {
    pub base_path: String,
}

/// One staged mutation; `value: None` is a delete.
#[derive(Encode, Decode, CborLen, Debug)]
#[cbor(map)]
struct WalOp {
    #[n(0)]
    collection: String,
    #[n(1)]
    key: String,
    #[n(2)]
    value: Option<ByteVec>,
}

#[derive(Encode, Decode, CborLen, Debug)]
#[cbor(map)]
struct WalRecord {
    #[n(0)]
    ops: Vec<WalOp>,
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Opens (or creates) the namespace directory and settles any
    /// write-ahead log left behind by an interrupted commit.
    pub async fn open<P: AsRef<Path>>(base_dir: P, namespace: &str) -> anyhow::Result<Self> {
        let store = Self::create(LocalStoreConfig {
            base_path: base_dir.as_ref().join(namespace).to_string_lossy().into(),
        });
        for collection in Collection::ALL {
            tokio::fs::create_dir_all(store.collection_dir(collection)).await?;
        }
        store.settle_wal().await?;
        Ok(store)
    }

    pub fn create(config: LocalStoreConfig) -> Self {
        LocalStore {
            root: config.base_path.into(),
        }
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.name())
    }

    fn wal_path(&self) -> PathBuf {
        self.root.join(WAL_NAME)
    }

    fn resolve(&self, collection: Collection, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(StoreError::Unavailable(anyhow!(
                "invalid key '{key}': must be a plain file name"
            )));
        }
        Ok(self.collection_dir(collection).join(key))
    }

    /// Replays a complete staged batch, or discards a torn stage.
    async fn settle_wal(&self) -> anyhow::Result<()> {
        let wal_path = self.wal_path();
        let bytes = match tokio::fs::read(&wal_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        match minicbor::decode::<WalRecord>(&bytes) {
            Ok(record) => {
                log::warn!(
                    "replaying interrupted commit of {} ops in {}",
                    record.ops.len(),
                    self.root.display()
                );
                self.apply_ops(record.ops).await?;
            }
            // The stage itself was torn mid-write: the commit never
            // logically happened.
            Err(err) => log::warn!("discarding torn write-ahead log: {err}"),
        }
        tokio::fs::remove_file(&wal_path).await?;
        Ok(())
    }

    async fn apply_ops(&self, ops: Vec<WalOp>) -> anyhow::Result<()> {
        for op in ops {
            let collection = Collection::from_name(&op.collection)
                .with_context(|| format!("unknown collection '{}'", op.collection))?;
            let path = self
                .resolve(collection, &op.key)
                .map_err(|e| anyhow!(e.to_string()))?;
            match op.value {
                Some(value) => write_atomic(&path, &value).await?,
                None => remove_if_present(&path).await?,
            }
        }
        Ok(())
    }
}

/// Write via a sibling temp file plus rename, so a value file is always
/// either the old bytes or the new bytes.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp_name);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[async_trait]
impl KvStore for LocalStore {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Bytes>> {
        let path = self.resolve(collection, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes.into())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Unavailable(err.into())),
        }
    }

    async fn put(&self, collection: Collection, key: &str, value: Bytes) -> StoreResult<()> {
        let path = self.resolve(collection, key)?;
        write_atomic(&path, &value)
            .await
            .map_err(|err| StoreError::Unavailable(err.into()))
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<()> {
        let path = self.resolve(collection, key)?;
        remove_if_present(&path)
            .await
            .map_err(|err| StoreError::Unavailable(err.into()))
    }

    async fn list_keys(&self, collection: Collection) -> StoreResult<Vec<String>> {
        let mut dir = tokio::fs::read_dir(self.collection_dir(collection))
            .await
            .map_err(|err| StoreError::Unavailable(err.into()))?;
        let mut keys = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|err| StoreError::Unavailable(err.into()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            keys.push(name);
        }
        Ok(keys)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let ops: Vec<WalOp> = batch
            .into_ops()
            .into_iter()
            .map(|op| match op {
                BatchOp::Put {
                    collection,
                    key,
                    value,
                } => WalOp {
                    collection: collection.name().to_string(),
                    key,
                    value: Some(ByteVec::from(value.to_vec())),
                },
                BatchOp::Delete { collection, key } => WalOp {
                    collection: collection.name().to_string(),
                    key,
                    value: None,
                },
            })
            .collect();
        // Every key is validated before anything is staged.
        for op in &ops {
            let collection = Collection::from_name(&op.collection)
                .ok_or_else(|| StoreError::Unavailable(anyhow!("unknown collection")))?;
            self.resolve(collection, &op.key)?;
        }

        let record = WalRecord { ops };
        let encoded = minicbor::to_vec(&record)
            .map_err(|err| StoreError::Unavailable(anyhow!("wal encode failed: {err}")))?;

        // Stage first; the batch is durable once the rename lands.
        write_atomic(&self.wal_path(), &encoded)
            .await
            .map_err(|err| StoreError::Unavailable(err.into()))?;
        self.apply_ops(record.ops)
            .await
            .map_err(StoreError::Unavailable)?;
        tokio::fs::remove_file(self.wal_path())
            .await
            .map_err(|err| StoreError::Unavailable(err.into()))?;
        Ok(())
    }

    async fn wipe(&self) -> StoreResult<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                return Err(StoreError::Unavailable(err.into()));
            }
            _ => {}
        }
        for collection in Collection::ALL {
            tokio::fs::create_dir_all(self.collection_dir(collection))
                .await
                .map_err(|err| StoreError::Unavailable(err.into()))?;
        }
        Ok(())
    }
}

/// Opens filesystem-backed namespaces under a fixed base directory.
#[derive(Debug, Clone)]
pub struct LocalOpener {
    base_dir: PathBuf,
}

impl LocalOpener {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl StoreOpener for LocalOpener {
    async fn open(&self, namespace: &str) -> StoreResult<OpenedStore> {
        let store = LocalStore::open(&self.base_dir, namespace)
            .await
            .map_err(StoreError::Unavailable)?;
        Ok(OpenedStore {
            store: Arc::new(store),
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
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "test-ns").await.unwrap();
        StoreSuite::new(&store).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path(), "persist").await.unwrap();
            store
                .put(Collection::Files, "k", Bytes::from_static(b"v"))
                .await
                .unwrap();
        }
        let store = LocalStore::open(dir.path(), "persist").await.unwrap();
        let got = store.get(Collection::Files, "k").await.unwrap();
        assert_eq!(got.as_deref(), Some(b"v".as_ref()));
    }

    #[tokio::test]
    async fn complete_wal_is_replayed_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let ns_root = dir.path().join("ns");
        {
            let store = LocalStore::open(dir.path(), "ns").await.unwrap();
            store
                .put(Collection::Files, "stale", Bytes::from_static(b"old"))
                .await
                .unwrap();
        }

        // Simulate a crash after the stage landed but before it was
        // applied: write the wal by hand.
        let record = WalRecord {
            ops: vec![
                WalOp {
                    collection: "files".into(),
                    key: "fresh".into(),
                    value: Some(ByteVec::from(b"new".to_vec())),
                },
                WalOp {
                    collection: "files".into(),
                    key: "stale".into(),
                    value: None,
                },
            ],
        };
        std::fs::write(ns_root.join(WAL_NAME), minicbor::to_vec(&record).unwrap()).unwrap();

        let store = LocalStore::open(dir.path(), "ns").await.unwrap();
        let got = store.get(Collection::Files, "fresh").await.unwrap();
        assert_eq!(got.as_deref(), Some(b"new".as_ref()));
        assert!(store.get(Collection::Files, "stale").await.unwrap().is_none());
        assert!(!ns_root.join(WAL_NAME).exists(), "settled wal is removed");
    }

    #[tokio::test]
    async fn torn_wal_is_discarded_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let ns_root = dir.path().join("ns");
        {
            let store = LocalStore::open(dir.path(), "ns").await.unwrap();
            store
                .put(Collection::Files, "kept", Bytes::from_static(b"kept"))
                .await
                .unwrap();
        }
        std::fs::write(ns_root.join(WAL_NAME), b"\xff half-written garbage").unwrap();

        let store = LocalStore::open(dir.path(), "ns").await.unwrap();
        let got = store.get(Collection::Files, "kept").await.unwrap();
        assert_eq!(got.as_deref(), Some(b"kept".as_ref()));
        assert!(!ns_root.join(WAL_NAME).exists());
    }

    #[tokio::test]
    async fn keys_with_separators_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "ns").await.unwrap();
        assert!(
            store
                .put(Collection::Files, "../escape", Bytes::from_static(b"x"))
                .await
                .is_err()
        );
        assert!(store.get(Collection::Files, "a/b").await.is_err());
    }
}
