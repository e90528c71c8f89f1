//! Key-value storage abstraction for vault namespaces.
//!
//! A vault namespace holds four named collections. Backends must provide
//! atomic multi-key commits across collections: a `WriteBatch` either
//! applies completely or not at all, and readers never observe a partial
//! batch.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

pub type StoreResult<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

/// The named collections of a vault namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Encrypted content blobs, keyed by opaque blob key.
    Files,
    /// The encrypted metadata index under the single key `index`.
    Meta,
    /// Encrypted, signed version chains, keyed by chain id.
    Chains,
    /// Small plaintext bookkeeping (creation time, schema version).
    Integrity,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Files,
        Collection::Meta,
        Collection::Chains,
        Collection::Integrity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Files => "files",
            Collection::Meta => "meta",
            Collection::Chains => "chains",
            Collection::Integrity => "integrity",
        }
    }

    /// Inverse of [`Collection::name`], for backends that persist the
    /// collection name (e.g. in a write-ahead log).
    pub fn from_name(name: &str) -> Option<Self> {
        Collection::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// A single mutation inside a `WriteBatch`.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put {
        collection: Collection,
        key: String,
        value: Bytes,
    },
    Delete {
        collection: Collection,
        key: String,
    },
}

/// An ordered set of mutations that commits atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(
        &mut self,
        collection: Collection,
        key: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> &mut Self {
        self.ops.push(BatchOp::Put {
            collection,
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(&mut self, collection: Collection, key: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            collection,
            key: key.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Storage backend for one vault namespace.
///
/// `delete` is idempotent: removing a missing key succeeds. `wipe` drops
/// the entire namespace and recreates it empty; it is the database
/// recovery primitive and must succeed even when the namespace content
/// is unreadable.
#[async_trait]
pub trait KvStore: std::fmt::Debug + Send + Sync + 'static {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Bytes>>;

    async fn put(&self, collection: Collection, key: &str, value: Bytes) -> StoreResult<()>;

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<()>;

    async fn list_keys(&self, collection: Collection) -> StoreResult<Vec<String>>;

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

    async fn wipe(&self) -> StoreResult<()>;
}

/// A store handle produced by a `StoreOpener`, with a flag recording
/// whether the namespace had to be rebuilt to open at all.
#[derive(Debug, Clone)]
pub struct OpenedStore {
    pub store: Arc<dyn KvStore>,
    pub recovered: bool,
}

/// Opens (or creates) the key-value store for a vault namespace.
///
/// Implementations recover from unopenable namespaces themselves — drop
/// and recreate, reporting `recovered: true` — and only error when the
/// backing medium is genuinely unusable.
#[async_trait]
pub trait StoreOpener: Send + Sync {
    async fn open(&self, namespace: &str) -> StoreResult<OpenedStore>;
}
