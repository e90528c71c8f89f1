//! Test utilities for `KvStore` implementations.
//!
//! Provides a contract suite that can be run against any backend to
//! verify the `KvStore` trait guarantees.
//!
//! # Usage
//!
//! In your store crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! hashfs_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! ```ignore
//! use hashfs_core::testutil::StoreSuite;
//!
//! #[tokio::test]
//! async fn contract() {
//!     StoreSuite::new(&store).run_all().await.unwrap();
//! }
//! ```

use crate::store::{Collection, KvStore, StoreResult, WriteBatch};
use bytes::Bytes;

/// Contract suite for `KvStore` implementations.
pub struct StoreSuite<'a, S> {
    store: &'a S,
}

impl<'a, S: KvStore> StoreSuite<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Run all contract tests.
    pub async fn run_all(&self) -> StoreResult<()> {
        self.test_put_get().await?;
        self.test_overwrite().await?;
        self.test_delete_idempotent().await?;
        self.test_collections_isolated().await?;
        self.test_list_keys().await?;
        self.test_commit_batch().await?;
        self.test_wipe().await?;
        Ok(())
    }

    pub async fn test_put_get(&self) -> StoreResult<()> {
        let data = Bytes::from_static(b"hello, vault!");
        self.store
            .put(Collection::Files, "suite_a", data.clone())
            .await?;
        let got = self.store.get(Collection::Files, "suite_a").await?;
        assert_eq!(got.as_deref(), Some(data.as_ref()), "get should return put value");
        assert!(
            self.store.get(Collection::Files, "suite_missing").await?.is_none(),
            "missing key should read as None"
        );
        Ok(())
    }

    pub async fn test_overwrite(&self) -> StoreResult<()> {
        self.store
            .put(Collection::Files, "suite_b", Bytes::from_static(b"one"))
            .await?;
        self.store
            .put(Collection::Files, "suite_b", Bytes::from_static(b"two"))
            .await?;
        let got = self.store.get(Collection::Files, "suite_b").await?;
        assert_eq!(got.as_deref(), Some(b"two".as_ref()), "last write wins");
        Ok(())
    }

    pub async fn test_delete_idempotent(&self) -> StoreResult<()> {
        self.store
            .put(Collection::Files, "suite_c", Bytes::from_static(b"x"))
            .await?;
        self.store.delete(Collection::Files, "suite_c").await?;
        assert!(self.store.get(Collection::Files, "suite_c").await?.is_none());
        // A second delete of the same key must succeed.
        self.store.delete(Collection::Files, "suite_c").await?;
        Ok(())
    }

    pub async fn test_collections_isolated(&self) -> StoreResult<()> {
        self.store
            .put(Collection::Meta, "suite_d", Bytes::from_static(b"meta"))
            .await?;
        assert!(
            self.store.get(Collection::Files, "suite_d").await?.is_none(),
            "collections must not share keys"
        );
        self.store.delete(Collection::Meta, "suite_d").await?;
        Ok(())
    }

    pub async fn test_list_keys(&self) -> StoreResult<()> {
        for key in ["suite_l1", "suite_l2", "suite_l3"] {
            self.store
                .put(Collection::Chains, key, Bytes::from_static(b"c"))
                .await?;
        }
        let mut keys = self.store.list_keys(Collection::Chains).await?;
        keys.retain(|k| k.starts_with("suite_l"));
        keys.sort();
        assert_eq!(keys, vec!["suite_l1", "suite_l2", "suite_l3"]);
        for key in ["suite_l1", "suite_l2", "suite_l3"] {
            self.store.delete(Collection::Chains, key).await?;
        }
        Ok(())
    }

    pub async fn test_commit_batch(&self) -> StoreResult<()> {
        self.store
            .put(Collection::Files, "suite_gone", Bytes::from_static(b"old"))
            .await?;

        let mut batch = WriteBatch::new();
        batch
            .put(Collection::Files, "suite_e1", Bytes::from_static(b"blob"))
            .put(Collection::Meta, "suite_e2", Bytes::from_static(b"index"))
            .delete(Collection::Files, "suite_gone");
        self.store.commit(batch).await?;

        assert!(self.store.get(Collection::Files, "suite_e1").await?.is_some());
        assert!(self.store.get(Collection::Meta, "suite_e2").await?.is_some());
        assert!(self.store.get(Collection::Files, "suite_gone").await?.is_none());

        self.store.delete(Collection::Files, "suite_e1").await?;
        self.store.delete(Collection::Meta, "suite_e2").await?;
        Ok(())
    }

    pub async fn test_wipe(&self) -> StoreResult<()> {
        self.store
            .put(Collection::Integrity, "suite_w", Bytes::from_static(b"z"))
            .await?;
        self.store.wipe().await?;
        for collection in Collection::ALL {
            assert!(
                self.store.list_keys(collection).await?.is_empty(),
                "wipe must empty every collection"
            );
        }
        Ok(())
    }
}
