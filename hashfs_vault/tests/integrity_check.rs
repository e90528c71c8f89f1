//! The on-demand integrity check: orphan sweep and removal of files
//! with no recoverable version.

use bytes::Bytes;
use hashfs_core::store::{Collection, KvStore, StoreOpener};
use hashfs_core::VaultKeys;
use hashfs_store_memory::MemoryOpener;
use hashfs_vault::{Unlocked, Vault, VaultConfig};
use std::sync::Arc;

async fn unlock(opener: &MemoryOpener, passphrase: &str) -> Unlocked {
    Vault::unlock(passphrase, opener, VaultConfig::default())
        .await
        .expect("unlock should succeed")
}

async fn raw_store(opener: &MemoryOpener, passphrase: &str) -> Arc<dyn KvStore> {
    let namespace = VaultKeys::derive(passphrase).unwrap().namespace();
    opener.open(&namespace).await.unwrap().store
}

#[tokio::test]
async fn healthy_vault_reports_nothing() {
    let opener = MemoryOpener::new();
    let vault = unlock(&opener, "integrity healthy passphrase").await.vault;

    vault.save("a.txt", &b"one"[..], None, None).await.unwrap();
    vault.save("a.txt", &b"two"[..], None, None).await.unwrap();
    vault.save("b.txt", &b"bee"[..], None, None).await.unwrap();

    let report = vault.integrity_check().await.unwrap();
    assert!(report.issues.is_empty(), "issues: {:?}", report.issues);
    assert!(report.files_removed.is_empty());
    assert_eq!(report.orphans_removed, 0);
    assert_eq!(vault.get_files().await.unwrap().len(), 2);
}

#[tokio::test]
async fn orphan_blobs_are_swept() {
    let passphrase = "integrity orphan passphrase";
    let opener = MemoryOpener::new();
    let vault = unlock(&opener, passphrase).await.vault;
    let store = raw_store(&opener, passphrase).await;

    vault.save("a.txt", &b"keep me"[..], None, None).await.unwrap();

    // Plant two blobs nothing references.
    store
        .put(Collection::Files, "orphan-1", Bytes::from_static(b"junk"))
        .await
        .unwrap();
    store
        .put(Collection::Files, "orphan-2", Bytes::from_static(b"junk"))
        .await
        .unwrap();

    let report = vault.integrity_check().await.unwrap();
    assert_eq!(report.orphans_removed, 2);
    assert!(report.files_removed.is_empty());

    // The referenced payload survived.
    let loaded = vault.load("a.txt", None, false).await.unwrap();
    assert_eq!(loaded.bytes, b"keep me");
    assert!(store.get(Collection::Files, "orphan-1").await.unwrap().is_none());
}

#[tokio::test]
async fn unrecoverable_files_are_removed_and_reported() {
    let passphrase = "integrity removal passphrase";
    let opener = MemoryOpener::new();
    let vault = unlock(&opener, passphrase).await.vault;
    let store = raw_store(&opener, passphrase).await;

    vault
        .save("doomed.txt", &b"only version"[..], None, None)
        .await
        .unwrap();
    vault
        .save("fine.txt", &b"still fine"[..], None, None)
        .await
        .unwrap();

    // Destroy every payload, then rewrite fine.txt: only doomed.txt is
    // left without a single good version.
    for key in store.list_keys(Collection::Files).await.unwrap() {
        store.delete(Collection::Files, &key).await.unwrap();
    }
    vault
        .save("fine.txt", &b"rewritten"[..], None, None)
        .await
        .unwrap();

    let report = vault.integrity_check().await.unwrap();
    assert_eq!(report.files_removed, vec!["doomed.txt".to_string()]);
    assert!(
        report.issues.iter().any(|i| i.name == "doomed.txt"),
        "the missing payload is reported: {:?}",
        report.issues
    );

    let names: Vec<_> = vault
        .get_files()
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["fine.txt"]);
}
