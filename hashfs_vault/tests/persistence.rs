//! Vault isolation and redb-backed persistence across sessions.

use hashfs_core::VaultKeys;
use hashfs_store_local::LocalOpener;
use hashfs_store_memory::MemoryOpener;
use hashfs_store_redb::RedbOpener;
use hashfs_vault::{Vault, VaultConfig};

#[tokio::test]
async fn distinct_passphrases_are_distinct_vaults() {
    let opener = MemoryOpener::new();

    let alpha = Vault::unlock("alpha vault passphrase", &opener, VaultConfig::default())
        .await
        .unwrap();
    alpha
        .vault
        .save("secret.txt", &b"alpha data"[..], None, None)
        .await
        .unwrap();

    let beta = Vault::unlock("beta vault passphrase", &opener, VaultConfig::default())
        .await
        .unwrap();
    assert!(
        beta.files.is_empty(),
        "a different passphrase opens a different namespace"
    );
    let missing = beta.vault.load("secret.txt", None, false).await.unwrap();
    assert!(missing.bytes.is_empty());

    // The namespaces really are disjoint names.
    let ns_a = VaultKeys::derive("alpha vault passphrase").unwrap().namespace();
    let ns_b = VaultKeys::derive("beta vault passphrase").unwrap().namespace();
    assert_ne!(ns_a, ns_b);
}

#[tokio::test]
async fn redb_vault_survives_process_restart() {
    let passphrase = "redb persistence passphrase";
    let dir = tempfile::tempdir().unwrap();

    {
        let opener = RedbOpener::new(dir.path());
        let unlocked = Vault::unlock(passphrase, &opener, VaultConfig::default())
            .await
            .unwrap();
        assert!(unlocked.recovery.is_none());
        unlocked
            .vault
            .save("persisted.md", &b"# survives"[..], Some("text/markdown"), None)
            .await
            .unwrap();
        unlocked.vault.lock().await.unwrap();
    }

    // A new opener simulates a fresh process over the same directory.
    let opener = RedbOpener::new(dir.path());
    let unlocked = Vault::unlock(passphrase, &opener, VaultConfig::default())
        .await
        .unwrap();
    assert_eq!(unlocked.files.len(), 1);
    assert_eq!(unlocked.files[0].name, "persisted.md");

    let loaded = unlocked.vault.load("persisted.md", None, true).await.unwrap();
    assert_eq!(loaded.bytes, b"# survives");
    assert_eq!(loaded.mime, "text/markdown");
}

#[tokio::test]
async fn local_store_vault_survives_restart() {
    let passphrase = "local store persistence passphrase";
    let dir = tempfile::tempdir().unwrap();

    {
        let opener = LocalOpener::new(dir.path());
        let unlocked = Vault::unlock(passphrase, &opener, VaultConfig::default())
            .await
            .unwrap();
        unlocked
            .vault
            .save("wal.txt", &b"write-ahead logged"[..], None, None)
            .await
            .unwrap();
        unlocked
            .vault
            .save("wal.txt", &b"second version"[..], None, None)
            .await
            .unwrap();
        unlocked.vault.lock().await.unwrap();
    }

    let opener = LocalOpener::new(dir.path());
    let unlocked = Vault::unlock(passphrase, &opener, VaultConfig::default())
        .await
        .unwrap();
    let head = unlocked.vault.load("wal.txt", None, true).await.unwrap();
    assert_eq!(head.bytes, b"second version");
    let old = unlocked.vault.load("wal.txt", Some(1), false).await.unwrap();
    assert_eq!(old.bytes, b"write-ahead logged");
}

#[tokio::test]
async fn unopenable_redb_namespace_is_rebuilt() {
    let passphrase = "redb rebuild passphrase";
    let dir = tempfile::tempdir().unwrap();
    let namespace = VaultKeys::derive(passphrase).unwrap().namespace();
    std::fs::write(
        dir.path().join(format!("{namespace}.redb")),
        b"not a database",
    )
    .unwrap();

    let opener = RedbOpener::new(dir.path());
    let unlocked = Vault::unlock(passphrase, &opener, VaultConfig::default())
        .await
        .unwrap();
    let recovery = unlocked.recovery.expect("rebuild must be reported");
    assert!(recovery.database_rebuilt);
    assert!(unlocked.files.is_empty());

    // The rebuilt namespace is fully usable.
    unlocked
        .vault
        .save("fresh.txt", &b"works"[..], None, None)
        .await
        .unwrap();
    let loaded = unlocked.vault.load("fresh.txt", None, false).await.unwrap();
    assert_eq!(loaded.bytes, b"works");
}
