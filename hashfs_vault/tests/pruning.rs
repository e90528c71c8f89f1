//! Version-limit pruning behavior.

use hashfs_store_memory::MemoryOpener;
use hashfs_vault::{SaveOptions, SaveOutcome, Vault, VaultConfig, VaultError};

#[tokio::test]
async fn pruning_bounds_history_and_frees_blobs() {
    let opener = MemoryOpener::new();
    let unlocked = Vault::unlock("pruning test passphrase", &opener, VaultConfig::default())
        .await
        .unwrap();
    let vault = unlocked.vault;

    let options = Some(SaveOptions { version_limit: 3 });
    for v in 1..=5u64 {
        let outcome = vault
            .save("p", format!("v{v}").into_bytes(), None, options)
            .await
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved { version, .. } if version == v));
    }

    // Versions 1 and 2 were pruned away.
    assert!(matches!(
        vault.load("p", Some(1), false).await,
        Err(VaultError::VersionNotFound { version: 1, .. })
    ));
    assert!(matches!(
        vault.load("p", Some(2), false).await,
        Err(VaultError::VersionNotFound { version: 2, .. })
    ));

    let oldest = vault.load("p", Some(3), false).await.unwrap();
    assert_eq!(oldest.bytes, b"v3");
    assert_eq!((oldest.available.min, oldest.available.max), (3, 5));

    let head = vault.load("p", None, false).await.unwrap();
    assert_eq!(head.bytes, b"v5");
    assert_eq!(head.current_version, 5);

    // Pruned payload blobs are really gone: nothing for the orphan
    // sweep to collect, and the full-chain validation still passes.
    let report = vault.integrity_check().await.unwrap();
    assert!(report.issues.is_empty(), "issues: {:?}", report.issues);
    assert!(report.files_removed.is_empty());
    assert_eq!(report.orphans_removed, 0);

    let validated = vault.load("p", None, true).await.unwrap();
    assert_eq!(validated.bytes, b"v5");
}

#[tokio::test]
async fn default_limit_applies_without_options() {
    let opener = MemoryOpener::new();
    let unlocked = Vault::unlock("pruning default passphrase", &opener, VaultConfig::default())
        .await
        .unwrap();
    let vault = unlocked.vault;

    for v in 1..=20u64 {
        vault
            .save("big", format!("content {v}").into_bytes(), None, None)
            .await
            .unwrap();
    }

    let head = vault.load("big", None, false).await.unwrap();
    assert_eq!(head.current_version, 20);
    // Default version_limit is 15: 20 - 15 + 1 = 6 is the oldest kept.
    assert_eq!((head.available.min, head.available.max), (6, 20));
    assert!(matches!(
        vault.load("big", Some(5), false).await,
        Err(VaultError::VersionNotFound { .. })
    ));
    let oldest = vault.load("big", Some(6), false).await.unwrap();
    assert_eq!(oldest.bytes, b"content 6");
}
