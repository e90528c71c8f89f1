//! ZIP interchange: export, wipe, import, and the MIME sidecar.

use bytes::Bytes;
use hashfs_core::codec;
use hashfs_core::store::{KvStore, StoreOpener};
use hashfs_core::VaultKeys;
use hashfs_store_memory::MemoryOpener;
use hashfs_vault::interchange::META_SIDECAR_NAME;
use hashfs_vault::{ImportFileItem, Unlocked, Vault, VaultConfig};
use std::collections::BTreeMap;
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

const FILES: [(&str, &str, &[u8]); 3] = [
    ("notes/readme.md", "text/markdown", b"# hello\n"),
    ("data.bin", "application/octet-stream", &[0u8, 255, 7, 3]),
    ("page.html", "text/html", b"<html></html>"),
];

#[tokio::test]
async fn export_wipe_import_round_trip() {
    let passphrase = "zip roundtrip passphrase";
    let opener = MemoryOpener::new();
    let mut unlocked = unlock(&opener, passphrase).await;
    let vault = unlocked.vault.clone();

    for (name, mime, content) in FILES {
        vault.save(name, content, Some(mime), None).await.unwrap();
    }

    let archive = vault.export_zip(Some("op-export")).await.unwrap();

    // The archive is a plain ZIP: every file plus the sidecar.
    let entries = codec::zip_unpack(&archive).unwrap();
    assert_eq!(entries.len(), FILES.len() + 1);
    assert!(entries.contains_key(META_SIDECAR_NAME));
    assert_eq!(entries["notes/readme.md"], Bytes::from_static(b"# hello\n"));

    // Export emitted progress under the requested operation id.
    let event = unlocked.progress.try_recv().expect("progress was emitted");
    assert_eq!(event.operation_id, "op-export");
    assert_eq!(event.total, FILES.len() as u64);

    // Destroy the namespace, then rebuild the vault from the archive.
    vault.lock().await.unwrap();
    raw_store(&opener, passphrase).await.wipe().await.unwrap();

    let reopened = unlock(&opener, passphrase).await;
    assert!(reopened.files.is_empty(), "wiped vault starts empty");
    let vault = reopened.vault;

    let items = vault.import_zip(archive, None).await.unwrap();
    assert_eq!(items.len(), FILES.len(), "the sidecar is not an item");
    for item in items {
        let data = item.outcome.expect("import items should parse");
        vault
            .save(&data.filename, data.bytes, Some(&data.mime), None)
            .await
            .unwrap();
    }

    let files = vault.get_files().await.unwrap();
    assert_eq!(files.len(), FILES.len());
    for (name, mime, content) in FILES {
        let summary = files.iter().find(|f| f.name == name).unwrap();
        assert_eq!(summary.mime, mime, "sidecar restored the MIME of {name}");
        assert_eq!(summary.head_version, 1, "histories reset on import");

        let loaded = vault.load(name, None, false).await.unwrap();
        assert_eq!(loaded.bytes, content, "byte-identical after round trip");
    }
}

#[tokio::test]
async fn import_without_sidecar_defaults_mime() {
    let opener = MemoryOpener::new();
    let vault = unlock(&opener, "sidecarless import passphrase").await.vault;

    let mut entries = BTreeMap::new();
    entries.insert("plain.dat".to_string(), Bytes::from_static(b"\x01\x02"));
    let archive = codec::zip_pack(&entries).unwrap();

    let items = vault.import_zip(archive, None).await.unwrap();
    assert_eq!(items.len(), 1);
    let data = items[0].outcome.clone().unwrap();
    assert_eq!(data.mime, "application/octet-stream");
    assert_eq!(data.bytes, Bytes::from_static(b"\x01\x02"));
}

#[tokio::test]
async fn import_files_uses_host_mime_hints() {
    let opener = MemoryOpener::new();
    let vault = unlock(&opener, "import files passphrase").await.vault;

    let items = vault
        .import_files(
            vec![
                ImportFileItem {
                    name: "photo.png".into(),
                    bytes: Bytes::from_static(b"png bytes"),
                    mime: Some("image/png".into()),
                },
                ImportFileItem {
                    name: "unknown".into(),
                    bytes: Bytes::from_static(b"??"),
                    mime: None,
                },
            ],
            None,
        )
        .await
        .unwrap();

    let first = items[0].outcome.clone().unwrap();
    assert_eq!(first.mime, "image/png");
    let second = items[1].outcome.clone().unwrap();
    assert_eq!(second.mime, "application/octet-stream");
}
