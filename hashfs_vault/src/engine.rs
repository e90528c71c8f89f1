//! The vault engine: the state and algorithms behind every operation.
//!
//! One `VaultEngine` owns the session keys, the store handle, the
//! decrypted metadata index and the chain cache. It is driven by the
//! actor in [`crate::actor`], which serializes operations; nothing in
//! here needs locking.

use crate::chain::{Chain, VersionEntry};
use crate::chains::{self, ChainManager};
use crate::context::{VaultConfig, VaultContext};
use crate::error::{VaultError, VaultResult};
use crate::integrity::{IntegrityIssue, IntegrityReport, sweep_orphans};
use crate::interchange::{
    DEFAULT_IMPORT_MIME, ImportFileItem, ImportItem, ImportedData, META_SIDECAR_NAME, SidecarMeta,
};
use crate::meta::{
    DEFAULT_MIME, FileRecord, FileSummary, META_INDEX_KEY, META_SCHEMA_VERSION, MetaDocument,
};
use bytes::Bytes;
use chrono::Utc;
use hashfs_core::Hash;
use hashfs_core::codec;
use hashfs_core::crypto::{self, CryptoError, SealedBlob, VaultKeys};
use hashfs_core::store::{Collection, StoreOpener, WriteBatch};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use uuid::Uuid;

/// Health-probe marker written to `files` during init.
pub(crate) const PROBE_KEY: &str = "__hashfs_probe__";
const PROBE_VALUE: &[u8] = b"hashfs-health-probe";

/// Bookkeeping keys in the `integrity` collection.
const CREATED_KEY: &str = "created";
const META_VERSION_KEY: &str = "metaVersion";

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Identifies the vault and the current unlock session without exposing
/// keys. `base` is stable per vault; `session` is fresh per unlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub base: String,
    pub session: String,
}

/// What init had to rebuild, surfaced so hosts can inform the user.
#[derive(Debug, Clone, Default)]
pub struct RecoveryInfo {
    /// The namespace was dropped and recreated empty.
    pub database_rebuilt: bool,
    /// The metadata index was rebuilt from surviving chains.
    pub index_rebuilt: bool,
    /// Names synthesized for files resurrected from chains.
    pub recovered_files: Vec<String>,
}

impl RecoveryInfo {
    pub fn is_empty(&self) -> bool {
        !self.database_rebuilt && !self.index_rebuilt && self.recovered_files.is_empty()
    }
}

/// Result of a successful init.
#[derive(Debug)]
pub struct InitOutcome {
    pub files: Vec<FileSummary>,
    pub fingerprint: Fingerprint,
    pub recovery: Option<RecoveryInfo>,
}

/// Per-call save tunables.
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    pub version_limit: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            version_limit: crate::DEFAULT_VERSION_LIMIT,
        }
    }
}

/// First and last retained version numbers of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailableVersions {
    pub min: u64,
    pub max: u64,
}

/// A loaded file; the plaintext is owned by the caller.
#[derive(Debug)]
pub struct LoadedFile {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub size: u64,
    /// The version that was read.
    pub version: u64,
    /// The head version after this call (recovery may have moved it).
    pub current_version: u64,
    pub available: AvailableVersions,
    /// True when the head was lost and an earlier version took over.
    pub recovered: bool,
}

/// Result of a save.
#[derive(Debug)]
pub enum SaveOutcome {
    /// Content identical to the head version; the chain did not grow.
    Unchanged,
    Saved {
        version: u64,
        files: Vec<FileSummary>,
    },
}

pub struct VaultEngine {
    ctx: VaultContext,
    meta: MetaDocument,
    chains: ChainManager,
}

impl VaultEngine {
    /// Derives keys, opens and probes the store, loads (or rebuilds) the
    /// metadata index, and computes the session fingerprint.
    pub async fn init(
        passphrase: &str,
        opener: &dyn StoreOpener,
        config: VaultConfig,
    ) -> VaultResult<(Self, InitOutcome)> {
        let passphrase = passphrase.to_string();
        let keys = tokio::task::spawn_blocking(move || VaultKeys::derive(&passphrase))
            .await
            .map_err(|e| VaultError::KdfFailure(e.to_string()))??;
        let namespace = keys.namespace();
        tracing::debug!("unlocking vault namespace {namespace}");

        let opened = opener.open(&namespace).await?;
        let mut recovery = RecoveryInfo {
            database_rebuilt: opened.recovered,
            ..RecoveryInfo::default()
        };
        let ctx = VaultContext::new(keys, opened.store, config);

        // A failed probe round-trip means the namespace is unusable
        // as-is: drop it and start empty.
        if !health_probe(&ctx).await {
            log::warn!("health probe failed for {namespace}, rebuilding namespace");
            ctx.store.wipe().await?;
            if !health_probe(&ctx).await {
                return Err(VaultError::StoreUnavailable(
                    "health probe failed after namespace rebuild".into(),
                ));
            }
            recovery.database_rebuilt = true;
        }

        let mut chains = ChainManager::new(config.chain_cache_capacity);
        let meta = load_or_rebuild_meta(&ctx, &mut chains, &mut recovery).await?;

        if ctx
            .store
            .get(Collection::Integrity, CREATED_KEY)
            .await?
            .is_none()
        {
            ctx.store
                .put(
                    Collection::Integrity,
                    CREATED_KEY,
                    Bytes::from(now_ms().to_string()),
                )
                .await?;
        }
        ctx.store
            .put(
                Collection::Integrity,
                META_VERSION_KEY,
                Bytes::from(META_SCHEMA_VERSION.to_string()),
            )
            .await?;

        let fingerprint = compute_fingerprint(&ctx, &namespace)?;
        let outcome = InitOutcome {
            files: meta.summaries(),
            fingerprint,
            recovery: (!recovery.is_empty()).then_some(recovery),
        };
        Ok((Self { ctx, meta, chains }, outcome))
    }

    /// Sorted file summaries.
    pub fn files(&self) -> Vec<FileSummary> {
        self.meta.summaries()
    }

    /// Reads one version of a file (latest by default), verifying the
    /// content hash and signature. A lost head payload triggers the
    /// recovery walk; a lost historical payload is an error.
    pub async fn load(
        &mut self,
        name: &str,
        version: Option<u64>,
        validate: bool,
    ) -> VaultResult<LoadedFile> {
        let Some(record) = self.meta.files.get(name).cloned() else {
            return Ok(empty_loaded(DEFAULT_MIME));
        };
        if record.active_key.is_none() {
            return Ok(empty_loaded(&record.mime));
        }
        let chain = self.chains.load(&self.ctx, &record.chain_id).await?;
        let Some(head) = chain.head() else {
            return Ok(empty_loaded(&record.mime));
        };
        let head_version = head.version;
        let target = match version {
            Some(v) => chain
                .entry(v)
                .ok_or_else(|| VaultError::VersionNotFound {
                    name: name.to_string(),
                    version: v,
                })?
                .clone(),
            None => head.clone(),
        };
        let is_head = target.version == head_version;

        let stored = self.ctx.store.get(Collection::Files, &target.key).await?;
        let plaintext = match stored {
            Some(bytes) => match chains::verify_payload(&self.ctx, name, &target, &bytes) {
                Ok(plaintext) => plaintext,
                // Historical damage is reported, not recovered from.
                Err(_) if !is_head => {
                    return Err(VaultError::VersionCorrupt {
                        name: name.to_string(),
                        version: target.version,
                    });
                }
                Err(err) => return Err(err),
            },
            None if is_head => return self.recover_head(name, record, chain, validate).await,
            None => {
                return Err(VaultError::VersionCorrupt {
                    name: name.to_string(),
                    version: target.version,
                });
            }
        };

        if validate {
            chains::validate_chain(&self.ctx, &record.chain_id, name, &chain).await?;
        }

        Ok(LoadedFile {
            size: plaintext.len() as u64,
            bytes: plaintext,
            mime: record.mime,
            version: target.version,
            current_version: head_version,
            available: AvailableVersions {
                min: chain.min_version(),
                max: chain.max_version(),
            },
            recovered: false,
        })
    }

    /// Walks backwards from the lost head to the newest surviving
    /// version and promotes it; with nothing left, the file is removed.
    async fn recover_head(
        &mut self,
        name: &str,
        record: FileRecord,
        chain: Chain,
        validate: bool,
    ) -> VaultResult<LoadedFile> {
        log::warn!("head payload of {name} is gone, walking back for a surviving version");

        for entry in chain.versions.iter().rev().skip(1) {
            let Some(bytes) = self.ctx.store.get(Collection::Files, &entry.key).await? else {
                continue;
            };
            let Ok(plaintext) = chains::verify_payload(&self.ctx, name, entry, &bytes) else {
                continue;
            };

            // Drop the dead tail so chain and record agree again, then
            // persist the moved head pointer.
            let mut recovered_chain = chain.clone();
            recovered_chain.truncate_after(entry.version);
            let recovered_chain = self
                .chains
                .save(&self.ctx, &record.chain_id, recovered_chain)
                .await?;

            let mut record = record;
            record.head_version = entry.version;
            record.active_key = Some(entry.key.clone());
            record.last_size = entry.size;
            let mut doc = self.meta.clone();
            doc.files.insert(name.to_string(), record.clone());
            doc.last_saved = now_ms();
            write_meta_alone(&self.ctx, &doc).await?;
            self.meta = doc;
            log::warn!("recovered {name} to version {}", entry.version);

            if validate {
                chains::validate_chain(&self.ctx, &record.chain_id, name, &recovered_chain)
                    .await?;
            }

            return Ok(LoadedFile {
                size: plaintext.len() as u64,
                bytes: plaintext,
                mime: record.mime,
                version: entry.version,
                current_version: entry.version,
                available: AvailableVersions {
                    min: recovered_chain.min_version(),
                    max: recovered_chain.max_version(),
                },
                recovered: true,
            });
        }

        // No version survives: the file is unrecoverable.
        self.remove_file_force(name).await?;
        Err(VaultError::FileCorrupt {
            name: name.to_string(),
        })
    }

    /// Writes a new version: hash, sign, compress, encrypt, commit blob
    /// and index together, then append to the chain and prune.
    pub async fn save(
        &mut self,
        name: &str,
        bytes: &[u8],
        mime: Option<&str>,
        options: Option<SaveOptions>,
    ) -> VaultResult<SaveOutcome> {
        let now = now_ms();
        let hash_hex = Hash::new(bytes).to_hex();
        let mut record = match self.meta.files.get(name) {
            Some(record) => record.clone(),
            None => FileRecord::new(mime.unwrap_or(DEFAULT_MIME), new_id(), now),
        };

        let chain = self.chains.load(&self.ctx, &record.chain_id).await?;
        if chain.head().is_some_and(|head| head.hash == hash_hex) {
            // Same content as the head: at most the MIME changes.
            if let Some(mime) = mime {
                if mime != record.mime {
                    record.mime = mime.to_string();
                    let mut doc = self.meta.clone();
                    doc.files.insert(name.to_string(), record);
                    doc.last_saved = now;
                    write_meta_alone(&self.ctx, &doc).await?;
                    self.meta = doc;
                }
            }
            return Ok(SaveOutcome::Unchanged);
        }

        let sig = crypto::sign_hex(self.ctx.keys.signing_key(), &hash_hex);
        let blob_key = new_id();
        let version = record.head_version + 1;

        let compressed = codec::compress(bytes)?;
        let payload = crypto::encrypt(self.ctx.keys.enc_key(), &compressed)
            .map_err(VaultError::from)?
            .to_bytes()
            .map_err(VaultError::from)?;

        if let Some(mime) = mime {
            record.mime = mime.to_string();
        }
        record.head_version = version;
        record.last_modified = now;
        record.last_size = bytes.len() as u64;
        record.last_compressed_size = compressed.len() as u64;
        record.active_key = Some(blob_key.clone());

        let chain_id = record.chain_id.clone();
        let mut doc = self.meta.clone();
        doc.files.insert(name.to_string(), record);
        doc.last_saved = now;
        let meta_payload = encrypt_meta(&self.ctx, &doc)?;

        // Transaction A: payload and index commit together, or the vault
        // stays exactly as it was.
        let mut batch = WriteBatch::new();
        batch.put(Collection::Files, blob_key.as_str(), payload);
        batch.put(Collection::Meta, META_INDEX_KEY, meta_payload);
        self.ctx.store.commit(batch).await?;
        self.meta = doc;

        let entry = VersionEntry {
            version,
            hash: hash_hex,
            sig,
            key: blob_key,
            size: bytes.len() as u64,
            ts: now,
        };
        let limit = options.map_or(self.ctx.config.version_limit, |o| o.version_limit);
        let dropped = self.chains.append(&self.ctx, &chain_id, entry, limit).await?;

        // Transaction B: pruned payloads. A failure here leaves orphans
        // for the integrity check, not an inconsistent vault.
        if !dropped.is_empty() {
            let mut batch = WriteBatch::new();
            for key in &dropped {
                batch.delete(Collection::Files, key.as_str());
            }
            if let Err(err) = self.ctx.store.commit(batch).await {
                log::warn!(
                    "failed to delete {} pruned payloads of {name}: {err}",
                    dropped.len()
                );
            }
        }

        Ok(SaveOutcome::Saved {
            version,
            files: self.meta.summaries(),
        })
    }

    /// Removes a file, its chain, and every payload blob in one commit.
    pub async fn delete(&mut self, name: &str) -> VaultResult<Vec<FileSummary>> {
        if !self.meta.files.contains_key(name) {
            return Err(VaultError::NotFound {
                name: name.to_string(),
            });
        }
        self.remove_file_force(name).await?;
        Ok(self.meta.summaries())
    }

    /// Delete helper that tolerates an unreadable chain: whatever blob
    /// keys are knowable are deleted now, the rest become orphans.
    async fn remove_file_force(&mut self, name: &str) -> VaultResult<()> {
        let Some(record) = self.meta.files.get(name).cloned() else {
            return Ok(());
        };
        let chain = match self.chains.load(&self.ctx, &record.chain_id).await {
            Ok(chain) => chain,
            Err(err) => {
                log::warn!("deleting {name} with unreadable chain: {err}");
                Chain::empty()
            }
        };

        let mut doc = self.meta.clone();
        doc.files.remove(name);
        doc.last_saved = now_ms();
        let meta_payload = encrypt_meta(&self.ctx, &doc)?;

        let mut keys: BTreeSet<&str> = chain.blob_keys().collect();
        if let Some(key) = record.active_key.as_deref() {
            keys.insert(key);
        }
        let mut batch = WriteBatch::new();
        for key in keys {
            batch.delete(Collection::Files, key);
        }
        batch.delete(Collection::Chains, record.chain_id.as_str());
        batch.put(Collection::Meta, META_INDEX_KEY, meta_payload);
        self.ctx.store.commit(batch).await?;

        self.meta = doc;
        self.chains.evict(&record.chain_id);
        Ok(())
    }

    /// Moves a record to a new name; chain and history are untouched.
    pub async fn rename(&mut self, old: &str, new: &str) -> VaultResult<Vec<FileSummary>> {
        if old.is_empty() || new.is_empty() {
            return Err(VaultError::RenameInvalid {
                reason: "names must be non-empty".into(),
            });
        }
        if self.meta.files.contains_key(new) {
            return Err(VaultError::RenameConflict {
                name: new.to_string(),
            });
        }
        let mut doc = self.meta.clone();
        let Some(record) = doc.files.remove(old) else {
            return Err(VaultError::RenameInvalid {
                reason: format!("no such file: {old}"),
            });
        };
        doc.files.insert(new.to_string(), record);
        doc.last_saved = now_ms();
        write_meta_alone(&self.ctx, &doc).await?;
        self.meta = doc;
        Ok(self.meta.summaries())
    }

    /// Exports every readable head version plus the MIME sidecar as one
    /// ZIP archive.
    pub async fn export_zip(
        &mut self,
        mut progress: impl FnMut(u64, u64, &str),
    ) -> VaultResult<Bytes> {
        let exportable: Vec<(String, FileRecord)> = self
            .meta
            .files
            .iter()
            .filter(|(_, record)| record.active_key.is_some())
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect();
        let total = exportable.len() as u64;

        let mut entries = BTreeMap::new();
        let mut sidecar = SidecarMeta::default();
        let mut completed = 0u64;
        for (name, record) in exportable {
            let Some(key) = record.active_key.as_deref() else {
                continue;
            };
            let Some(bytes) = self.ctx.store.get(Collection::Files, key).await? else {
                log::warn!("export skipping {name}: head payload missing");
                continue;
            };
            let sealed = SealedBlob::from_bytes(&bytes).map_err(|_| VaultError::DecryptFailure)?;
            let compressed = crypto::decrypt(self.ctx.keys.enc_key(), &sealed)
                .map_err(|_| VaultError::DecryptFailure)?;
            let plaintext = codec::inflate(&compressed)?;
            entries.insert(name.clone(), Bytes::from(plaintext));
            sidecar.mimes.insert(name.clone(), record.mime.clone());
            completed += 1;
            progress(completed, total, &name);
        }

        let sidecar_json = sidecar
            .to_json()
            .map_err(|e| VaultError::IntegrityIssue(e.to_string()))?;
        entries.insert(META_SIDECAR_NAME.to_string(), Bytes::from(sidecar_json));
        Ok(codec::zip_pack(&entries)?)
    }

    /// Unpacks an archive into importable items; the host drives `save`
    /// per item so the normal write pipeline (and dedup) applies.
    pub fn import_zip(
        &self,
        bytes: &[u8],
        mut progress: impl FnMut(u64, u64, &str),
    ) -> VaultResult<Vec<ImportItem>> {
        let mut unpacked = codec::zip_unpack(bytes)?;
        let sidecar = unpacked
            .remove(META_SIDECAR_NAME)
            .map(|raw| SidecarMeta::parse(&raw))
            .unwrap_or_default();

        let total = unpacked.len() as u64;
        let mut items = Vec::with_capacity(unpacked.len());
        for (completed, (name, data)) in unpacked.into_iter().enumerate() {
            let mime = sidecar
                .mimes
                .get(&name)
                .cloned()
                .unwrap_or_else(|| DEFAULT_IMPORT_MIME.to_string());
            items.push(ImportItem {
                name: name.clone(),
                outcome: Ok(ImportedData {
                    filename: name.clone(),
                    mime,
                    size: data.len() as u64,
                    bytes: data,
                }),
            });
            progress(completed as u64 + 1, total, &name);
        }
        Ok(items)
    }

    /// Same shape as `import_zip`, for host-picked files.
    pub fn import_files(
        &self,
        items: Vec<ImportFileItem>,
        mut progress: impl FnMut(u64, u64, &str),
    ) -> Vec<ImportItem> {
        let total = items.len() as u64;
        items
            .into_iter()
            .enumerate()
            .map(|(completed, item)| {
                progress(completed as u64 + 1, total, &item.name);
                let mime = item
                    .mime
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_IMPORT_MIME.to_string());
                ImportItem {
                    name: item.name.clone(),
                    outcome: Ok(ImportedData {
                        filename: item.name,
                        mime,
                        size: item.bytes.len() as u64,
                        bytes: item.bytes,
                    }),
                }
            })
            .collect()
    }

    /// Validates every chain fully, removes files with no recoverable
    /// version, and sweeps unreferenced payload blobs.
    pub async fn integrity_check(
        &mut self,
        mut progress: impl FnMut(u64, u64, &str),
    ) -> VaultResult<IntegrityReport> {
        let mut report = IntegrityReport::default();
        let names: Vec<String> = self.meta.files.keys().cloned().collect();
        let total = names.len() as u64;

        let mut referenced: HashSet<String> = HashSet::new();
        let mut unrecoverable: Vec<String> = Vec::new();
        for (index, name) in names.iter().enumerate() {
            let Some(record) = self.meta.files.get(name).cloned() else {
                continue;
            };
            match self.chains.load(&self.ctx, &record.chain_id).await {
                Err(err) => {
                    report.issues.push(IntegrityIssue {
                        name: name.clone(),
                        version: None,
                        detail: err.to_string(),
                    });
                    unrecoverable.push(name.clone());
                }
                Ok(chain) => {
                    // A nascent file has nothing to verify and nothing
                    // to lose.
                    let mut any_ok = chain.versions.is_empty();
                    for entry in &chain.versions {
                        match self.ctx.store.get(Collection::Files, &entry.key).await? {
                            None => report.issues.push(IntegrityIssue {
                                name: name.clone(),
                                version: Some(entry.version),
                                detail: "payload missing".into(),
                            }),
                            Some(bytes) => {
                                match chains::verify_payload(&self.ctx, name, entry, &bytes) {
                                    Ok(_) => any_ok = true,
                                    Err(err) => report.issues.push(IntegrityIssue {
                                        name: name.clone(),
                                        version: Some(entry.version),
                                        detail: err.to_string(),
                                    }),
                                }
                            }
                        }
                    }
                    if any_ok {
                        for key in chain.blob_keys() {
                            referenced.insert(key.to_string());
                        }
                        if let Some(key) = &record.active_key {
                            referenced.insert(key.clone());
                        }
                    } else {
                        unrecoverable.push(name.clone());
                    }
                }
            }
            progress(index as u64 + 1, total, name);
        }

        for name in unrecoverable {
            match self.remove_file_force(&name).await {
                Ok(()) => {
                    log::warn!("integrity check removed unrecoverable file {name}");
                    report.files_removed.push(name);
                }
                Err(err) => report.issues.push(IntegrityIssue {
                    name,
                    version: None,
                    detail: format!("removal failed: {err}"),
                }),
            }
        }

        report.orphans_removed = sweep_orphans(&self.ctx, &referenced).await?;
        Ok(report)
    }
}

fn empty_loaded(mime: &str) -> LoadedFile {
    LoadedFile {
        bytes: Vec::new(),
        mime: mime.to_string(),
        size: 0,
        version: 0,
        current_version: 0,
        available: AvailableVersions { min: 0, max: 0 },
        recovered: false,
    }
}

/// Marker round-trip through `files`; any deviation means the namespace
/// needs to be rebuilt.
async fn health_probe(ctx: &VaultContext) -> bool {
    let value = Bytes::from_static(PROBE_VALUE);
    if ctx
        .store
        .put(Collection::Files, PROBE_KEY, value.clone())
        .await
        .is_err()
    {
        return false;
    }
    match ctx.store.get(Collection::Files, PROBE_KEY).await {
        Ok(Some(read)) if read == value => {}
        _ => return false,
    }
    ctx.store.delete(Collection::Files, PROBE_KEY).await.is_ok()
}

fn compute_fingerprint(ctx: &VaultContext, namespace: &str) -> VaultResult<Fingerprint> {
    let ns = namespace.as_bytes();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&ns[..ns.len().min(32)]);
    hasher.update(ctx.keys.enc_key());
    let base = hasher.finalize();

    let mut entropy = [0u8; 40];
    entropy[..8].copy_from_slice(&(now_ms() as u64).to_be_bytes());
    getrandom::getrandom(&mut entropy[8..])
        .map_err(|_| VaultError::from(CryptoError::RngFailed))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(base.as_bytes());
    hasher.update(&entropy);
    let session = hasher.finalize();

    Ok(Fingerprint {
        base: base.to_hex().to_string(),
        session: session.to_hex().to_string(),
    })
}

fn encrypt_meta(ctx: &VaultContext, doc: &MetaDocument) -> VaultResult<Bytes> {
    let json = doc
        .to_json()
        .map_err(|e| VaultError::IntegrityIssue(e.to_string()))?;
    let sealed = crypto::encrypt(ctx.keys.enc_key(), &json).map_err(VaultError::from)?;
    sealed.to_bytes().map_err(VaultError::from)
}

/// Whole-document index rewrite outside any larger transaction.
async fn write_meta_alone(ctx: &VaultContext, doc: &MetaDocument) -> VaultResult<()> {
    let payload = encrypt_meta(ctx, doc)?;
    ctx.store
        .put(Collection::Meta, META_INDEX_KEY, payload)
        .await?;
    Ok(())
}

fn decrypt_meta(ctx: &VaultContext, bytes: &[u8], now: i64) -> anyhow::Result<(MetaDocument, bool)> {
    let sealed = SealedBlob::from_bytes(bytes)?;
    let json = crypto::decrypt(ctx.keys.enc_key(), &sealed)?;
    MetaDocument::parse(&json, now)
}

/// Reads the index, migrating old schemas; on absence or any validation
/// failure, rebuilds it from whatever chains survive.
async fn load_or_rebuild_meta(
    ctx: &VaultContext,
    chains: &mut ChainManager,
    recovery: &mut RecoveryInfo,
) -> VaultResult<MetaDocument> {
    let now = now_ms();
    let stored = ctx.store.get(Collection::Meta, META_INDEX_KEY).await?;
    let had_index = stored.is_some();
    if let Some(bytes) = stored {
        match decrypt_meta(ctx, &bytes, now) {
            Ok((doc, migrated)) => {
                if migrated {
                    tracing::debug!("migrating metadata index to schema {META_SCHEMA_VERSION}");
                    write_meta_alone(ctx, &doc).await?;
                }
                return Ok(doc);
            }
            Err(err) => log::warn!("metadata index unreadable ({err}), rebuilding from chains"),
        }
    }

    let mut doc = MetaDocument::new_empty(now);
    for chain_id in ctx.store.list_keys(Collection::Chains).await? {
        let chain = match chains.load(ctx, &chain_id).await {
            Ok(chain) => chain,
            Err(err) => {
                log::warn!("rebuild skipping unreadable chain {chain_id}: {err}");
                continue;
            }
        };
        let Some(head) = chain.head() else {
            continue;
        };
        // Only resurrect files whose head payload still exists.
        if ctx
            .store
            .get(Collection::Files, &head.key)
            .await?
            .is_none()
        {
            continue;
        }
        let name = format!("recovered_{}", &chain_id[..chain_id.len().min(8)]);
        doc.files.insert(
            name.clone(),
            FileRecord {
                mime: DEFAULT_MIME.into(),
                chain_id: chain_id.clone(),
                head_version: head.version,
                last_modified: head.ts,
                last_size: head.size,
                last_compressed_size: 0,
                active_key: Some(head.key.clone()),
            },
        );
        recovery.recovered_files.push(name);
    }
    write_meta_alone(ctx, &doc).await?;
    recovery.index_rebuilt = had_index || !recovery.recovered_files.is_empty();
    Ok(doc)
}
