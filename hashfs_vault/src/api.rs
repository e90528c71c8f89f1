//! The public vault façade.
//!
//! `Vault::unlock` derives the session keys, runs init, spawns the
//! actor, and hands back a clonable handle. Every method sends one
//! request and awaits its responder; a dead actor (after `lock`) reads
//! as `Unauthenticated`.

use crate::actor::{VaultActor, VaultRequest};
use crate::context::VaultConfig;
use crate::engine::{Fingerprint, LoadedFile, RecoveryInfo, SaveOptions, SaveOutcome, VaultEngine};
use crate::error::{VaultError, VaultResult};
use crate::integrity::IntegrityReport;
use crate::interchange::{ImportFileItem, ImportItem};
use crate::meta::FileSummary;
use crate::progress::ProgressEvent;
use bytes::Bytes;
use hashfs_core::store::StoreOpener;
use tokio::sync::{mpsc, oneshot};

/// Everything a successful unlock yields.
pub struct Unlocked {
    pub vault: Vault,
    /// Sorted file summaries at unlock time.
    pub files: Vec<FileSummary>,
    pub fingerprint: Fingerprint,
    /// Present when init had to rebuild anything.
    pub recovery: Option<RecoveryInfo>,
    /// Side-band progress events of long-running operations.
    pub progress: mpsc::UnboundedReceiver<ProgressEvent>,
}

/// Clonable handle to one unlocked vault session.
#[derive(Clone)]
pub struct Vault {
    sender: mpsc::Sender<VaultRequest>,
}

impl Vault {
    /// Unlocks (or creates) the vault addressed by `passphrase`.
    ///
    /// A failed init never yields a handle; the derived keys are
    /// dropped on the error path.
    pub async fn unlock(
        passphrase: &str,
        opener: &dyn StoreOpener,
        config: VaultConfig,
    ) -> VaultResult<Unlocked> {
        let (engine, outcome) = VaultEngine::init(passphrase, opener, config).await?;
        let (sender, progress) = VaultActor::spawn(engine);
        Ok(Unlocked {
            vault: Vault { sender },
            files: outcome.files,
            fingerprint: outcome.fingerprint,
            recovery: outcome.recovery,
            progress,
        })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> VaultRequest,
    ) -> VaultResult<T> {
        let (responder, receiver) = oneshot::channel();
        self.sender
            .send(build(responder))
            .await
            .map_err(|_| VaultError::Unauthenticated)?;
        receiver.await.map_err(|_| VaultError::Unauthenticated)
    }

    /// Sorted file summaries.
    pub async fn get_files(&self) -> VaultResult<Vec<FileSummary>> {
        self.request(|responder| VaultRequest::GetFiles { responder })
            .await
    }

    /// Reads a file version (latest when `version` is `None`); pass
    /// `validate` to run full chain validation on the way.
    pub async fn load(
        &self,
        name: &str,
        version: Option<u64>,
        validate: bool,
    ) -> VaultResult<LoadedFile> {
        self.request(|responder| VaultRequest::Load {
            name: name.to_string(),
            version,
            validate,
            responder,
        })
        .await?
    }

    /// Writes a new version of `name`.
    pub async fn save(
        &self,
        name: &str,
        bytes: impl Into<Bytes>,
        mime: Option<&str>,
        options: Option<SaveOptions>,
    ) -> VaultResult<SaveOutcome> {
        let bytes = bytes.into();
        self.request(|responder| VaultRequest::Save {
            name: name.to_string(),
            bytes,
            mime: mime.map(str::to_string),
            options,
            responder,
        })
        .await?
    }

    /// Removes a file, its history, and all its payloads.
    pub async fn delete(&self, name: &str) -> VaultResult<Vec<FileSummary>> {
        self.request(|responder| VaultRequest::Delete {
            name: name.to_string(),
            responder,
        })
        .await?
    }

    /// Moves a file to a new name, history intact.
    pub async fn rename(&self, old_name: &str, new_name: &str) -> VaultResult<Vec<FileSummary>> {
        self.request(|responder| VaultRequest::Rename {
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
            responder,
        })
        .await?
    }

    /// Exports all current file contents (plus MIME sidecar) as a ZIP.
    pub async fn export_zip(&self, operation_id: Option<&str>) -> VaultResult<Bytes> {
        let operation_id = operation_id.map(str::to_string);
        self.request(|responder| VaultRequest::ExportZip {
            operation_id,
            responder,
        })
        .await?
    }

    /// Unpacks a ZIP into importable items; call `save` per item to
    /// write them through the normal pipeline.
    pub async fn import_zip(
        &self,
        bytes: impl Into<Bytes>,
        operation_id: Option<&str>,
    ) -> VaultResult<Vec<ImportItem>> {
        let bytes = bytes.into();
        let operation_id = operation_id.map(str::to_string);
        self.request(|responder| VaultRequest::ImportZip {
            bytes,
            operation_id,
            responder,
        })
        .await?
    }

    /// Prepares host-picked files for import; same item shape as
    /// `import_zip`.
    pub async fn import_files(
        &self,
        items: Vec<ImportFileItem>,
        operation_id: Option<&str>,
    ) -> VaultResult<Vec<ImportItem>> {
        let operation_id = operation_id.map(str::to_string);
        self.request(|responder| VaultRequest::ImportFiles {
            items,
            operation_id,
            responder,
        })
        .await
    }

    /// Full-vault validation, unrecoverable-file removal, orphan sweep.
    pub async fn integrity_check(&self) -> VaultResult<IntegrityReport> {
        self.request(|responder| VaultRequest::IntegrityCheck {
            operation_id: None,
            responder,
        })
        .await?
    }

    /// Ends the session. The engine and its keys drop; every clone of
    /// this handle turns `Unauthenticated`.
    pub async fn lock(&self) -> VaultResult<()> {
        self.request(|responder| VaultRequest::Lock { responder })
            .await
    }
}
