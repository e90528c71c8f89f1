//! The vault actor: one task owns the engine and drains requests FIFO.
//!
//! Callers never touch the engine directly; they send a `VaultRequest`
//! carrying a oneshot responder and await it. The receiver might have
//! been dropped if the caller stopped caring, so responder sends are
//! best-effort — the engine still drives every accepted request to
//! completion to keep the vault invariants intact.

use crate::engine::{LoadedFile, SaveOptions, SaveOutcome, VaultEngine};
use crate::error::VaultResult;
use crate::integrity::IntegrityReport;
use crate::interchange::{ImportFileItem, ImportItem};
use crate::meta::FileSummary;
use crate::progress::{ProgressEvent, ProgressSender};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Messages accepted by the vault actor.
#[derive(Debug)]
pub enum VaultRequest {
    GetFiles {
        responder: oneshot::Sender<Vec<FileSummary>>,
    },
    Load {
        name: String,
        version: Option<u64>,
        validate: bool,
        responder: oneshot::Sender<VaultResult<LoadedFile>>,
    },
    Save {
        name: String,
        bytes: Bytes,
        mime: Option<String>,
        options: Option<SaveOptions>,
        responder: oneshot::Sender<VaultResult<SaveOutcome>>,
    },
    Delete {
        name: String,
        responder: oneshot::Sender<VaultResult<Vec<FileSummary>>>,
    },
    Rename {
        old_name: String,
        new_name: String,
        responder: oneshot::Sender<VaultResult<Vec<FileSummary>>>,
    },
    ExportZip {
        operation_id: Option<String>,
        responder: oneshot::Sender<VaultResult<Bytes>>,
    },
    ImportZip {
        bytes: Bytes,
        operation_id: Option<String>,
        responder: oneshot::Sender<VaultResult<Vec<ImportItem>>>,
    },
    ImportFiles {
        items: Vec<ImportFileItem>,
        operation_id: Option<String>,
        responder: oneshot::Sender<Vec<ImportItem>>,
    },
    IntegrityCheck {
        operation_id: Option<String>,
        responder: oneshot::Sender<VaultResult<IntegrityReport>>,
    },
    /// Ends the session; the engine (and its keys) drop with the actor.
    Lock {
        responder: oneshot::Sender<()>,
    },
}

pub(crate) struct VaultActor {
    engine: VaultEngine,
    receiver: mpsc::Receiver<VaultRequest>,
    progress: ProgressSender,
}

impl VaultActor {
    /// Spawns the actor task, returning the request sender and the
    /// side-band progress stream.
    pub(crate) fn spawn(
        engine: VaultEngine,
    ) -> (
        mpsc::Sender<VaultRequest>,
        mpsc::UnboundedReceiver<ProgressEvent>,
    ) {
        let (sender, receiver) = mpsc::channel(64);
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let actor = VaultActor {
            engine,
            receiver,
            progress: ProgressSender::new(progress_tx),
        };
        tokio::spawn(actor.run());
        (sender, progress_rx)
    }

    async fn run(mut self) {
        while let Some(msg) = self.receiver.recv().await {
            if !self.process(msg).await {
                break;
            }
        }
        tracing::debug!("vault actor stopped, session keys dropped");
    }

    /// Handles one request; returns false when the session should end.
    async fn process(&mut self, msg: VaultRequest) -> bool {
        match msg {
            VaultRequest::GetFiles { responder } => {
                let _ = responder.send(self.engine.files());
            }
            VaultRequest::Load {
                name,
                version,
                validate,
                responder,
            } => {
                let result = self.engine.load(&name, version, validate).await;
                let _ = responder.send(result);
            }
            VaultRequest::Save {
                name,
                bytes,
                mime,
                options,
                responder,
            } => {
                let result = self
                    .engine
                    .save(&name, &bytes, mime.as_deref(), options)
                    .await;
                let _ = responder.send(result);
            }
            VaultRequest::Delete { name, responder } => {
                let result = self.engine.delete(&name).await;
                let _ = responder.send(result);
            }
            VaultRequest::Rename {
                old_name,
                new_name,
                responder,
            } => {
                let result = self.engine.rename(&old_name, &new_name).await;
                let _ = responder.send(result);
            }
            VaultRequest::ExportZip {
                operation_id,
                responder,
            } => {
                let op = operation_id.unwrap_or_else(|| format!("export-{}", Uuid::new_v4()));
                let progress = self.progress.clone();
                let result = self
                    .engine
                    .export_zip(|completed, total, current| {
                        progress.emit(&op, completed, total, current)
                    })
                    .await;
                let _ = responder.send(result);
            }
            VaultRequest::ImportZip {
                bytes,
                operation_id,
                responder,
            } => {
                let op = operation_id.unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
                let progress = self.progress.clone();
                let result = self.engine.import_zip(&bytes, |completed, total, current| {
                    progress.emit(&op, completed, total, current)
                });
                let _ = responder.send(result);
            }
            VaultRequest::ImportFiles {
                items,
                operation_id,
                responder,
            } => {
                let op = operation_id.unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
                let progress = self.progress.clone();
                let result = self.engine.import_files(items, |completed, total, current| {
                    progress.emit(&op, completed, total, current)
                });
                let _ = responder.send(result);
            }
            VaultRequest::IntegrityCheck {
                operation_id,
                responder,
            } => {
                let op = operation_id.unwrap_or_else(|| format!("integrity-{}", Uuid::new_v4()));
                let progress = self.progress.clone();
                let result = self
                    .engine
                    .integrity_check(|completed, total, current| {
                        progress.emit(&op, completed, total, current)
                    })
                    .await;
                let _ = responder.send(result);
            }
            VaultRequest::Lock { responder } => {
                let _ = responder.send(());
                return false;
            }
        }
        true
    }
}
