//! Side-band progress events for long-running operations.

use tokio::sync::mpsc;

/// One progress tick of a ZIP export/import or integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub operation_id: String,
    pub completed: u64,
    pub total: u64,
    /// Name of the item currently being processed.
    pub current: String,
}

/// Sender half handed into the engine; dropped receivers are ignored,
/// progress is advisory.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, operation_id: &str, completed: u64, total: u64, current: &str) {
        let _ = self.tx.send(ProgressEvent {
            operation_id: operation_id.to_string(),
            completed,
            total,
            current: current.to_string(),
        });
    }
}
