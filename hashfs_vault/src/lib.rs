//! # HashFS vault engine
//!
//! A client-side encrypted, versioned, content-addressed file vault.
//! A passphrase unlocks a session; files are written whole, compressed
//! and sealed under AES-256-GCM, and every write appends a signed entry
//! to the file's hash chain so reads can prove what they return.
//!
//! ## Layers
//! 1. `chain` / `meta` – pure data structures (JSON encoded).
//! 2. `chains` – verified chain load/save with a bounded LRU cache.
//! 3. `engine` – the operations: init, load, save, delete, rename,
//!    ZIP export/import, integrity check.
//! 4. `actor` – single-threaded state machine that owns one engine and
//!    processes requests sequentially.
//! 5. `api` – ergonomic façade ([`Vault`]) that applications use.

mod actor;
mod api;
mod context;
mod engine;
pub mod chain;
pub mod chains;
pub mod error;
pub mod integrity;
pub mod interchange;
pub mod meta;
pub mod progress;

pub use actor::VaultRequest;
pub use api::{Unlocked, Vault};
pub use context::VaultConfig;
pub use engine::{
    AvailableVersions, Fingerprint, InitOutcome, LoadedFile, RecoveryInfo, SaveOptions,
    SaveOutcome,
};
pub use error::{VaultError, VaultResult};
pub use integrity::{IntegrityIssue, IntegrityReport};
pub use interchange::{ImportFileItem, ImportItem, ImportedData};
pub use meta::FileSummary;
pub use progress::ProgressEvent;

/// Default bound on retained versions per file.
pub const DEFAULT_VERSION_LIMIT: usize = 15;

/// Default capacity of the chain cache.
pub const DEFAULT_CHAIN_CACHE_CAPACITY: usize = 20;
