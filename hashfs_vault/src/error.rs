//! Public error type for the vault engine.
//!
//! Every failure that crosses the engine boundary is one of these named
//! kinds, carrying filename/version context where it exists. Errors from
//! the core crates are folded in here; no foreign types leak.

use hashfs_core::codec::CodecError;
use hashfs_core::crypto::CryptoError;
use hashfs_core::store::StoreError;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault is locked")]
    Unauthenticated,

    #[error("passphrase too short")]
    PassphraseTooShort,

    #[error("key derivation failed: {0}")]
    KdfFailure(String),

    #[error("file not found: {name}")]
    NotFound { name: String },

    #[error("version {version} of {name} is not retained")]
    VersionNotFound { name: String, version: u64 },

    #[error("file {name} is corrupt beyond recovery")]
    FileCorrupt { name: String },

    #[error("version {version} of {name} is corrupt")]
    VersionCorrupt { name: String, version: u64 },

    #[error("chain {chain_id} failed verification")]
    ChainCorrupt {
        chain_id: String,
        version: Option<u64>,
    },

    #[error("content hash mismatch for {name} version {version}")]
    HashMismatch { name: String, version: u64 },

    #[error("signature verification failed for {name} version {version}")]
    SignatureInvalid { name: String, version: u64 },

    #[error("decryption failed")]
    DecryptFailure,

    #[error("cannot rename to existing file: {name}")]
    RenameConflict { name: String },

    #[error("invalid rename: {reason}")]
    RenameInvalid { reason: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("integrity issue: {0}")]
    IntegrityIssue(String),
}

impl VaultError {
    /// True for the corruption-class kinds that the latest-version read
    /// path converts into recovery or removal.
    pub fn is_integrity_kind(&self) -> bool {
        matches!(
            self,
            VaultError::FileCorrupt { .. }
                | VaultError::VersionCorrupt { .. }
                | VaultError::ChainCorrupt { .. }
                | VaultError::HashMismatch { .. }
                | VaultError::SignatureInvalid { .. }
                | VaultError::DecryptFailure
                | VaultError::IntegrityIssue(_)
        )
    }
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        VaultError::StoreUnavailable(err.to_string())
    }
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::PassphraseTooShort => VaultError::PassphraseTooShort,
            CryptoError::Kdf(msg) => VaultError::KdfFailure(msg),
            CryptoError::DecryptionFailed | CryptoError::Envelope(_) => VaultError::DecryptFailure,
            other => VaultError::IntegrityIssue(other.to_string()),
        }
    }
}

impl From<CodecError> for VaultError {
    fn from(err: CodecError) -> Self {
        // Inflate runs on authenticated plaintext, so a codec failure
        // means the stored payload is damaged, not the medium.
        VaultError::IntegrityIssue(err.to_string())
    }
}
