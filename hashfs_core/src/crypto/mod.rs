//! Cryptographic primitives for the HashFS vault.
//!
//! Three concerns live here:
//! - `kdf` — passphrase to session keys (scrypt + HKDF-SHA256)
//! - `aead` — AES-256-GCM sealing and the stored `SealedBlob` envelope
//! - `sign` — Ed25519 signatures over content hashes

use thiserror::Error;

pub mod aead;
pub mod kdf;
pub mod sign;

pub use aead::{SealedBlob, decrypt, encrypt};
pub use kdf::{CRYPTO_VERSION_TAG, MIN_PASSPHRASE_BYTES, VaultKeys};
pub use sign::{sign_bytes, sign_hex, verify_bytes, verify_hex};

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("passphrase too short: need at least {MIN_PASSPHRASE_BYTES} bytes")]
    PassphraseTooShort,
    #[error("key derivation failed: {0}")]
    Kdf(String),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,
    #[error("malformed storage envelope: {0}")]
    Envelope(String),
    #[error("random number generation failed")]
    RngFailed,
}
