//! Passphrase key derivation and vault identity.
//!
//! ## Key Derivation Chain
//!
//! ```text
//! passphrase (NFC-normalized, trimmed, >= 8 bytes)
//!     |
//!     v
//! scrypt(N=2^17, r=8, p=1, salt="hashfs-vault-v6") -> master [32 bytes]
//!     |
//!     +-- HKDF-SHA256(salt, info="signing")    -> sig_key  (Ed25519 seed)
//!     |       |
//!     |       +-> pub_key (Ed25519 verifying key)
//!     |               |
//!     |               +-> vault_id = hex(blake3(pub_key)[0..16])
//!     |
//!     +-- HKDF-SHA256(salt, info="encryption") -> enc_key  (AES-256-GCM)
//! ```
//!
//! The crypto version is baked into the scrypt salt, so bumping it yields
//! an entirely new vault identity for the same passphrase.

use crate::crypto::CryptoError;
use ed25519_dalek::{SigningKey, VerifyingKey};
use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroize;

/// Version tag appended to every vault namespace.
pub const CRYPTO_VERSION_TAG: &str = "v6";

/// Minimum passphrase length in bytes after normalization.
pub const MIN_PASSPHRASE_BYTES: usize = 8;

/// scrypt salt; carries the crypto version.
const KDF_SALT: &[u8] = b"hashfs-vault-v6";

const SCRYPT_LOG_N: u8 = 17;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// The session key set derived from a passphrase.
///
/// Keys never leave this struct except through borrowed accessors; the
/// encryption key is scrubbed on drop.
pub struct VaultKeys {
    sig_key: SigningKey,
    pub_key: VerifyingKey,
    enc_key: [u8; 32],
}

impl fmt::Debug for VaultKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultKeys")
            .field("vault_id", &self.vault_id())
            .finish_non_exhaustive()
    }
}

impl VaultKeys {
    /// Derives the full session key set from a passphrase.
    pub fn derive(passphrase: &str) -> Result<Self, CryptoError> {
        let normalized: String = passphrase.nfc().collect();
        let trimmed = normalized.trim();
        if trimmed.len() < MIN_PASSPHRASE_BYTES {
            return Err(CryptoError::PassphraseTooShort);
        }

        let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        let mut master = [0u8; 32];
        scrypt::scrypt(trimmed.as_bytes(), KDF_SALT, &params, &mut master)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;

        let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), &master);
        let mut sig_seed = [0u8; 32];
        let mut enc_key = [0u8; 32];
        hk.expand(b"signing", &mut sig_seed)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        hk.expand(b"encryption", &mut enc_key)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        master.zeroize();

        let sig_key = SigningKey::from_bytes(&sig_seed);
        sig_seed.zeroize();
        let pub_key = sig_key.verifying_key();

        Ok(Self {
            sig_key,
            pub_key,
            enc_key,
        })
    }

    /// The Ed25519 signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.sig_key
    }

    /// The Ed25519 verifying key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.pub_key
    }

    /// The AES-256-GCM encryption key.
    pub fn enc_key(&self) -> &[u8; 32] {
        &self.enc_key
    }

    /// Vault id: hex of the first 16 bytes of blake3 over the public key.
    pub fn vault_id(&self) -> String {
        let digest = blake3::hash(self.pub_key.as_bytes());
        hex::encode(&digest.as_bytes()[..16])
    }

    /// Storage namespace for this vault: `<vault_id>-<crypto version tag>`.
    pub fn namespace(&self) -> String {
        format!("{}-{}", self.vault_id(), CRYPTO_VERSION_TAG)
    }
}

impl Drop for VaultKeys {
    fn drop(&mut self) {
        // Best-effort key scrubbing; the dalek signing key zeroizes itself.
        self.enc_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_passphrase() {
        assert!(matches!(
            VaultKeys::derive("short"),
            Err(CryptoError::PassphraseTooShort)
        ));
        // Whitespace padding does not rescue a short passphrase.
        assert!(matches!(
            VaultKeys::derive("   abc   "),
            Err(CryptoError::PassphraseTooShort)
        ));
    }

    #[test]
    fn derivation_is_deterministic_and_isolated() {
        let a1 = VaultKeys::derive("correct horse battery staple").unwrap();
        let a2 = VaultKeys::derive("correct horse battery staple").unwrap();
        let b = VaultKeys::derive("a different passphrase").unwrap();

        assert_eq!(a1.vault_id(), a2.vault_id());
        assert_eq!(a1.enc_key(), a2.enc_key());
        assert_ne!(a1.vault_id(), b.vault_id());
        assert_ne!(a1.enc_key(), b.enc_key());
        assert!(a1.namespace().ends_with(CRYPTO_VERSION_TAG));
        assert_eq!(a1.vault_id().len(), 32);
    }
}
