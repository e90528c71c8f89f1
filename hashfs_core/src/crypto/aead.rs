//! AES-256-GCM sealing and the stored envelope format.
//!
//! Every value persisted by the vault is a `SealedBlob`: a fresh random
//! 12-byte IV plus the AES-256-GCM ciphertext (tag included). Chain blobs
//! additionally carry an Ed25519 signature over the blake3 hash of the
//! *compressed pre-encryption* bytes, so tampering is detectable before
//! the payload is even inflated.

use crate::crypto::CryptoError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use bytes::Bytes;
use minicbor::bytes::ByteVec;
use minicbor::{CborLen, Decode, Encode};

/// Encrypted payload as persisted in the key-value store.
#[derive(Encode, Decode, CborLen, Clone, Debug)]
#[cbor(map)]
pub struct SealedBlob {
    #[n(0)]
    #[cbor(with = "minicbor::bytes")]
    pub iv: [u8; 12],
    #[n(1)]
    pub ciphertext: ByteVec,
    /// Ed25519 signature; present on chain blobs only.
    #[n(2)]
    pub sig: Option<ByteVec>,
}

impl SealedBlob {
    /// Decodes an envelope from its CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        minicbor::decode(bytes).map_err(|e| CryptoError::Envelope(e.to_string()))
    }

    /// Encodes this envelope to CBOR as a `Bytes` buffer.
    pub fn to_bytes(&self) -> Result<Bytes, CryptoError> {
        minicbor::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| CryptoError::Envelope(e.to_string()))
    }

    /// Attaches a signature, consuming and returning the envelope.
    pub fn with_sig(mut self, sig: Vec<u8>) -> Self {
        self.sig = Some(ByteVec::from(sig));
        self
    }
}

/// Encrypts `plaintext` under `key` with a fresh random IV.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<SealedBlob, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(SealedBlob {
        iv: nonce.into(),
        ciphertext: ByteVec::from(ciphertext),
        sig: None,
    })
}

/// Decrypts a sealed envelope, failing on any tag mismatch.
pub fn decrypt(key: &[u8; 32], blob: &SealedBlob) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(&blob.iv), blob.ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_round_trip() {
        let key = [42u8; 32];
        let sealed = encrypt(&key, b"Hello, vault!").unwrap();
        let plain = decrypt(&key, &sealed).unwrap();
        assert_eq!(plain, b"Hello, vault!");
    }

    #[test]
    fn fresh_iv_per_call() {
        let key = [42u8; 32];
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = [42u8; 32];
        let mut sealed = encrypt(&key, b"payload").unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(matches!(
            decrypt(&key, &sealed),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = encrypt(&[1u8; 32], b"payload").unwrap();
        assert!(decrypt(&[2u8; 32], &sealed).is_err());
    }

    #[test]
    fn envelope_cbor_round_trip() {
        let key = [7u8; 32];
        let sealed = encrypt(&key, b"enveloped").unwrap().with_sig(vec![9u8; 64]);
        let bytes = sealed.to_bytes().unwrap();
        let decoded = SealedBlob::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.iv, sealed.iv);
        assert_eq!(decoded.ciphertext, sealed.ciphertext);
        assert_eq!(decoded.sig, sealed.sig);
        assert_eq!(decrypt(&key, &decoded).unwrap(), b"enveloped");
    }
}
