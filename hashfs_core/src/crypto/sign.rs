//! Ed25519 signatures over content hashes.
//!
//! Version entries sign the hex rendering of the content hash; chain
//! envelopes sign the raw blake3 digest of the compressed bytes. Both
//! verify functions are total: malformed input verifies as `false`,
//! never as an error.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Signs a hash-hex string, returning the signature as hex.
pub fn sign_hex(key: &SigningKey, hash_hex: &str) -> String {
    hex::encode(key.sign(hash_hex.as_bytes()).to_bytes())
}

/// Verifies a hex signature over a hash-hex string.
pub fn verify_hex(key: &VerifyingKey, hash_hex: &str, sig_hex: &str) -> bool {
    let Ok(raw) = hex::decode(sig_hex) else {
        return false;
    };
    verify_bytes(key, hash_hex.as_bytes(), &raw)
}

/// Signs raw bytes, returning the 64-byte signature.
pub fn sign_bytes(key: &SigningKey, msg: &[u8]) -> Vec<u8> {
    key.sign(msg).to_bytes().to_vec()
}

/// Verifies a raw signature over raw bytes.
pub fn verify_bytes(key: &VerifyingKey, msg: &[u8], sig: &[u8]) -> bool {
    let Ok(sig) = Signature::from_slice(sig) else {
        return false;
    };
    key.verify(msg, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[11u8; 32])
    }

    #[test]
    fn sign_verify_round_trip() {
        let key = test_key();
        let hash_hex = blake3::hash(b"content").to_hex().to_string();
        let sig = sign_hex(&key, &hash_hex);
        assert!(verify_hex(&key.verifying_key(), &hash_hex, &sig));
    }

    #[test]
    fn verify_is_total_on_garbage() {
        let key = test_key();
        assert!(!verify_hex(&key.verifying_key(), "deadbeef", "not hex"));
        assert!(!verify_hex(&key.verifying_key(), "deadbeef", "abcd"));
        assert!(!verify_bytes(&key.verifying_key(), b"msg", &[0u8; 10]));
    }

    #[test]
    fn wrong_message_fails() {
        let key = test_key();
        let sig = sign_hex(&key, "aaaa");
        assert!(!verify_hex(&key.verifying_key(), "bbbb", &sig));
    }
}
