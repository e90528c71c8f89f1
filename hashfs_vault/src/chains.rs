//! The chain manager: verified load/save of version chains, bounded by
//! an LRU cache.
//!
//! Chain blobs are stored as `SealedBlob` envelopes whose signature
//! covers the blake3 digest of the compressed (pre-encryption) JSON, so
//! verification decrypts first, checks the signature over the compressed
//! bytes, and only then inflates and parses. Parsed chains additionally
//! carry a chain-level hash and signature over their version history;
//! legacy chains lacking those are upgraded in place on first access.

use crate::chain::{Chain, VersionEntry};
use crate::context::VaultContext;
use crate::error::{VaultError, VaultResult};
use hashfs_core::Hash;
use hashfs_core::codec;
use hashfs_core::crypto::{self, SealedBlob};
use hashfs_core::store::Collection;
use lru::LruCache;
use std::num::NonZeroUsize;

fn corrupt(chain_id: &str, version: Option<u64>) -> VaultError {
    VaultError::ChainCorrupt {
        chain_id: chain_id.to_string(),
        version,
    }
}

/// Decrypts, inflates and verifies one version's payload against its
/// chain entry, returning the plaintext.
pub fn verify_payload(
    ctx: &VaultContext,
    name: &str,
    entry: &VersionEntry,
    bytes: &[u8],
) -> VaultResult<Vec<u8>> {
    let sealed = SealedBlob::from_bytes(bytes).map_err(|_| VaultError::DecryptFailure)?;
    let compressed = crypto::decrypt(ctx.keys.enc_key(), &sealed)
        .map_err(|_| VaultError::DecryptFailure)?;
    let plaintext = codec::inflate(&compressed).map_err(|_| VaultError::VersionCorrupt {
        name: name.to_string(),
        version: entry.version,
    })?;
    let hash_hex = Hash::new(&plaintext).to_hex();
    if hash_hex != entry.hash {
        return Err(VaultError::HashMismatch {
            name: name.to_string(),
            version: entry.version,
        });
    }
    if !crypto::verify_hex(ctx.keys.verifying_key(), &hash_hex, &entry.sig) {
        return Err(VaultError::SignatureInvalid {
            name: name.to_string(),
            version: entry.version,
        });
    }
    Ok(plaintext)
}

/// Full integrity validation of a chain: every retained version must be
/// present, decrypt, rehash and verify. The first failure is reported as
/// `ChainCorrupt` with the offending version number.
pub async fn validate_chain(
    ctx: &VaultContext,
    chain_id: &str,
    name: &str,
    chain: &Chain,
) -> VaultResult<()> {
    for entry in &chain.versions {
        let Some(bytes) = ctx.store.get(Collection::Files, &entry.key).await? else {
            return Err(corrupt(chain_id, Some(entry.version)));
        };
        verify_payload(ctx, name, entry, &bytes)
            .map_err(|_| corrupt(chain_id, Some(entry.version)))?;
    }
    Ok(())
}

/// Envelope decode + signature check + decrypt + inflate + parse.
fn decode_chain_blob(ctx: &VaultContext, chain_id: &str, bytes: &[u8]) -> VaultResult<Chain> {
    let sealed = SealedBlob::from_bytes(bytes).map_err(|_| corrupt(chain_id, None))?;
    let Some(sig) = sealed.sig.as_deref() else {
        return Err(corrupt(chain_id, None));
    };
    let sig = sig.to_vec();
    let compressed =
        crypto::decrypt(ctx.keys.enc_key(), &sealed).map_err(|_| corrupt(chain_id, None))?;
    let payload_hash = Hash::new(&compressed);
    if !crypto::verify_bytes(ctx.keys.verifying_key(), payload_hash.as_bytes(), &sig) {
        return Err(corrupt(chain_id, None));
    }
    let json = codec::inflate(&compressed).map_err(|_| corrupt(chain_id, None))?;
    Chain::from_json(&json).map_err(|_| corrupt(chain_id, None))
}

/// Write-through LRU of verified chains, keyed by chain id.
pub struct ChainManager {
    cache: LruCache<String, Chain>,
}

impl ChainManager {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Fetches and verifies the chain for `chain_id`. A cache hit
    /// re-promotes; a missing chain reads as empty so fresh files can
    /// use the append path.
    pub async fn load(&mut self, ctx: &VaultContext, chain_id: &str) -> VaultResult<Chain> {
        if let Some(chain) = self.cache.get(chain_id) {
            return Ok(chain.clone());
        }
        let Some(bytes) = ctx.store.get(Collection::Chains, chain_id).await? else {
            return Ok(Chain::empty());
        };
        let chain = decode_chain_blob(ctx, chain_id, &bytes)?;

        if chain.chain_hash.is_none() && chain.chain_sig.is_none() {
            // Legacy chain: compute, sign and rewrite.
            tracing::debug!("upgrading legacy chain {chain_id}");
            return self.save(ctx, chain_id, chain).await;
        }

        let computed = chain
            .compute_hash()
            .ok_or_else(|| corrupt(chain_id, None))?
            .to_hex();
        let stored = chain.chain_hash.as_deref().ok_or_else(|| corrupt(chain_id, None))?;
        let sig = chain.chain_sig.as_deref().ok_or_else(|| corrupt(chain_id, None))?;
        if stored != computed || !crypto::verify_hex(ctx.keys.verifying_key(), &computed, sig) {
            return Err(corrupt(chain_id, None));
        }

        self.cache.put(chain_id.to_string(), chain.clone());
        Ok(chain)
    }

    /// Seals the chain (recomputed hash + fresh signatures), persists it
    /// under `chain_id`, and write-through caches it.
    pub async fn save(
        &mut self,
        ctx: &VaultContext,
        chain_id: &str,
        mut chain: Chain,
    ) -> VaultResult<Chain> {
        let hash_hex = chain
            .compute_hash()
            .ok_or_else(|| corrupt(chain_id, None))?
            .to_hex();
        chain.chain_sig = Some(crypto::sign_hex(ctx.keys.signing_key(), &hash_hex));
        chain.chain_hash = Some(hash_hex);

        let json = chain
            .to_json()
            .map_err(|e| VaultError::IntegrityIssue(e.to_string()))?;
        let compressed = codec::compress(&json)?;
        let payload_hash = Hash::new(&compressed);
        let sig = crypto::sign_bytes(ctx.keys.signing_key(), payload_hash.as_bytes());
        let sealed = crypto::encrypt(ctx.keys.enc_key(), &compressed)
            .map_err(VaultError::from)?
            .with_sig(sig);
        let bytes = sealed.to_bytes().map_err(VaultError::from)?;

        ctx.store.put(Collection::Chains, chain_id, bytes).await?;
        self.cache.put(chain_id.to_string(), chain.clone());
        Ok(chain)
    }

    /// Appends one version entry, prunes to `version_limit`, and
    /// persists. Returns the blob keys dropped by pruning; deleting them
    /// is the caller's (separate) transaction.
    pub async fn append(
        &mut self,
        ctx: &VaultContext,
        chain_id: &str,
        entry: VersionEntry,
        version_limit: usize,
    ) -> VaultResult<Vec<String>> {
        let mut chain = self.load(ctx, chain_id).await?;
        chain.push(entry);
        let dropped = chain.prune_to(version_limit);
        self.save(ctx, chain_id, chain).await?;
        Ok(dropped)
    }

    /// Drops a chain from the cache (delete and recovery paths).
    pub fn evict(&mut self, chain_id: &str) {
        self.cache.pop(chain_id);
    }

    #[cfg(test)]
    pub(crate) fn is_cached(&self, chain_id: &str) -> bool {
        self.cache.contains(chain_id)
    }
}
