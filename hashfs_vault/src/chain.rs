//! Pure data structures and on-disk (JSON) schema for version chains.
//!
//! A chain is the ordered version history of one logical file. This
//! module contains no I/O or async code; loading, verification and
//! persistence live in [`crate::chains`].

use hashfs_core::Hash;
use serde::{Deserialize, Serialize};

/// Domain separator prefixed to every chain hash computation.
pub const CHAIN_HASH_DOMAIN: &str = "HashFS-Chain-v6";

/// One committed write of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// 1-based, monotone per file.
    pub version: u64,
    /// blake3 of the plaintext content, hex.
    pub hash: String,
    /// Ed25519 signature over `hash`, hex.
    pub sig: String,
    /// Blob key of the encrypted compressed payload.
    pub key: String,
    /// Plaintext length in bytes.
    pub size: u64,
    /// Millisecond epoch timestamp of the write.
    pub ts: i64,
}

/// How much history has been pruned away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneInfo {
    /// Total entries dropped over the chain's lifetime.
    pub count: u64,
    /// Smallest retained version number; 0 before any pruning.
    pub oldest_kept: u64,
}

/// The version history of one file, with a chain-level signature.
///
/// `chain_hash`/`chain_sig` are optional on the wire: chains written by
/// older vaults lack them and are upgraded on first access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chain {
    pub versions: Vec<VersionEntry>,
    #[serde(default)]
    pub pruned: PruneInfo,
    #[serde(rename = "chainHash", skip_serializing_if = "Option::is_none", default)]
    pub chain_hash: Option<String>,
    #[serde(rename = "chainSig", skip_serializing_if = "Option::is_none", default)]
    pub chain_sig: Option<String>,
}

impl Chain {
    /// An empty chain, the state of a file before its first write.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decodes a chain from its JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Encodes this chain to JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// The newest version entry, if any.
    pub fn head(&self) -> Option<&VersionEntry> {
        self.versions.last()
    }

    /// Looks up a retained version by number.
    pub fn entry(&self, version: u64) -> Option<&VersionEntry> {
        self.versions.iter().find(|entry| entry.version == version)
    }

    /// Smallest retained version number.
    pub fn min_version(&self) -> u64 {
        self.versions.first().map_or(0, |entry| entry.version)
    }

    /// Largest retained version number.
    pub fn max_version(&self) -> u64 {
        self.versions.last().map_or(0, |entry| entry.version)
    }

    /// Blob keys of every retained version.
    pub fn blob_keys(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(|entry| entry.key.as_str())
    }

    /// Appends a new version entry at the tail.
    pub fn push(&mut self, entry: VersionEntry) {
        self.versions.push(entry);
    }

    /// Drops oldest entries until at most `limit` remain, returning the
    /// blob keys of the dropped entries. Updates `pruned` bookkeeping.
    pub fn prune_to(&mut self, limit: usize) -> Vec<String> {
        if self.versions.len() <= limit {
            return Vec::new();
        }
        let excess = self.versions.len() - limit;
        let dropped: Vec<String> = self
            .versions
            .drain(..excess)
            .map(|entry| entry.key)
            .collect();
        self.pruned.count += dropped.len() as u64;
        self.pruned.oldest_kept = self.min_version();
        dropped
    }

    /// Drops every entry strictly newer than `version`, returning the
    /// dropped entries. Used when the head is recovered to an earlier
    /// version after blob loss.
    pub fn truncate_after(&mut self, version: u64) -> Vec<VersionEntry> {
        let keep = self
            .versions
            .iter()
            .position(|entry| entry.version > version)
            .unwrap_or(self.versions.len());
        self.versions.split_off(keep)
    }

    /// blake3 over the domain separator followed by each version's
    /// content hash bytes, in order.
    ///
    /// Returns `None` when a stored version hash is not valid hex, which
    /// callers treat as chain corruption.
    pub fn compute_hash(&self) -> Option<Hash> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CHAIN_HASH_DOMAIN.as_bytes());
        for entry in &self.versions {
            let hash = Hash::from_hex(&entry.hash)?;
            hasher.update(hash.as_bytes());
        }
        Some(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: u64, payload: &[u8]) -> VersionEntry {
        VersionEntry {
            version,
            hash: Hash::new(payload).to_hex(),
            sig: String::new(),
            key: format!("blob-{version}"),
            size: payload.len() as u64,
            ts: 1_700_000_000_000 + version as i64,
        }
    }

    #[test]
    fn chain_hash_is_domain_separated() {
        let chain = Chain::empty();
        let empty_hash = chain.compute_hash().unwrap();
        assert_eq!(
            empty_hash,
            Hash::new(CHAIN_HASH_DOMAIN.as_bytes()),
            "empty chain hashes the bare domain string"
        );
        assert_ne!(empty_hash, Hash::new(b""));
    }

    #[test]
    fn chain_hash_depends_on_order() {
        let mut a = Chain::empty();
        a.push(entry(1, b"one"));
        a.push(entry(2, b"two"));

        let mut b = Chain::empty();
        b.push(entry(2, b"two"));
        b.push(entry(1, b"one"));

        assert_ne!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
    }

    #[test]
    fn compute_hash_rejects_malformed_entry_hash() {
        let mut chain = Chain::empty();
        let mut bad = entry(1, b"x");
        bad.hash = "zz-not-hex".to_string();
        chain.push(bad);
        assert!(chain.compute_hash().is_none());
    }

    #[test]
    fn prune_keeps_newest_and_counts() {
        let mut chain = Chain::empty();
        for v in 1..=5 {
            chain.push(entry(v, format!("v{v}").as_bytes()));
        }
        let dropped = chain.prune_to(3);
        assert_eq!(dropped, vec!["blob-1", "blob-2"]);
        assert_eq!(chain.pruned.count, 2);
        assert_eq!(chain.pruned.oldest_kept, 3);
        assert_eq!(chain.min_version(), 3);
        assert_eq!(chain.max_version(), 5);
        assert!(chain.entry(1).is_none());
        assert!(chain.entry(3).is_some());

        // Under the limit: nothing happens.
        assert!(chain.prune_to(3).is_empty());
        assert_eq!(chain.pruned.count, 2);
    }

    #[test]
    fn truncate_after_drops_newer_entries() {
        let mut chain = Chain::empty();
        for v in 1..=4 {
            chain.push(entry(v, format!("v{v}").as_bytes()));
        }
        let dropped = chain.truncate_after(2);
        assert_eq!(dropped.len(), 2);
        assert_eq!(chain.max_version(), 2);
        assert!(chain.truncate_after(5).is_empty());
    }

    #[test]
    fn json_round_trip_and_legacy_shape() {
        let mut chain = Chain::empty();
        chain.push(entry(1, b"payload"));
        chain.chain_hash = Some(chain.compute_hash().unwrap().to_hex());

        let json = chain.to_json().unwrap();
        let decoded = Chain::from_json(&json).unwrap();
        assert_eq!(decoded.versions, chain.versions);
        assert_eq!(decoded.chain_hash, chain.chain_hash);

        // Legacy documents carry neither chainHash nor chainSig.
        let legacy = br#"{"versions":[],"pruned":{"count":0,"oldestKept":0}}"#;
        let decoded = Chain::from_json(legacy).unwrap();
        assert!(decoded.chain_hash.is_none());
        assert!(decoded.chain_sig.is_none());
    }
}
