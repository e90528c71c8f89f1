//! The ZIP interchange format and its MIME sidecar.
//!
//! Exports contain one entry per file at a path equal to the filename
//! (slashes preserved) plus a `.hashfs_meta.json` sidecar carrying MIME
//! types. Imports tolerate a missing or unreadable sidecar and fall back
//! to `application/octet-stream`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the sidecar entry inside exported archives.
pub const META_SIDECAR_NAME: &str = ".hashfs_meta.json";

/// MIME assumed for imported entries the sidecar does not cover.
pub const DEFAULT_IMPORT_MIME: &str = "application/octet-stream";

/// The sidecar document: `{"mimes": {filename: mime}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidecarMeta {
    #[serde(default)]
    pub mimes: BTreeMap<String, String>,
}

impl SidecarMeta {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses sidecar bytes; anything unreadable counts as no sidecar.
    pub fn parse(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_else(|err| {
            log::warn!("unreadable {META_SIDECAR_NAME} sidecar ignored: {err}");
            Self::default()
        })
    }
}

/// Payload of a successfully imported entry, ready to hand to `save`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedData {
    pub filename: String,
    pub mime: String,
    pub bytes: Bytes,
    pub size: u64,
}

/// Per-entry import outcome, reported back to the host.
#[derive(Debug, Clone)]
pub struct ImportItem {
    pub name: String,
    pub outcome: Result<ImportedData, String>,
}

/// One input item for `import_files`.
#[derive(Debug, Clone)]
pub struct ImportFileItem {
    pub name: String,
    pub bytes: Bytes,
    /// MIME hint from the host (e.g. a browser `File.type`).
    pub mime: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_round_trip() {
        let mut sidecar = SidecarMeta::default();
        sidecar
            .mimes
            .insert("a.png".to_string(), "image/png".to_string());
        let parsed = SidecarMeta::parse(&sidecar.to_json().unwrap());
        assert_eq!(parsed.mimes, sidecar.mimes);
    }

    #[test]
    fn unreadable_sidecar_is_empty() {
        assert!(SidecarMeta::parse(b"not json").mimes.is_empty());
        assert!(SidecarMeta::parse(b"{\"mimes\": 7}").mimes.is_empty());
        assert!(SidecarMeta::parse(b"{}").mimes.is_empty());
    }
}
