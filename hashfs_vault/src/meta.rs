//! The metadata index: logical filename → file record.
//!
//! The index is stored as one encrypted JSON document under
//! `meta/index` and always rewritten whole. Parsing is lenient towards
//! older schema versions (defaults are filled in) but rejects anything
//! that is not a `files` mapping of well-formed records; the engine
//! responds to rejection by rebuilding the index from the chains.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Current schema version of the stored index document.
pub const META_SCHEMA_VERSION: u32 = 2;

/// The single key the index document lives under in the `meta` collection.
pub const META_INDEX_KEY: &str = "index";

/// MIME type assumed when a record carries none.
pub const DEFAULT_MIME: &str = "text/markdown";

/// Per-file record kept in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub mime: String,
    /// Id of this file's version chain; stable across renames.
    pub chain_id: String,
    /// Latest persisted version number; 0 before the first write.
    #[serde(default)]
    pub head_version: u64,
    /// Millisecond epoch of the last write.
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub last_size: u64,
    #[serde(default)]
    pub last_compressed_size: u64,
    /// Blob key of the head version's ciphertext, if any.
    #[serde(default)]
    pub active_key: Option<String>,
}

impl FileRecord {
    /// A nascent record: chain exists in name only, nothing persisted yet.
    pub fn new(mime: impl Into<String>, chain_id: impl Into<String>, now: i64) -> Self {
        Self {
            mime: mime.into(),
            chain_id: chain_id.into(),
            head_version: 0,
            last_modified: now,
            last_size: 0,
            last_compressed_size: 0,
            active_key: None,
        }
    }
}

/// Sorted summary of one file, as handed to hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub name: String,
    pub mime: String,
    pub head_version: u64,
    pub last_size: u64,
    pub last_compressed_size: u64,
    pub last_modified: i64,
}

/// The whole-document index as persisted (decrypted form).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaDocument {
    pub files: BTreeMap<String, FileRecord>,
    pub schema_version: u32,
    pub last_saved: i64,
}

impl MetaDocument {
    pub fn new_empty(now: i64) -> Self {
        Self {
            files: BTreeMap::new(),
            schema_version: META_SCHEMA_VERSION,
            last_saved: now,
        }
    }

    /// Encodes this document to JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses and validates a decrypted index document.
    ///
    /// Returns the document plus whether a schema migration filled in
    /// defaults (in which case the caller should rewrite the index).
    /// Any shape violation is an error; the engine rebuilds from chains.
    pub fn parse(bytes: &[u8], now: i64) -> anyhow::Result<(Self, bool)> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(root) = value else {
            anyhow::bail!("index root is not an object");
        };
        let Some(Value::Object(files_raw)) = root.get("files") else {
            anyhow::bail!("index has no files mapping");
        };
        let schema_version = root
            .get("schemaVersion")
            .and_then(Value::as_u64)
            .unwrap_or(1) as u32;

        let migrate = schema_version < META_SCHEMA_VERSION;
        let mut files = BTreeMap::new();
        for (name, raw) in files_raw {
            let Value::Object(record) = raw else {
                anyhow::bail!("record for {name} is not an object");
            };
            let mime = match record.get("mime").and_then(Value::as_str) {
                Some(mime) => mime.to_string(),
                // Older schemas may lack a mime; current ones must not.
                None if migrate => DEFAULT_MIME.to_string(),
                None => anyhow::bail!("record for {name} has no mime"),
            };
            let Some(chain_id) = record.get("chainId").and_then(Value::as_str) else {
                anyhow::bail!("record for {name} has no chainId");
            };
            files.insert(
                name.clone(),
                FileRecord {
                    mime,
                    chain_id: chain_id.to_string(),
                    head_version: record
                        .get("headVersion")
                        .and_then(Value::as_u64)
                        .unwrap_or(0),
                    last_modified: record
                        .get("lastModified")
                        .and_then(Value::as_i64)
                        .unwrap_or(if migrate { now } else { 0 }),
                    last_size: record.get("lastSize").and_then(Value::as_u64).unwrap_or(0),
                    last_compressed_size: record
                        .get("lastCompressedSize")
                        .and_then(Value::as_u64)
                        .unwrap_or(0),
                    active_key: record
                        .get("activeKey")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                },
            );
        }

        Ok((
            Self {
                files,
                schema_version: META_SCHEMA_VERSION,
                last_saved: root.get("lastSaved").and_then(Value::as_i64).unwrap_or(now),
            },
            migrate,
        ))
    }

    /// Sorted file summaries for hosts (the map is already name-ordered).
    pub fn summaries(&self) -> Vec<FileSummary> {
        self.files
            .iter()
            .map(|(name, record)| FileSummary {
                name: name.clone(),
                mime: record.mime.clone(),
                head_version: record.head_version,
                last_size: record.last_size,
                last_compressed_size: record.last_compressed_size,
                last_modified: record.last_modified,
            })
            .collect()
    }
}
