//! ZIP pack/unpack for the vault interchange format.

use crate::codec::{CodecError, DEFLATE_LEVEL};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

impl From<zip::result::ZipError> for CodecError {
    fn from(err: zip::result::ZipError) -> Self {
        CodecError::Zip(err.to_string())
    }
}

/// Packs entries into a ZIP archive, preserving full relative paths.
pub fn zip_pack(entries: &BTreeMap<String, Bytes>) -> Result<Bytes, CodecError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(DEFLATE_LEVEL as i64));
    for (path, bytes) in entries {
        writer.start_file(path.as_str(), options)?;
        writer
            .write_all(bytes)
            .map_err(|e| CodecError::Zip(e.to_string()))?;
    }
    let cursor = writer.finish()?;
    Ok(cursor.into_inner().into())
}

/// Unpacks a ZIP archive into path → bytes, skipping directory entries.
pub fn zip_unpack(bytes: &[u8]) -> Result<BTreeMap<String, Bytes>, CodecError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut out = BTreeMap::new();
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| CodecError::Zip(e.to_string()))?;
        out.insert(file.name().to_string(), buf.into());
    }
    Ok(out)
}
