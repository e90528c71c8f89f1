//! Compression and archive codecs.
//!
//! Vault payloads are raw-DEFLATE compressed before encryption; the
//! import/export interchange format is a plain ZIP archive.

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::io::{Read, Write};
use thiserror::Error;

pub mod zip;

pub use zip::{zip_pack, zip_unpack};

/// DEFLATE level used for both blob compression and ZIP entries.
pub const DEFLATE_LEVEL: u32 = 6;

/// Errors from compression, inflation, or ZIP handling.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("compression failed: {0}")]
    Compress(std::io::Error),
    #[error("inflate failed: {0}")]
    Inflate(std::io::Error),
    #[error("zip error: {0}")]
    Zip(String),
}

/// Compresses bytes with raw DEFLATE at level 6.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(DEFLATE_LEVEL));
    encoder.write_all(bytes).map_err(CodecError::Compress)?;
    encoder.finish().map_err(CodecError::Compress)
}

/// Inflates raw-DEFLATE bytes.
pub fn inflate(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = DeflateDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(CodecError::Inflate)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_round_trip() {
        let data = b"hello hello hello hello hello".repeat(20);
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(inflate(&compressed).unwrap(), data);
    }

    #[test]
    fn empty_round_trip() {
        let compressed = compress(b"").unwrap();
        assert_eq!(inflate(&compressed).unwrap(), b"");
    }

    #[test]
    fn inflate_rejects_garbage() {
        assert!(inflate(&[0xde, 0xad, 0xbe, 0xef, 0x00]).is_err());
    }
}
