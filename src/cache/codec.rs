//! String encoding of cache entries for the durable backends

use crate::cache::config::SerializationConfig;
use crate::cache::entry::CacheEntry;
use crate::error::{CacheError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Marker prefix of compressed payloads
const COMPRESSED_PREFIX: &str = "gz:";

/// Encodes entries as JSON, optionally gzip-compressed and base64 wrapped
///
/// Decoding accepts both forms regardless of the current setting, so
/// flipping `compress` does not orphan entries already on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryCodec {
    compress: bool,
}

impl EntryCodec {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    pub fn from_config(config: &SerializationConfig) -> Self {
        Self::new(config.compress)
    }

    pub fn encode(&self, entry: &CacheEntry) -> Result<String> {
        let json = serde_json::to_string(entry)?;
        if !self.compress {
            return Ok(json);
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(json.as_bytes())
            .map_err(|e| CacheError::SerializationError(format!("compression failed: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| CacheError::SerializationError(format!("compression failed: {e}")))?;

        Ok(format!(
            "{COMPRESSED_PREFIX}{}",
            BASE64_STANDARD.encode(compressed)
        ))
    }

    pub fn decode(&self, raw: &str) -> Result<CacheEntry> {
        let Some(encoded) = raw.strip_prefix(COMPRESSED_PREFIX) else {
            return Ok(serde_json::from_str(raw)?);
        };

        let compressed = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| CacheError::SerializationError(format!("invalid base64: {e}")))?;
        let mut json = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut json)
            .map_err(|e| CacheError::SerializationError(format!("decompression failed: {e}")))?;

        Ok(serde_json::from_str(&json)?)
    }
}
