//! Value Codec Module
//!
//! Converts cache values to their storable byte form and back. Values are
//! encoded as JSON; the optional zlib pass is applied only to bytes headed
//! for the durable tier.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};

// == Codec ==
/// Serialization and compression settings for one cache instance.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    compression: bool,
}

impl Codec {
    /// Creates a codec; `compression` toggles the durable-tier zlib pass.
    pub fn new(compression: bool) -> Self {
        Self { compression }
    }

    /// Whether durable writes are compressed.
    pub fn compression(&self) -> bool {
        self.compression
    }

    // == Encode ==
    /// Serializes a value. The length of the result is the entry's size.
    pub fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    // == Decode ==
    /// Deserializes a value previously produced by [`Codec::encode`].
    pub fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    // == Pack ==
    /// Prepares encoded bytes for the durable tier.
    ///
    /// Returns the bytes to store and whether they are compressed.
    pub fn pack(&self, encoded: Vec<u8>) -> Result<(Vec<u8>, bool)> {
        if !self.compression {
            return Ok((encoded, false));
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&encoded)
            .map_err(|e| CacheError::Serialization(format!("compression failed: {}", e)))?;
        let compressed = encoder
            .finish()
            .map_err(|e| CacheError::Serialization(format!("compression failed: {}", e)))?;
        Ok((compressed, true))
    }

    // == Unpack ==
    /// Reverses [`Codec::pack`] using the flag stored next to the bytes.
    ///
    /// Rows written by an instance with a different compression setting are
    /// still readable since the flag travels with the row.
    pub fn unpack(&self, stored: Vec<u8>, compressed: bool) -> Result<Vec<u8>> {
        if !compressed {
            return Ok(stored);
        }

        let mut decoder = ZlibDecoder::new(stored.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CacheError::Serialization(format!("decompression failed: {}", e)))?;
        Ok(out)
    }
}
