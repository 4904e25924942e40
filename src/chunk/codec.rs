// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Compression codecs invoked by chunk readers and writers, keyed by the id stored in chunk
//! headers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{StorageError, StorageResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CodecId(pub u8);

impl CodecId {
    pub const NONE: Self = Self(0);
    pub const LZ4: Self = Self(1);
    pub const SNAPPY: Self = Self(2);
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait ChunkCodec: Send + Sync {
    fn name(&self) -> &'static str;

    fn compress(&self, data: &[u8]) -> StorageResult<Vec<u8>>;

    /// Decompress `data`, which is expected to expand to `raw_len` bytes.
    fn decompress(&self, data: &[u8], raw_len: usize) -> StorageResult<Vec<u8>>;

    /// Upper bound of the size `data_len` compressed bytes can expand to.
    fn max_raw_len(&self, data_len: usize) -> usize {
        data_len.saturating_mul(MAX_EXPANSION_RATIO)
    }
}

/// Neither LZ4 nor Snappy expands a block by more than this factor.
const MAX_EXPANSION_RATIO: usize = 255;

pub struct NoCompression;

impl ChunkCodec for NoCompression {
    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], _raw_len: usize) -> StorageResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn max_raw_len(&self, data_len: usize) -> usize {
        data_len
    }
}

pub struct Lz4Codec;

impl ChunkCodec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        Ok(lz4_flex::compress(data))
    }

    fn decompress(&self, data: &[u8], raw_len: usize) -> StorageResult<Vec<u8>> {
        lz4_flex::decompress(data, raw_len)
            .map_err(|e| StorageError::decode(format!("corrupted lz4 page: {e}")))
    }
}

pub struct SnappyCodec;

impl ChunkCodec for SnappyCodec {
    fn name(&self) -> &'static str {
        "snappy"
    }

    fn compress(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| StorageError::decode(format!("snappy compression failed: {e}")))
    }

    fn decompress(&self, data: &[u8], _raw_len: usize) -> StorageResult<Vec<u8>> {
        snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| StorageError::decode(format!("corrupted snappy page: {e}")))
    }
}

/// Maps codec ids found in chunk headers to codec implementations.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<CodecId, Arc<dyn ChunkCodec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(CodecId::NONE, Arc::new(NoCompression));
        registry.register(CodecId::LZ4, Arc::new(Lz4Codec));
        registry.register(CodecId::SNAPPY, Arc::new(SnappyCodec));
        registry
    }
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    pub fn register(&mut self, id: CodecId, codec: Arc<dyn ChunkCodec>) {
        self.codecs.insert(id, codec);
    }

    pub fn get(&self, id: CodecId) -> StorageResult<&dyn ChunkCodec> {
        self.codecs
            .get(&id)
            .map(|codec| codec.as_ref())
            .ok_or(StorageError::UnknownCodec(id.0))
    }
}
