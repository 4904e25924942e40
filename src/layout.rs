// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::fmt;

use crate::proto::{BlockletInfo, ChunkLocation};
use crate::{StorageError, StorageResult};

/// Persisted tag selecting which binary layout rules apply to the chunks of a data file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnarFormatVersion(u32);

impl ColumnarFormatVersion {
    pub const V1: Self = Self(1);
    pub const V2: Self = Self(2);
    pub const V3: Self = Self(3);

    pub const fn from_number(number: u32) -> Self {
        Self(number)
    }

    pub const fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ColumnarFormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

/// Chunk locations and row count of one blocklet.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockletLayout {
    pub version: ColumnarFormatVersion,
    pub row_count: u32,
    pub dimension_chunks: Vec<ChunkLocation>,
    pub measure_chunks: Vec<ChunkLocation>,
}

impl BlockletLayout {
    pub fn from_info(version: ColumnarFormatVersion, info: &BlockletInfo) -> Self {
        Self {
            version,
            row_count: info.row_count,
            dimension_chunks: info.dimension_chunks.clone(),
            measure_chunks: info.measure_chunks.clone(),
        }
    }

    pub fn dimension_chunk(&self, column: usize) -> StorageResult<&ChunkLocation> {
        self.dimension_chunks.get(column).ok_or_else(|| {
            StorageError::decode(format!(
                "dimension column {column} out of range, blocklet has {}",
                self.dimension_chunks.len()
            ))
        })
    }

    pub fn measure_chunk(&self, column: usize) -> StorageResult<&ChunkLocation> {
        self.measure_chunks.get(column).ok_or_else(|| {
            StorageError::decode(format!(
                "measure column {column} out of range, blocklet has {}",
                self.measure_chunks.len()
            ))
        })
    }
}
