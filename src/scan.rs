// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::path::PathBuf;

use bitvec::prelude::BitVec;
use tracing::debug;

use crate::chunk::{
    ChunkReaderSelector, ChunkSource, DimensionChunkReaderImpl, DimensionColumnChunk,
    MeasureChunkReaderImpl, MeasureColumnChunk,
};
use crate::delete_delta::DeleteDeltaBlockDetails;
use crate::index::DataRefNode;
use crate::segment_properties::SegmentProperties;
use crate::{StorageError, StorageResult};

/// Reads the columns of one blocklet, hiding deleted rows.
pub struct BlockletScanner {
    dimensions: DimensionChunkReaderImpl,
    measures: MeasureChunkReaderImpl,
    /// `None` if no row of the blocklet is deleted
    visibility: Option<BitVec>,
    row_count: usize,
}

impl BlockletScanner {
    /// Scan `node` from its data file.
    pub fn new(
        selector: &ChunkReaderSelector,
        properties: &SegmentProperties,
        node: &DataRefNode,
        deletes: Option<&DeleteDeltaBlockDetails>,
    ) -> StorageResult<Self> {
        let source = ChunkSource::from(PathBuf::from(&*node.file_path));
        Self::with_source(selector, properties, node, source, deletes)
    }

    pub fn with_source(
        selector: &ChunkReaderSelector,
        properties: &SegmentProperties,
        node: &DataRefNode,
        source: ChunkSource,
        deletes: Option<&DeleteDeltaBlockDetails>,
    ) -> StorageResult<Self> {
        if let (Some(deletes), Some(block_name)) = (deletes, node.block_name()) {
            if deletes.block_name != block_name {
                return Err(StorageError::decode(format!(
                    "delete delta of block {:?} applied to a blocklet of {:?}",
                    deletes.block_name, block_name
                )));
            }
        }
        let version = node.layout.version;
        let row_count = node.row_count() as usize;
        let visibility = deletes
            .map(|deletes| deletes.visibility(node.first_row_in_block, row_count))
            .filter(|visibility| !visibility.all());
        debug!(
            path = %node.file_path,
            blocklet = node.blocklet_id,
            %version,
            deleted = visibility.as_ref().map_or(0, |v| v.count_zeros()),
            "scan blocklet"
        );
        Ok(Self {
            dimensions: selector.select_dimension_reader(
                version,
                node.layout.clone(),
                properties.dimension_widths(),
                source.clone(),
            ),
            measures: selector.select_measure_reader(version, node.layout.clone(), source),
            visibility,
            row_count,
        })
    }

    /// Number of rows returned by each read.
    pub fn visible_rows(&self) -> usize {
        match &self.visibility {
            Some(visibility) => visibility.count_ones(),
            None => self.row_count,
        }
    }

    pub fn visibility(&self) -> Option<&BitVec> {
        self.visibility.as_ref()
    }

    pub fn read_dimension(&mut self, column: usize) -> StorageResult<DimensionColumnChunk> {
        let chunk = self.dimensions.decode_chunk(column)?;
        Ok(match &self.visibility {
            Some(visibility) => chunk.filter(visibility),
            None => chunk,
        })
    }

    pub fn read_measure(&mut self, column: usize) -> StorageResult<MeasureColumnChunk> {
        let chunk = self.measures.decode_chunk(column)?;
        Ok(match &self.visibility {
            Some(visibility) => chunk.filter(visibility),
            None => chunk,
        })
    }
}
