// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use super::{
    ChunkSource, CodecRegistry, DimensionChunkReaderImpl, DimensionChunkReaderV1,
    DimensionChunkReaderV2, MeasureChunkReaderImpl, MeasureChunkReaderV1, MeasureChunkReaderV2,
};
use crate::layout::{BlockletLayout, ColumnarFormatVersion};
use crate::options::IOBackend;
use crate::segment_properties::ValueWidth;

/// Chooses the chunk reader matching the format version persisted in a data file.
///
/// Only the oldest version has its own readers. Every other version, including versions
/// unknown to this build, is read with the V2 readers.
#[derive(Clone)]
pub struct ChunkReaderSelector {
    codecs: Arc<CodecRegistry>,
    io_backend: IOBackend,
}

impl ChunkReaderSelector {
    pub fn new(codecs: Arc<CodecRegistry>, io_backend: IOBackend) -> Self {
        Self { codecs, io_backend }
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    /// Create a dimension chunk reader. No I/O happens until the first decode.
    pub fn select_dimension_reader(
        &self,
        version: ColumnarFormatVersion,
        layout: Arc<BlockletLayout>,
        widths: Arc<[ValueWidth]>,
        source: ChunkSource,
    ) -> DimensionChunkReaderImpl {
        let codecs = self.codecs.clone();
        match version {
            ColumnarFormatVersion::V1 => DimensionChunkReaderImpl::V1(
                DimensionChunkReaderV1::new(layout, widths, source, self.io_backend, codecs),
            ),
            _ => DimensionChunkReaderImpl::V2(DimensionChunkReaderV2::new(
                layout,
                widths,
                source,
                self.io_backend,
                codecs,
            )),
        }
    }

    /// Create a measure chunk reader. No I/O happens until the first decode.
    pub fn select_measure_reader(
        &self,
        version: ColumnarFormatVersion,
        layout: Arc<BlockletLayout>,
        source: ChunkSource,
    ) -> MeasureChunkReaderImpl {
        let codecs = self.codecs.clone();
        match version {
            ColumnarFormatVersion::V1 => MeasureChunkReaderImpl::V1(MeasureChunkReaderV1::new(
                layout,
                source,
                self.io_backend,
                codecs,
            )),
            _ => MeasureChunkReaderImpl::V2(MeasureChunkReaderV2::new(
                layout,
                source,
                self.io_backend,
                codecs,
            )),
        }
    }
}
