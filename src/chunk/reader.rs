// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use tracing::debug;

use super::{
    decode_dimension_payload, decode_measure_payload, ChunkFile, ChunkHeaderFormat, ChunkSource,
    CodecRegistry, DimensionColumnChunk, HeaderV1, HeaderV2, MeasureColumnChunk,
};
use crate::checksum::verify_checksum;
use crate::layout::{BlockletLayout, ColumnarFormatVersion};
use crate::options::IOBackend;
use crate::proto::ChunkLocation;
use crate::segment_properties::ValueWidth;
use crate::{StorageError, StorageResult};

/// State shared by dimension and measure readers: the blocklet, its source, and the lazily
/// opened file handle.
struct ChunkFileReader<H: ChunkHeaderFormat> {
    layout: Arc<BlockletLayout>,
    source: ChunkSource,
    file: Option<ChunkFile>,
    io_backend: IOBackend,
    codecs: Arc<CodecRegistry>,
    _phantom: PhantomData<H>,
}

impl<H: ChunkHeaderFormat> ChunkFileReader<H> {
    fn new(
        layout: Arc<BlockletLayout>,
        source: ChunkSource,
        io_backend: IOBackend,
        codecs: Arc<CodecRegistry>,
    ) -> Self {
        Self {
            layout,
            source,
            file: None,
            io_backend,
            codecs,
            _phantom: PhantomData,
        }
    }

    /// Read one chunk and return its uncompressed payload.
    fn read_payload(&mut self, location: ChunkLocation) -> StorageResult<Bytes> {
        let file = match &mut self.file {
            Some(file) => file,
            file @ None => file.insert(ChunkFile::open(&self.source, self.io_backend)?),
        };
        let chunk = file.read_at(location.offset, location.length as usize)?;

        let mut buf = &chunk[..];
        let header = H::decode(&mut buf)?;
        let data = chunk.slice(chunk.len() - buf.remaining()..);
        if data.len() != header.data_len() {
            return Err(StorageError::decode(format!(
                "chunk header declares {} bytes of data, found {}",
                header.data_len(),
                data.len()
            )));
        }
        verify_checksum(header.checksum_type, &data, header.checksum)?;

        let codec = self.codecs.get(header.codec)?;
        // raw lengths are not covered by the checksum
        for page in &header.pages {
            let max_raw_len = codec.max_raw_len(page.data_len as usize);
            if page.raw_len as usize > max_raw_len {
                return Err(StorageError::decode(format!(
                    "{} page of {} bytes cannot expand to {} bytes",
                    codec.name(),
                    page.data_len,
                    page.raw_len
                )));
            }
        }
        let mut raw = Vec::with_capacity(header.raw_len as usize);
        let mut pos = 0;
        for page in &header.pages {
            let page_data = &data[pos..pos + page.data_len as usize];
            pos += page.data_len as usize;
            let page_raw = codec.decompress(page_data, page.raw_len as usize)?;
            if page_raw.len() != page.raw_len as usize {
                return Err(StorageError::decode(format!(
                    "{} page expands to {} bytes, header declares {}",
                    codec.name(),
                    page_raw.len(),
                    page.raw_len
                )));
            }
            raw.extend_from_slice(&page_raw);
        }
        Ok(Bytes::from(raw))
    }
}

/// Reads the dimension chunks of one blocklet. The header layout is given by `H`.
pub struct CompressedDimensionChunkReader<H: ChunkHeaderFormat> {
    inner: ChunkFileReader<H>,
    widths: Arc<[ValueWidth]>,
}

impl<H: ChunkHeaderFormat> CompressedDimensionChunkReader<H> {
    pub fn new(
        layout: Arc<BlockletLayout>,
        widths: Arc<[ValueWidth]>,
        source: ChunkSource,
        io_backend: IOBackend,
        codecs: Arc<CodecRegistry>,
    ) -> Self {
        Self {
            inner: ChunkFileReader::new(layout, source, io_backend, codecs),
            widths,
        }
    }

    pub fn decode_chunk(&mut self, column: usize) -> StorageResult<DimensionColumnChunk> {
        let location = *self.inner.layout.dimension_chunk(column)?;
        let width = *self.widths.get(column).ok_or_else(|| {
            StorageError::decode(format!("no value width for dimension column {column}"))
        })?;
        debug!(column, version = %H::VERSION, offset = location.offset, "decode dimension chunk");
        let raw = self.inner.read_payload(location)?;
        decode_dimension_payload(raw, width, self.inner.layout.row_count as usize)
    }
}

/// Reads the measure chunks of one blocklet. The header layout is given by `H`.
pub struct CompressedMeasureChunkReader<H: ChunkHeaderFormat> {
    inner: ChunkFileReader<H>,
}

impl<H: ChunkHeaderFormat> CompressedMeasureChunkReader<H> {
    pub fn new(
        layout: Arc<BlockletLayout>,
        source: ChunkSource,
        io_backend: IOBackend,
        codecs: Arc<CodecRegistry>,
    ) -> Self {
        Self {
            inner: ChunkFileReader::new(layout, source, io_backend, codecs),
        }
    }

    pub fn decode_chunk(&mut self, column: usize) -> StorageResult<MeasureColumnChunk> {
        let location = *self.inner.layout.measure_chunk(column)?;
        debug!(column, version = %H::VERSION, offset = location.offset, "decode measure chunk");
        let raw = self.inner.read_payload(location)?;
        decode_measure_payload(raw, self.inner.layout.row_count as usize)
    }
}

pub type DimensionChunkReaderV1 = CompressedDimensionChunkReader<HeaderV1>;
pub type DimensionChunkReaderV2 = CompressedDimensionChunkReader<HeaderV2>;
pub type MeasureChunkReaderV1 = CompressedMeasureChunkReader<HeaderV1>;
pub type MeasureChunkReaderV2 = CompressedMeasureChunkReader<HeaderV2>;

/// [`CompressedDimensionChunkReader`] of all format versions
pub enum DimensionChunkReaderImpl {
    V1(DimensionChunkReaderV1),
    V2(DimensionChunkReaderV2),
}

impl DimensionChunkReaderImpl {
    pub fn decode_chunk(&mut self, column: usize) -> StorageResult<DimensionColumnChunk> {
        match self {
            Self::V1(reader) => reader.decode_chunk(column),
            Self::V2(reader) => reader.decode_chunk(column),
        }
    }

    /// Header layout used by this reader.
    pub fn version(&self) -> ColumnarFormatVersion {
        match self {
            Self::V1(_) => HeaderV1::VERSION,
            Self::V2(_) => HeaderV2::VERSION,
        }
    }
}

/// [`CompressedMeasureChunkReader`] of all format versions
pub enum MeasureChunkReaderImpl {
    V1(MeasureChunkReaderV1),
    V2(MeasureChunkReaderV2),
}

impl MeasureChunkReaderImpl {
    pub fn decode_chunk(&mut self, column: usize) -> StorageResult<MeasureColumnChunk> {
        match self {
            Self::V1(reader) => reader.decode_chunk(column),
            Self::V2(reader) => reader.decode_chunk(column),
        }
    }

    /// Header layout used by this reader.
    pub fn version(&self) -> ColumnarFormatVersion {
        match self {
            Self::V1(_) => HeaderV1::VERSION,
            Self::V2(_) => HeaderV2::VERSION,
        }
    }
}
