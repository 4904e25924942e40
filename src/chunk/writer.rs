// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use super::{
    encode_dimension_payload, encode_measure_payload, ChunkHeader, ChunkHeaderFormat,
    CodecId, CodecRegistry, MeasureColumnChunk, PageInfo,
};
use crate::checksum::build_checksum;
use crate::options::StorageOptions;
use crate::proto::ChecksumType;
use crate::segment_properties::ValueWidth;
use crate::{StorageError, StorageResult};

/// Encodes column chunks: payload, compression, checksum and the version-specific header.
#[derive(Clone)]
pub struct ChunkWriter {
    codecs: Arc<CodecRegistry>,
    codec: CodecId,
    checksum_type: ChecksumType,
    target_page_size: usize,
}

impl ChunkWriter {
    pub fn new(
        codecs: Arc<CodecRegistry>,
        codec: CodecId,
        checksum_type: ChecksumType,
        target_page_size: usize,
    ) -> Self {
        Self {
            codecs,
            codec,
            checksum_type,
            target_page_size: target_page_size.max(1),
        }
    }

    pub fn from_options(options: &StorageOptions, codecs: Arc<CodecRegistry>) -> Self {
        Self::new(
            codecs,
            options.codec,
            options.checksum_type,
            options.target_page_size,
        )
    }

    pub fn write_dimension<'a, H: ChunkHeaderFormat>(
        &self,
        values: impl IntoIterator<Item = &'a [u8]>,
        width: ValueWidth,
    ) -> StorageResult<Vec<u8>> {
        let raw = encode_dimension_payload(values, width)?;
        self.write_chunk::<H>(&raw)
    }

    pub fn write_measure<H: ChunkHeaderFormat>(
        &self,
        chunk: &MeasureColumnChunk,
    ) -> StorageResult<Vec<u8>> {
        self.write_chunk::<H>(&encode_measure_payload(chunk))
    }

    /// Compress `raw` and prepend the header. Paged layouts split `raw` into pages of the
    /// target page size.
    pub fn write_chunk<H: ChunkHeaderFormat>(&self, raw: &[u8]) -> StorageResult<Vec<u8>> {
        let raw_len = u32::try_from(raw.len())
            .map_err(|_| StorageError::decode(format!("chunk of {} bytes is too large", raw.len())))?;
        let codec = self.codecs.get(self.codec)?;
        let page_size = if H::PAGED {
            self.target_page_size
        } else {
            raw.len().max(1)
        };

        let mut data = vec![];
        let mut pages = vec![];
        // an empty chunk still has one (empty) page
        let page_slices: Vec<&[u8]> = if raw.is_empty() {
            vec![raw]
        } else {
            raw.chunks(page_size).collect()
        };
        for page in page_slices {
            let compressed = codec.compress(page)?;
            pages.push(PageInfo {
                data_len: compressed.len() as u32,
                raw_len: page.len() as u32,
            });
            data.extend_from_slice(&compressed);
        }

        let header = ChunkHeader {
            codec: self.codec,
            checksum_type: self.checksum_type,
            checksum: build_checksum(self.checksum_type, &data),
            raw_len,
            pages,
        };
        let mut chunk = Vec::with_capacity(H::encoded_len(&header) + data.len());
        H::encode(&header, &mut chunk);
        chunk.extend_from_slice(&data);
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use test_case::test_case;

    use super::*;
    use crate::chunk::{
        ChunkReaderSelector, ChunkSource, DimensionChunkReaderImpl, HeaderV1, HeaderV2,
        MeasureValue,
    };
    use crate::layout::{BlockletLayout, ColumnarFormatVersion};
    use crate::options::IOBackend;
    use crate::proto::ChunkLocation;

    /// Lay out `chunks` back to back and describe them as a single-column blocklet each.
    fn helper_blocklet(
        version: ColumnarFormatVersion,
        row_count: u32,
        dimension: Vec<u8>,
        measure: Vec<u8>,
    ) -> (Arc<BlockletLayout>, ChunkSource) {
        let mut file = vec![0xAA; 7]; // leading garbage, chunks never start at 0
        let dimension_location = ChunkLocation {
            offset: file.len() as u64,
            length: dimension.len() as u32,
        };
        file.extend_from_slice(&dimension);
        let measure_location = ChunkLocation {
            offset: file.len() as u64,
            length: measure.len() as u32,
        };
        file.extend_from_slice(&measure);
        let layout = BlockletLayout {
            version,
            row_count,
            dimension_chunks: vec![dimension_location],
            measure_chunks: vec![measure_location],
        };
        (Arc::new(layout), ChunkSource::from(Bytes::from(file)))
    }

    fn writer(codec: CodecId) -> ChunkWriter {
        ChunkWriter::new(Default::default(), codec, ChecksumType::Crc32, 16)
    }

    fn values() -> Vec<Vec<u8>> {
        (0..50)
            .map(|i| format!("value-{}", i * 7).into_bytes())
            .collect()
    }

    fn measure() -> MeasureColumnChunk {
        MeasureColumnChunk::from_i32((0..50).map(|i| if i % 5 == 0 { None } else { Some(i) }))
    }

    fn decode_both(
        version: ColumnarFormatVersion,
        dimension: Vec<u8>,
        measure: Vec<u8>,
    ) -> StorageResult<(Vec<Vec<u8>>, MeasureColumnChunk)> {
        let (layout, source) = helper_blocklet(version, 50, dimension, measure);
        let selector = ChunkReaderSelector::new(Default::default(), IOBackend::NormalRead);
        let mut dimension_reader = selector.select_dimension_reader(
            version,
            layout.clone(),
            Arc::from(vec![ValueWidth::Variable]),
            source.clone(),
        );
        let mut measure_reader = selector.select_measure_reader(version, layout, source);
        let dimension = dimension_reader.decode_chunk(0)?;
        let measure = measure_reader.decode_chunk(0)?;
        Ok((dimension.iter().map(|v| v.to_vec()).collect(), measure))
    }

    #[test_case(CodecId::NONE)]
    #[test_case(CodecId::LZ4)]
    #[test_case(CodecId::SNAPPY)]
    fn test_versions_decode_identically(codec: CodecId) {
        let writer = writer(codec);
        let values = values();
        let dims = || values.iter().map(|v| v.as_slice());

        let v1 = decode_both(
            ColumnarFormatVersion::V1,
            writer
                .write_dimension::<HeaderV1>(dims(), ValueWidth::Variable)
                .unwrap(),
            writer.write_measure::<HeaderV1>(&measure()).unwrap(),
        )
        .unwrap();
        let v2 = decode_both(
            ColumnarFormatVersion::V2,
            writer
                .write_dimension::<HeaderV2>(dims(), ValueWidth::Variable)
                .unwrap(),
            writer.write_measure::<HeaderV2>(&measure()).unwrap(),
        )
        .unwrap();

        assert_eq!(v1.0, values);
        assert_eq!(v1, v2);
        assert_eq!(v1.1, measure());
        assert_eq!(v2.1.value(0), None);
        assert_eq!(v2.1.value(1), Some(MeasureValue::Int32(1)));
    }

    #[test]
    fn test_v2_is_paged() {
        let chunk = writer(CodecId::NONE).write_chunk::<HeaderV2>(&[7; 40]).unwrap();
        let header = HeaderV2::decode(&mut &chunk[..]).unwrap();
        assert_eq!(header.pages.len(), 3);
        assert_eq!(header.raw_len, 40);

        let chunk = writer(CodecId::NONE).write_chunk::<HeaderV1>(&[7; 40]).unwrap();
        assert_eq!(HeaderV1::decode(&mut &chunk[..]).unwrap().pages.len(), 1);
    }

    #[test_case(ColumnarFormatVersion::V1)]
    #[test_case(ColumnarFormatVersion::V2)]
    fn test_short_source(version: ColumnarFormatVersion) {
        let writer = writer(CodecId::LZ4);
        let values = values();
        let dimension = match version {
            ColumnarFormatVersion::V1 => writer.write_dimension::<HeaderV1>(
                values.iter().map(|v| v.as_slice()),
                ValueWidth::Variable,
            ),
            _ => writer.write_dimension::<HeaderV2>(
                values.iter().map(|v| v.as_slice()),
                ValueWidth::Variable,
            ),
        }
        .unwrap();
        let length = dimension.len();

        // the source ends before the declared length
        let (mut layout, _) = helper_blocklet(version, 50, dimension.clone(), vec![]);
        Arc::make_mut(&mut layout).dimension_chunks[0].length = length as u32 + 10;
        let (_, source) = helper_blocklet(version, 50, dimension.clone(), vec![]);
        let selector = ChunkReaderSelector::new(Default::default(), IOBackend::NormalRead);
        let mut reader = selector.select_dimension_reader(
            version,
            layout,
            Arc::from(vec![ValueWidth::Variable]),
            source,
        );
        let err = reader.decode_chunk(0).unwrap_err();
        assert!(err.is_format_error(), "{err}");

        // the chunk is cut short: its header declares more data than the layout holds
        let (mut layout, source) = helper_blocklet(version, 50, dimension, vec![]);
        Arc::make_mut(&mut layout).dimension_chunks[0].length = length as u32 - 3;
        let mut reader = selector.select_dimension_reader(
            version,
            layout,
            Arc::from(vec![ValueWidth::Variable]),
            source,
        );
        let err = reader.decode_chunk(0).unwrap_err();
        assert!(err.is_format_error(), "{err}");
    }

    #[test]
    fn test_corrupted_data() {
        let writer = writer(CodecId::LZ4);
        let mut dimension = writer
            .write_dimension::<HeaderV2>(values().iter().map(|v| v.as_slice()), ValueWidth::Variable)
            .unwrap();
        let last = dimension.len() - 1;
        dimension[last] ^= 0xFF;
        let err = decode_both(ColumnarFormatVersion::V2, dimension, vec![]).unwrap_err();
        assert!(matches!(err, StorageError::Checksum(..)));
    }

    #[test_case(CodecId::NONE)]
    #[test_case(CodecId::LZ4)]
    #[test_case(CodecId::SNAPPY)]
    fn test_oversized_raw_len(codec: CodecId) {
        let mut dimension = writer(codec)
            .write_dimension::<HeaderV1>(values().iter().map(|v| v.as_slice()), ValueWidth::Variable)
            .unwrap();
        // raw_len follows codec, checksum type and checksum
        dimension[10..14].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = decode_both(ColumnarFormatVersion::V1, dimension, vec![]).unwrap_err();
        assert!(err.is_format_error(), "{err}");
        assert!(!matches!(err, StorageError::Checksum(..)));
    }

    #[test]
    fn test_out_of_range_column() {
        let writer = writer(CodecId::NONE);
        let dimension = writer
            .write_dimension::<HeaderV1>([&b"ab"[..]], ValueWidth::Fixed(2))
            .unwrap();
        let (layout, source) = helper_blocklet(ColumnarFormatVersion::V1, 1, dimension, vec![]);
        let mut reader = DimensionChunkReaderImpl::V1(crate::chunk::DimensionChunkReaderV1::new(
            layout,
            Arc::from(vec![ValueWidth::Fixed(2)]),
            source,
            IOBackend::NormalRead,
            Default::default(),
        ));
        assert_eq!(reader.decode_chunk(0).unwrap().value(0), b"ab");
        assert!(reader.decode_chunk(1).is_err());
    }
}
