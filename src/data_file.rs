// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use tracing::info;

use crate::chunk::{ChunkWriter, HeaderV1, HeaderV2, MeasureColumnChunk};
use crate::footer::encode_footer;
use crate::layout::ColumnarFormatVersion;
use crate::proto::{BlockletInfo, ChecksumType, ChunkLocation, DataFileFooter};
use crate::segment_properties::SegmentPropertiesRef;
use crate::{StorageError, StorageResult};

/// Builds a data file: blocklets of column chunks followed by the footer.
pub struct DataFileBuilder {
    properties: SegmentPropertiesRef,
    version: ColumnarFormatVersion,
    writer: ChunkWriter,
    checksum_type: ChecksumType,

    /// Chunks written so far
    data: Vec<u8>,
    blocklets: Vec<BlockletInfo>,
    num_rows: u64,
}

impl DataFileBuilder {
    pub fn new(
        properties: SegmentPropertiesRef,
        version: ColumnarFormatVersion,
        writer: ChunkWriter,
        checksum_type: ChecksumType,
    ) -> Self {
        Self {
            properties,
            version,
            writer,
            checksum_type,
            data: vec![],
            blocklets: vec![],
            num_rows: 0,
        }
    }

    /// Append one blocklet. `dimensions[i]` holds the values of dimension column `i`.
    pub fn append_blocklet(
        &mut self,
        dimensions: &[Vec<Vec<u8>>],
        measures: &[MeasureColumnChunk],
    ) -> StorageResult<()> {
        if dimensions.len() != self.properties.num_dimensions()
            || measures.len() != self.properties.num_measures()
        {
            return Err(StorageError::decode(format!(
                "expected {} dimensions and {} measures, found {} and {}",
                self.properties.num_dimensions(),
                self.properties.num_measures(),
                dimensions.len(),
                measures.len()
            )));
        }
        let row_count = dimensions
            .iter()
            .map(|values| values.len())
            .chain(measures.iter().map(|m| m.row_count()))
            .all_equal_value()
            .map_err(|err| match err {
                Some(_) => StorageError::decode("columns of a blocklet differ in row count"),
                None => StorageError::decode("blocklet has no columns"),
            })?;
        for (measure, descriptor) in measures.iter().zip(self.properties.measures()) {
            if measure.data_type() != descriptor.data_type {
                return Err(StorageError::decode(format!(
                    "measure {} expects {:?}, found {:?}",
                    descriptor.name,
                    descriptor.data_type,
                    measure.data_type()
                )));
            }
        }

        // encode everything first so that a failed blocklet leaves the file untouched
        let mut dimension_chunks = Vec::with_capacity(dimensions.len());
        for (values, descriptor) in dimensions.iter().zip(self.properties.dimensions()) {
            let values = values.iter().map(|v| &v[..]);
            dimension_chunks.push(match self.version {
                ColumnarFormatVersion::V1 => {
                    self.writer.write_dimension::<HeaderV1>(values, descriptor.width)?
                }
                _ => self.writer.write_dimension::<HeaderV2>(values, descriptor.width)?,
            });
        }
        let mut measure_chunks = Vec::with_capacity(measures.len());
        for measure in measures {
            measure_chunks.push(match self.version {
                ColumnarFormatVersion::V1 => self.writer.write_measure::<HeaderV1>(measure)?,
                _ => self.writer.write_measure::<HeaderV2>(measure)?,
            });
        }

        let mut info = BlockletInfo {
            row_count: row_count as u32,
            ..Default::default()
        };
        for (chunk, values) in dimension_chunks.into_iter().zip(dimensions) {
            info.dimension_chunks.push(self.push_chunk(chunk));
            let (min, max) = match values.iter().minmax().into_option() {
                Some((min, max)) => (min.clone(), max.clone()),
                None => (vec![], vec![]),
            };
            info.min_values.push(min);
            info.max_values.push(max);
        }
        for chunk in measure_chunks {
            info.measure_chunks.push(self.push_chunk(chunk));
        }

        self.num_rows += row_count as u64;
        self.blocklets.push(info);
        Ok(())
    }

    fn push_chunk(&mut self, chunk: Vec<u8>) -> ChunkLocation {
        let location = ChunkLocation {
            offset: self.data.len() as u64,
            length: chunk.len() as u32,
        };
        self.data.extend_from_slice(&chunk);
        location
    }

    /// Finish the file. Returns the file content and its footer.
    pub fn finish(self) -> (Vec<u8>, DataFileFooter) {
        let footer = DataFileFooter {
            version: self.version.number(),
            num_rows: self.num_rows,
            columns: self.properties.to_columns(),
            blocklets: self.blocklets,
            file_path: String::new(),
        };
        let mut data = self.data;
        data.extend_from_slice(&encode_footer(&footer, self.checksum_type));
        (data, footer)
    }
}

/// Write a finished data file to `path`. Fails if the file exists.
pub fn write_data_file(path: impl AsRef<Path>, data: &[u8]) -> StorageResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    writer.write_all(data)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_data()?;
    info!(path = %path.as_ref().display(), bytes = data.len(), "data file written");
    Ok(())
}
