// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Column chunks: the compressed byte range of one column within one blocklet.
//!
//! Chunks are written by [`ChunkWriter`] and decoded by the readers chosen by
//! [`ChunkReaderSelector`]. Dimension chunks decode to raw values with per-row boundaries,
//! measure chunks decode to typed values with a presence bitmap. The decoded output does not
//! depend on the format version of the chunk.

mod codec;
mod file;
mod header;
mod payload;
mod reader;
mod selector;
mod writer;

use bitvec::prelude::BitVec;
use bytes::{Bytes, BytesMut};
pub use codec::*;
pub use file::*;
pub use header::*;
pub use payload::*;
pub use reader::*;
pub use selector::*;
pub use writer::*;

use crate::proto::DataType;

/// Decoded dimension chunk. Row `i` occupies `data[offsets[i]..offsets[i + 1]]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DimensionColumnChunk {
    data: Bytes,
    offsets: Vec<u32>,
}

impl DimensionColumnChunk {
    pub fn new(data: Bytes, offsets: Vec<u32>) -> Self {
        debug_assert!(!offsets.is_empty());
        Self { data, offsets }
    }

    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut data = BytesMut::new();
        let mut offsets = vec![0];
        for value in values {
            data.extend_from_slice(value);
            offsets.push(data.len() as u32);
        }
        Self::new(data.freeze(), offsets)
    }

    pub fn row_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn value(&self, row: usize) -> &[u8] {
        &self.data[self.offsets[row] as usize..self.offsets[row + 1] as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.row_count()).map(|row| self.value(row))
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Keep the rows whose bit is set in `visibility`.
    pub fn filter(&self, visibility: &BitVec) -> Self {
        debug_assert_eq!(visibility.len(), self.row_count());
        Self::from_values(visibility.iter_ones().map(|row| self.value(row)))
    }
}

/// Typed values of a measure chunk. Null slots hold `0`.
#[derive(Clone, Debug, PartialEq)]
pub enum MeasureValues {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
}

/// A single measure value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MeasureValue {
    Int32(i32),
    Int64(i64),
    Float64(f64),
}

impl MeasureValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
        }
    }

    pub fn get(&self, row: usize) -> MeasureValue {
        match self {
            Self::Int32(v) => MeasureValue::Int32(v[row]),
            Self::Int64(v) => MeasureValue::Int64(v[row]),
            Self::Float64(v) => MeasureValue::Float64(v[row]),
        }
    }

    fn select(&self, rows: impl Iterator<Item = usize>) -> Self {
        match self {
            Self::Int32(v) => Self::Int32(rows.map(|row| v[row]).collect()),
            Self::Int64(v) => Self::Int64(rows.map(|row| v[row]).collect()),
            Self::Float64(v) => Self::Float64(rows.map(|row| v[row]).collect()),
        }
    }
}

/// Decoded measure chunk: typed values and a bitmap marking the non-null rows.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasureColumnChunk {
    values: MeasureValues,
    present: BitVec,
}

macro_rules! impl_from_options {
    ($fn_name:ident, $ty:ty, $variant:ident) => {
        pub fn $fn_name(values: impl IntoIterator<Item = Option<$ty>>) -> Self {
            let (present, values): (BitVec, Vec<$ty>) = values
                .into_iter()
                .map(|v| (v.is_some(), v.unwrap_or_default()))
                .unzip();
            Self::new(MeasureValues::$variant(values), present)
        }
    };
}

impl MeasureColumnChunk {
    pub fn new(values: MeasureValues, present: BitVec) -> Self {
        debug_assert_eq!(values.len(), present.len());
        Self { values, present }
    }

    impl_from_options!(from_i32, i32, Int32);
    impl_from_options!(from_i64, i64, Int64);
    impl_from_options!(from_f64, f64, Float64);

    pub fn row_count(&self) -> usize {
        self.present.len()
    }

    pub fn data_type(&self) -> DataType {
        self.values.data_type()
    }

    pub fn values(&self) -> &MeasureValues {
        &self.values
    }

    pub fn present(&self) -> &BitVec {
        &self.present
    }

    pub fn is_null(&self, row: usize) -> bool {
        !self.present[row]
    }

    pub fn value(&self, row: usize) -> Option<MeasureValue> {
        if self.is_null(row) {
            None
        } else {
            Some(self.values.get(row))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<MeasureValue>> + '_ {
        (0..self.row_count()).map(|row| self.value(row))
    }

    /// Keep the rows whose bit is set in `visibility`.
    pub fn filter(&self, visibility: &BitVec) -> Self {
        debug_assert_eq!(visibility.len(), self.row_count());
        let values = self.values.select(visibility.iter_ones());
        let present = visibility.iter_ones().map(|row| self.present[row]).collect();
        Self::new(values, present)
    }
}

#[cfg(test)]
mod tests {
    use bitvec::prelude::*;

    use super::*;

    #[test]
    fn test_dimension_filter() {
        let chunk = DimensionColumnChunk::from_values([&b"a"[..], &b"bb"[..], &b""[..], &b"dddd"[..]]);
        assert_eq!(chunk.row_count(), 4);
        assert_eq!(chunk.value(1), b"bb");
        assert_eq!(chunk.value(2), b"");

        let filtered = chunk.filter(&bitvec![1, 0, 1, 1]);
        assert_eq!(
            filtered.iter().collect::<Vec<_>>(),
            vec![&b"a"[..], &b""[..], &b"dddd"[..]]
        );
        assert_eq!(filtered.offsets(), &[0, 1, 1, 5]);
    }

    #[test]
    fn test_measure_filter() {
        let chunk = MeasureColumnChunk::from_i64([Some(1), None, Some(3)]);
        assert_eq!(chunk.data_type(), DataType::Int64);
        assert!(chunk.is_null(1));
        assert_eq!(chunk.value(2), Some(MeasureValue::Int64(3)));

        let filtered = chunk.filter(&bitvec![0, 1, 1]);
        assert_eq!(
            filtered.iter().collect::<Vec<_>>(),
            vec![None, Some(MeasureValue::Int64(3))]
        );
    }
}
