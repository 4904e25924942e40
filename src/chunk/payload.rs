// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Uncompressed chunk payloads, shared by all format versions.
//!
//! A dimension payload is either `row_count` fixed-width values, or `row_count` values each
//! prefixed with a little-endian `u16` length. A measure payload is encoded as follows:
//!
//! ```plain
//! | data_type | presence bitmap | values |
//! |    1B     | ceil(rows / 8)B | W * rows |
//! ```

use bytes::{Buf, BufMut, Bytes};

use super::{DimensionColumnChunk, MeasureColumnChunk, MeasureValues};
use crate::encode::{bitmap_len, decode_bitmap, encode_bitmap, PrimitiveFixedWidthEncode};
use crate::proto::DataType;
use crate::segment_properties::ValueWidth;
use crate::{StorageError, StorageResult};

pub fn encode_dimension_payload<'a>(
    values: impl IntoIterator<Item = &'a [u8]>,
    width: ValueWidth,
) -> StorageResult<Vec<u8>> {
    let mut buf = vec![];
    for value in values {
        match width {
            ValueWidth::Fixed(w) => {
                if value.len() != w {
                    return Err(StorageError::decode(format!(
                        "expected value of {w} bytes, found {}",
                        value.len()
                    )));
                }
            }
            ValueWidth::Variable => {
                let len = u16::try_from(value.len()).map_err(|_| {
                    StorageError::decode(format!("value of {} bytes is too long", value.len()))
                })?;
                buf.put_u16_le(len);
            }
        }
        buf.put_slice(value);
    }
    Ok(buf)
}

pub fn decode_dimension_payload(
    raw: Bytes,
    width: ValueWidth,
    row_count: usize,
) -> StorageResult<DimensionColumnChunk> {
    match width {
        ValueWidth::Fixed(w) => {
            if raw.len() != w * row_count {
                return Err(StorageError::decode(format!(
                    "expected {} rows of {} bytes, found {} bytes",
                    row_count,
                    w,
                    raw.len()
                )));
            }
            let offsets = (0..=row_count).map(|row| (row * w) as u32).collect();
            Ok(DimensionColumnChunk::new(raw, offsets))
        }
        ValueWidth::Variable => {
            let mut buf = raw;
            let mut values = Vec::with_capacity(row_count);
            for row in 0..row_count {
                if buf.remaining() < 2 {
                    return Err(StorageError::decode(format!("row {row} has no length prefix")));
                }
                let len = buf.get_u16_le() as usize;
                if buf.remaining() < len {
                    return Err(StorageError::decode(format!(
                        "row {row} declares {len} bytes, found {}",
                        buf.remaining()
                    )));
                }
                values.push(buf.split_to(len));
            }
            if buf.has_remaining() {
                return Err(StorageError::decode(format!(
                    "{} trailing bytes after {row_count} rows",
                    buf.remaining()
                )));
            }
            Ok(DimensionColumnChunk::from_values(values.iter().map(|v| &v[..])))
        }
    }
}

pub fn encode_measure_payload(chunk: &MeasureColumnChunk) -> Vec<u8> {
    fn encode_values<T: PrimitiveFixedWidthEncode>(values: &[T], buf: &mut Vec<u8>) {
        for value in values {
            value.encode(buf);
        }
    }

    let mut buf = vec![];
    buf.put_u8(i32::from(chunk.data_type()) as u8);
    encode_bitmap(chunk.present(), &mut buf);
    match chunk.values() {
        MeasureValues::Int32(v) => encode_values(v, &mut buf),
        MeasureValues::Int64(v) => encode_values(v, &mut buf),
        MeasureValues::Float64(v) => encode_values(v, &mut buf),
    }
    buf
}

pub fn decode_measure_payload(raw: Bytes, row_count: usize) -> StorageResult<MeasureColumnChunk> {
    fn decode_values<T: PrimitiveFixedWidthEncode>(
        buf: &mut &[u8],
        row_count: usize,
    ) -> StorageResult<Vec<T>> {
        if buf.remaining() != T::WIDTH * row_count {
            return Err(StorageError::decode(format!(
                "expected {} rows of {} bytes, found {} bytes",
                row_count,
                T::WIDTH,
                buf.remaining()
            )));
        }
        Ok((0..row_count).map(|_| T::decode(buf)).collect())
    }

    let mut buf = &raw[..];
    if buf.remaining() < 1 + bitmap_len(row_count) {
        return Err(StorageError::decode("measure chunk is smaller than its bitmap"));
    }
    let data_type = DataType::try_from(buf.get_u8() as i32)
        .map_err(|_| StorageError::decode("expected valid measure data type"))?;
    let present = decode_bitmap(&mut buf, row_count);
    let values = match data_type {
        DataType::Int32 => MeasureValues::Int32(decode_values(&mut buf, row_count)?),
        DataType::Int64 => MeasureValues::Int64(decode_values(&mut buf, row_count)?),
        DataType::Float64 => MeasureValues::Float64(decode_values(&mut buf, row_count)?),
        DataType::Bytes => return Err(StorageError::decode("measure chunk holds bytes")),
    };
    Ok(MeasureColumnChunk::new(values, present))
}
