// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Version-specific chunk headers.
//!
//! A chunk is a header followed by its compressed data. The V1 header describes a single
//! compressed page:
//!
//! ```plain
//! | codec | cksum_type | cksum | raw_len | data_len |   data   |
//! |  1B   |     1B     |  8B   |   4B    |    4B    | variable |
//! ```
//!
//! The V2 header splits the data into pages which are compressed independently:
//!
//! ```plain
//! | codec | cksum_type | cksum | raw_len | page_cnt | (data_len, raw_len) * page_cnt | pages |
//! |  1B   |     1B     |  8B   |   4B    |    4B    |          8B * page_cnt         |  var  |
//! ```
//!
//! The checksum covers the compressed data following the header.

use bytes::{Buf, BufMut};

use super::CodecId;
use crate::layout::ColumnarFormatVersion;
use crate::proto::ChecksumType;
use crate::{StorageError, StorageResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageInfo {
    /// Compressed length
    pub data_len: u32,
    /// Uncompressed length
    pub raw_len: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub codec: CodecId,
    pub checksum_type: ChecksumType,
    pub checksum: u64,
    pub raw_len: u32,
    pub pages: Vec<PageInfo>,
}

impl ChunkHeader {
    /// Total compressed length declared by the header.
    pub fn data_len(&self) -> usize {
        self.pages.iter().map(|p| p.data_len as usize).sum()
    }
}

const COMMON_HEADER_SIZE: usize = 1 + 1 + 8 + 4;

/// Binary layout of a chunk header for one format version.
pub trait ChunkHeaderFormat: Send + Sync + 'static {
    const VERSION: ColumnarFormatVersion;

    /// Whether the layout can describe more than one page.
    const PAGED: bool;

    fn encoded_len(header: &ChunkHeader) -> usize;

    fn encode(header: &ChunkHeader, buf: &mut impl BufMut);

    fn decode(buf: &mut impl Buf) -> StorageResult<ChunkHeader>;
}

pub struct HeaderV1;

pub struct HeaderV2;

fn encode_common(header: &ChunkHeader, buf: &mut impl BufMut) {
    buf.put_u8(header.codec.0);
    buf.put_u8(i32::from(header.checksum_type) as u8);
    buf.put_u64(header.checksum);
    buf.put_u32(header.raw_len);
}

fn decode_common(buf: &mut impl Buf) -> StorageResult<(CodecId, ChecksumType, u64, u32)> {
    ensure_remaining(buf, COMMON_HEADER_SIZE)?;
    let codec = CodecId(buf.get_u8());
    let checksum_type = ChecksumType::try_from(buf.get_u8() as i32)
        .map_err(|_| StorageError::decode("expected valid checksum type"))?;
    let checksum = buf.get_u64();
    let raw_len = buf.get_u32();
    Ok((codec, checksum_type, checksum, raw_len))
}

fn ensure_remaining(buf: &impl Buf, expected: usize) -> StorageResult<()> {
    if buf.remaining() < expected {
        return Err(StorageError::decode(format!(
            "chunk header truncated: expected {} bytes, found {}",
            expected,
            buf.remaining()
        )));
    }
    Ok(())
}

impl ChunkHeaderFormat for HeaderV1 {
    const VERSION: ColumnarFormatVersion = ColumnarFormatVersion::V1;
    const PAGED: bool = false;

    fn encoded_len(_header: &ChunkHeader) -> usize {
        COMMON_HEADER_SIZE + 4
    }

    fn encode(header: &ChunkHeader, buf: &mut impl BufMut) {
        debug_assert_eq!(header.pages.len(), 1);
        encode_common(header, buf);
        buf.put_u32(header.data_len() as u32);
    }

    fn decode(buf: &mut impl Buf) -> StorageResult<ChunkHeader> {
        let (codec, checksum_type, checksum, raw_len) = decode_common(buf)?;
        ensure_remaining(buf, 4)?;
        let data_len = buf.get_u32();
        Ok(ChunkHeader {
            codec,
            checksum_type,
            checksum,
            raw_len,
            pages: vec![PageInfo { data_len, raw_len }],
        })
    }
}

impl ChunkHeaderFormat for HeaderV2 {
    const VERSION: ColumnarFormatVersion = ColumnarFormatVersion::V2;
    const PAGED: bool = true;

    fn encoded_len(header: &ChunkHeader) -> usize {
        COMMON_HEADER_SIZE + 4 + header.pages.len() * 8
    }

    fn encode(header: &ChunkHeader, buf: &mut impl BufMut) {
        encode_common(header, buf);
        buf.put_u32(header.pages.len() as u32);
        for page in &header.pages {
            buf.put_u32(page.data_len);
            buf.put_u32(page.raw_len);
        }
    }

    fn decode(buf: &mut impl Buf) -> StorageResult<ChunkHeader> {
        let (codec, checksum_type, checksum, raw_len) = decode_common(buf)?;
        ensure_remaining(buf, 4)?;
        let page_count = buf.get_u32() as usize;
        ensure_remaining(buf, page_count * 8)?;
        let pages = (0..page_count)
            .map(|_| PageInfo {
                data_len: buf.get_u32(),
                raw_len: buf.get_u32(),
            })
            .collect::<Vec<_>>();
        let paged_raw_len: u64 = pages.iter().map(|p| p.raw_len as u64).sum();
        if paged_raw_len != raw_len as u64 {
            return Err(StorageError::decode(format!(
                "pages expand to {paged_raw_len} bytes, header declares {raw_len}"
            )));
        }
        Ok(ChunkHeader {
            codec,
            checksum_type,
            checksum,
            raw_len,
            pages,
        })
    }
}
