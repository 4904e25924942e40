// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bytes::{Buf, BufMut};
use prost::Message;
use tracing::debug;

use crate::checksum::{build_checksum, verify_checksum};
use crate::proto::{ChecksumType, DataFileFooter};
use crate::{StorageError, StorageResult};

pub const FOOTER_MAGIC: u32 = 0x5E6_F007;
pub const FOOTER_TRAILER_SIZE: usize = 4 + 8 + 4 + 8;

/// Encode the footer of a data file, to be appended after its last chunk.
///
/// ```plain
/// | footer (protobuf) | magic number (4B) | footer length (8B) | checksum type (4B) | checksum (8B) |
/// ```
///
/// `file_path` is never persisted.
pub fn encode_footer(footer: &DataFileFooter, checksum_type: ChecksumType) -> Vec<u8> {
    let mut footer = footer.clone();
    footer.file_path.clear();
    let mut data = footer.encode_to_vec();
    let checksum = build_checksum(checksum_type, &data);
    let len = data.len() as u64;

    data.put_u32(FOOTER_MAGIC);
    data.put_u64(len);
    data.put_i32(checksum_type.into());
    data.put_u64(checksum);
    data
}

struct Trailer {
    footer_len: usize,
    checksum_type: ChecksumType,
    checksum: u64,
}

fn decode_trailer(mut trailer: &[u8]) -> StorageResult<Trailer> {
    if trailer.len() < FOOTER_TRAILER_SIZE {
        return Err(StorageError::decode("data file is smaller than the footer trailer"));
    }
    if trailer.get_u32() != FOOTER_MAGIC {
        return Err(StorageError::decode("failed to decode footer: invalid magic"));
    }
    let footer_len = trailer.get_u64() as usize;
    let checksum_type = ChecksumType::try_from(trailer.get_i32())
        .map_err(|_| StorageError::decode("invalid checksum type"))?;
    let checksum = trailer.get_u64();
    Ok(Trailer {
        footer_len,
        checksum_type,
        checksum,
    })
}

fn decode_body(body: &[u8], trailer: &Trailer) -> StorageResult<DataFileFooter> {
    verify_checksum(trailer.checksum_type, body, trailer.checksum)?;
    Ok(DataFileFooter::decode(body)?)
}

/// Decode a footer from bytes ending with the footer trailer.
pub fn decode_footer(data: &[u8]) -> StorageResult<DataFileFooter> {
    if data.len() < FOOTER_TRAILER_SIZE {
        return Err(StorageError::decode("data file is smaller than the footer trailer"));
    }
    let trailer_start = data.len() - FOOTER_TRAILER_SIZE;
    let trailer = decode_trailer(&data[trailer_start..])?;
    let body_start = trailer_start.checked_sub(trailer.footer_len).ok_or_else(|| {
        StorageError::decode(format!(
            "footer declares {} bytes, only {} available",
            trailer.footer_len, trailer_start
        ))
    })?;
    decode_body(&data[body_start..trailer_start], &trailer)
}

/// Read the footer at the end of the data file at `path`. The returned footer carries the
/// path of the file.
pub fn read_footer(path: impl AsRef<Path>) -> StorageResult<DataFileFooter> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    if file_len < FOOTER_TRAILER_SIZE as u64 {
        return Err(StorageError::decode(format!(
            "{} is smaller than the footer trailer",
            path.display()
        )));
    }

    let mut trailer = [0; FOOTER_TRAILER_SIZE];
    file.seek(SeekFrom::End(-(FOOTER_TRAILER_SIZE as i64)))?;
    file.read_exact(&mut trailer)?;
    let trailer = decode_trailer(&trailer)?;

    let body_end = file_len - FOOTER_TRAILER_SIZE as u64;
    let body_start = body_end.checked_sub(trailer.footer_len as u64).ok_or_else(|| {
        StorageError::decode(format!(
            "footer of {} declares {} bytes, only {} available",
            path.display(),
            trailer.footer_len,
            body_end
        ))
    })?;
    let mut body = vec![0; trailer.footer_len];
    file.seek(SeekFrom::Start(body_start))?;
    file.read_exact(&mut body)?;

    let mut footer = decode_body(&body, &trailer)?;
    footer.file_path = path.display().to_string();
    debug!(
        path = %path.display(),
        blocklets = footer.blocklets.len(),
        version = footer.version,
        "read footer"
    );
    Ok(footer)
}
