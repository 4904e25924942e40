// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use crate::proto::ChecksumType;
use crate::{StorageError, StorageResult};

pub fn build_checksum(checksum_type: ChecksumType, data: &[u8]) -> u64 {
    match checksum_type {
        ChecksumType::None => 0,
        ChecksumType::Crc32 => crc32fast::hash(data) as u64,
    }
}

pub fn verify_checksum(checksum_type: ChecksumType, data: &[u8], checksum: u64) -> StorageResult<()> {
    match checksum_type {
        ChecksumType::None => Ok(()),
        ChecksumType::Crc32 => {
            let found = crc32fast::hash(data) as u64;
            if found != checksum {
                return Err(StorageError::checksum(found, checksum));
            }
            Ok(())
        }
    }
}
