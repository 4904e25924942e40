// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use bytes::Bytes;

use crate::options::IOBackend;
use crate::{StorageError, StorageResult};

/// Where the chunks of a blocklet are read from.
#[derive(Clone, Debug)]
pub enum ChunkSource {
    Path(PathBuf),
    /// An in-memory data file
    InMemory(Bytes),
}

impl From<PathBuf> for ChunkSource {
    fn from(path: PathBuf) -> Self {
        ChunkSource::Path(path)
    }
}

impl From<Bytes> for ChunkSource {
    fn from(data: Bytes) -> Self {
        ChunkSource::InMemory(data)
    }
}

/// An opened [`ChunkSource`]. Owned by a single reader.
pub enum ChunkFile {
    /// For `read_at`
    #[cfg(unix)]
    PositionedRead(File),
    /// For `seek().read()`
    NormalRead(File),
    InMemory(Bytes),
}

impl ChunkFile {
    pub fn open(source: &ChunkSource, io_backend: IOBackend) -> StorageResult<Self> {
        Ok(match source {
            ChunkSource::InMemory(data) => ChunkFile::InMemory(data.clone()),
            #[cfg(unix)]
            ChunkSource::Path(path) if io_backend == IOBackend::PositionedRead => {
                ChunkFile::PositionedRead(File::open(path)?)
            }
            ChunkSource::Path(path) => ChunkFile::NormalRead(File::open(path)?),
        })
    }

    /// Read exactly `length` bytes at `offset`. A source holding fewer bytes is a decode error,
    /// never a truncated result.
    pub fn read_at(&mut self, offset: u64, length: usize) -> StorageResult<Bytes> {
        let data = match self {
            #[cfg(unix)]
            ChunkFile::PositionedRead(file) => {
                let mut data = vec![0; length];
                let mut filled = 0;
                while filled < length {
                    let n = file.read_at(&mut data[filled..], offset + filled as u64)?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
                data.truncate(filled);
                Bytes::from(data)
            }
            ChunkFile::NormalRead(file) => {
                let mut data = Vec::with_capacity(length);
                file.seek(SeekFrom::Start(offset))?;
                file.by_ref().take(length as u64).read_to_end(&mut data)?;
                Bytes::from(data)
            }
            ChunkFile::InMemory(file) => {
                let start = (offset as usize).min(file.len());
                let end = start.saturating_add(length).min(file.len());
                file.slice(start..end)
            }
        };
        if data.len() != length {
            return Err(StorageError::decode(format!(
                "expected {} bytes at offset {}, found {}",
                length,
                offset,
                data.len()
            )));
        }
        Ok(data)
    }
}
