// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::chunk::CodecId;
use crate::proto::ChecksumType;

/// Property holding the total number of attempts made to acquire a metadata lock.
pub const LOCK_RETRIES_PROPERTY: &str = "segment.lock.retries";
/// Property holding the number of seconds to wait between two lock attempts.
pub const LOCK_RETRY_INTERVAL_PROPERTY: &str = "segment.lock.retry.interval.secs";

pub const DEFAULT_LOCK_RETRIES: u32 = 3;
pub const DEFAULT_LOCK_RETRY_INTERVAL_SECS: u64 = 5;

/// IO Backend of the chunk readers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IOBackend {
    /// Use `pread` to read from the files.
    PositionedRead,
    /// Use cross-platform seek + read. Note that this would hurt performance
    NormalRead,
}

/// Retry behavior of metadata locks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockOptions {
    /// Total number of calls made to the single-shot lock primitive
    pub retry_count: u32,

    /// Fixed wait between two failed attempts
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_LOCK_RETRIES,
            retry_interval: Duration::from_secs(DEFAULT_LOCK_RETRY_INTERVAL_SECS),
        }
    }
}

impl LockOptions {
    /// Read the lock options from string properties. Missing or unparsable values fall back to
    /// the defaults instead of failing; any parsed value is kept, so an interval of `0` retries
    /// immediately.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let retry_count =
            parse_property(properties, LOCK_RETRIES_PROPERTY).unwrap_or(DEFAULT_LOCK_RETRIES);
        let interval_secs = parse_property(properties, LOCK_RETRY_INTERVAL_PROPERTY)
            .unwrap_or(DEFAULT_LOCK_RETRY_INTERVAL_SECS);
        Self {
            retry_count,
            retry_interval: Duration::from_secs(interval_secs),
        }
    }
}

fn parse_property<T: std::str::FromStr>(properties: &HashMap<String, String>, key: &str) -> Option<T> {
    let value = properties.get(key)?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = value.as_str(), "invalid property, using default");
            None
        }
    }
}

/// Options for a segment store
#[derive(Clone, Debug)]
pub struct StorageOptions {
    /// Root directory of the table files and lock files
    pub path: PathBuf,

    /// I/O Backend used by the chunk readers
    pub io_backend: IOBackend,

    /// Checksum type used by chunk writers
    pub checksum_type: ChecksumType,

    /// Compression codec used by chunk writers
    pub codec: CodecId,

    /// Target uncompressed size (in bytes) of a page in V2 chunks
    pub target_page_size: usize,

    /// Retry behavior of metadata locks
    pub lock: LockOptions,
}

impl StorageOptions {
    pub fn default_for_cli() -> Self {
        Self {
            path: PathBuf::new().join("segment-store.db"),
            io_backend: if cfg!(unix) {
                IOBackend::PositionedRead
            } else {
                warn!("chunk readers are running in compatibility mode (NormalRead), which might hurt I/O performance.");
                IOBackend::NormalRead
            },
            checksum_type: ChecksumType::Crc32,
            codec: CodecId::LZ4,
            target_page_size: 32 * (1 << 10), // 32KB
            lock: LockOptions::default(),
        }
    }

    pub fn default_for_test(path: PathBuf) -> Self {
        Self {
            path,
            io_backend: IOBackend::NormalRead,
            checksum_type: ChecksumType::Crc32,
            codec: CodecId::NONE,
            target_page_size: 64,
            lock: LockOptions {
                retry_count: 2,
                retry_interval: Duration::from_millis(10),
            },
        }
    }

    pub fn from_properties(path: PathBuf, properties: &HashMap<String, String>) -> Self {
        Self {
            lock: LockOptions::from_properties(properties),
            ..Self::default_for_cli()
        }
        .with_path(path)
    }

    fn with_path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_lock_options_defaults() {
        let options = LockOptions::from_properties(&HashMap::new());
        assert_eq!(options.retry_count, 3);
        assert_eq!(options.retry_interval, Duration::from_secs(5));
    }

    #[test_case("7", "2", 7, 2; "configured")]
    #[test_case("abc", "2", 3, 2; "bad retries")]
    #[test_case("4", "-1", 4, 5; "bad interval")]
    #[test_case("0", " 1 ", 0, 1; "zero retries")]
    #[test_case("2", "0", 2, 0; "zero interval")]
    fn test_lock_options_parse(retries: &str, interval: &str, count: u32, secs: u64) {
        let options = LockOptions::from_properties(&props(&[
            (LOCK_RETRIES_PROPERTY, retries),
            (LOCK_RETRY_INTERVAL_PROPERTY, interval),
        ]));
        assert_eq!(options.retry_count, count);
        assert_eq!(options.retry_interval, Duration::from_secs(secs));
    }

    #[test]
    fn test_storage_options_from_properties() {
        let options = StorageOptions::from_properties(
            PathBuf::from("/tmp/store"),
            &props(&[(LOCK_RETRIES_PROPERTY, "9")]),
        );
        assert_eq!(options.path, PathBuf::from("/tmp/store"));
        assert_eq!(options.lock.retry_count, 9);
    }
}
