// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),
    #[error("Prost decode error: {0}")]
    ProstDecode(#[from] prost::DecodeError),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Invalid checksum: found {0}, expected {1}")]
    Checksum(u64, u64),
    #[error("unknown compression codec: {0}")]
    UnknownCodec(u8),
    #[error("invalid row in delete delta: {token:?}")]
    InvalidDeleteRow { token: String },
    #[error("footer list is empty")]
    EmptyFooterList,
    #[error("inconsistent footer {path}: {reason}")]
    InconsistentFooter { path: String, reason: String },
}

impl StorageError {
    pub fn decode(message: impl ToString) -> Self {
        StorageError::Decode(message.to_string())
    }

    pub fn checksum(found: u64, expected: u64) -> Self {
        StorageError::Checksum(found, expected)
    }

    pub fn inconsistent_footer(path: impl ToString, reason: impl ToString) -> Self {
        StorageError::InconsistentFooter {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error comes from malformed or version-inconsistent input, as opposed to a
    /// failure of the underlying I/O.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            StorageError::Decode(_)
                | StorageError::Checksum(..)
                | StorageError::UnknownCodec(_)
                | StorageError::InvalidDeleteRow { .. }
                | StorageError::EmptyFooterList
                | StorageError::InconsistentFooter { .. }
                | StorageError::ProstDecode(_)
                | StorageError::JsonDecode(_)
        )
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
