// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Delete deltas: rows logically deleted from a block without rewriting it.
//!
//! A delta is stored next to its block in one of two text forms. The legacy form is a list of
//! comma-separated row offsets (`1,2,3`). The structured form is a JSON document:
//!
//! ```json
//! {"blockName":"B1","deletedRows":[2,5,9]}
//! ```
//!
//! Row offsets are relative to the start of the block.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bitvec::prelude::BitVec;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::lock::LockGuard;
use crate::{StorageError, StorageResult};

/// Deleted rows of one block, sorted and unique.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDeltaBlockDetails {
    pub block_name: String,
    pub deleted_rows: BTreeSet<u32>,
}

impl DeleteDeltaBlockDetails {
    pub fn new(block_name: impl Into<String>) -> Self {
        Self {
            block_name: block_name.into(),
            deleted_rows: BTreeSet::new(),
        }
    }

    pub fn add_rows(&mut self, rows: impl IntoIterator<Item = u32>) {
        self.deleted_rows.extend(rows);
    }

    pub fn merge(&mut self, other: &DeleteDeltaBlockDetails) {
        self.deleted_rows.extend(other.deleted_rows.iter().copied());
    }

    pub fn is_deleted(&self, row: u32) -> bool {
        self.deleted_rows.contains(&row)
    }

    pub fn is_empty(&self) -> bool {
        self.deleted_rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deleted_rows.len()
    }

    /// Visibility of the rows `first_row..first_row + row_count` of the block: a bit is unset
    /// iff the row is deleted.
    pub fn visibility(&self, first_row: u64, row_count: usize) -> BitVec {
        let mut visibility = BitVec::repeat(true, row_count);
        let Ok(start) = u32::try_from(first_row) else {
            return visibility;
        };
        let end = first_row + row_count as u64;
        for row in self
            .deleted_rows
            .range(start..)
            .take_while(|row| (**row as u64) < end)
        {
            visibility.set((*row - start) as usize, false);
        }
        visibility
    }
}

/// Reads and writes the delete delta of one block.
pub struct DeleteDeltaStore<F: FileSystem> {
    fs: F,
    path: PathBuf,
    block_name: String,
}

impl<F: FileSystem> DeleteDeltaStore<F> {
    pub fn new(fs: F, path: impl Into<PathBuf>, block_name: impl Into<String>) -> Self {
        Self {
            fs,
            path: path.into(),
            block_name: block_name.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_name(&self) -> &str {
        &self.block_name
    }

    /// Read the delta text. A missing resource is an error.
    pub fn read_delta_raw(&self) -> StorageResult<String> {
        Ok(self.fs.read_to_string(&self.path)?)
    }

    /// Read a delta in the legacy comma-separated form.
    pub fn read_delta_rows(&self) -> StorageResult<Vec<u32>> {
        parse_delta_rows(&self.read_delta_raw()?)
    }

    /// Read a delta in the structured form.
    ///
    /// A missing resource reads as no deleted rows, and so does an I/O failure, which is
    /// logged. Malformed content is an error.
    pub fn read_delta_structured(&self) -> StorageResult<DeleteDeltaBlockDetails> {
        match self.read_structured() {
            Err(StorageError::Io(err)) => {
                warn!(path = %self.path.display(), %err, "failed to read delete delta, assuming no deleted rows");
                Ok(DeleteDeltaBlockDetails::new(&self.block_name))
            }
            result => result,
        }
    }

    /// Like [`Self::read_delta_structured`], but I/O failures are errors.
    fn read_structured(&self) -> StorageResult<DeleteDeltaBlockDetails> {
        if !self.fs.exists(&self.path)? {
            return Ok(DeleteDeltaBlockDetails::new(&self.block_name));
        }
        let text = match self.fs.read_to_string(&self.path) {
            Ok(text) => text,
            // removed after the existence check
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(DeleteDeltaBlockDetails::new(&self.block_name))
            }
            // not UTF-8: the content is malformed, the read itself succeeded
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                return Err(StorageError::decode(format!(
                    "delete delta {} is not valid text: {}",
                    self.path.display(),
                    err
                )))
            }
            Err(err) => return Err(err.into()),
        };
        if text.trim().is_empty() {
            return Ok(DeleteDeltaBlockDetails::new(&self.block_name));
        }
        let details: DeleteDeltaBlockDetails = serde_json::from_str(&text)?;
        if details.block_name != self.block_name {
            return Err(StorageError::decode(format!(
                "delete delta {} belongs to block {:?}, expected {:?}",
                self.path.display(),
                details.block_name,
                self.block_name
            )));
        }
        Ok(details)
    }

    /// Atomically replace the delta with `details` in the structured form.
    pub fn write_delta_structured(&self, details: &DeleteDeltaBlockDetails) -> StorageResult<()> {
        let data = serde_json::to_vec(details)?;
        self.fs.write_atomic(&self.path, &data)?;
        debug!(path = %self.path.display(), rows = details.len(), "delete delta written");
        Ok(())
    }

    /// Atomically replace the delta with `rows` in the legacy form. The legacy form cannot
    /// express an empty delta, so `rows` must not be empty.
    pub fn write_delta_rows(&self, rows: &[u32]) -> StorageResult<()> {
        if rows.is_empty() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "legacy delete delta needs at least one row",
            )
            .into());
        }
        let text = rows.iter().sorted_unstable().dedup().join(",");
        self.fs.write_atomic(&self.path, text.as_bytes())?;
        Ok(())
    }

    /// Add `rows` to the deleted rows of the block. The caller must hold the metadata lock of
    /// the table, proven by `guard`.
    pub fn merge_delta(
        &self,
        guard: &LockGuard<'_>,
        rows: impl IntoIterator<Item = u32>,
    ) -> StorageResult<DeleteDeltaBlockDetails> {
        // a failed read must not be mistaken for an empty delta here
        let mut details = self.read_structured()?;
        let before = details.len();
        details.add_rows(rows);
        self.write_delta_structured(&details)?;
        debug!(
            lock = %guard.descriptor(),
            block = %self.block_name,
            added = details.len() - before,
            "delete delta merged"
        );
        Ok(details)
    }
}

/// Parse a legacy delta. Surrounding whitespace is ignored. Every token must be a row offset,
/// so an empty text is an error.
pub fn parse_delta_rows(text: &str) -> StorageResult<Vec<u32>> {
    text.trim()
        .split(',')
        .map(|token| {
            token
                .trim()
                .parse::<u32>()
                .map_err(|_| StorageError::InvalidDeleteRow {
                    token: token.to_string(),
                })
        })
        .collect()
}
