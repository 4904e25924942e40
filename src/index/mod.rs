// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Block index of a segment.
//!
//! A [`BlockIndex`] is built once from the footers of the data files of a segment and then
//! handed to an external cache. Readers pin the index while they use it; the cache may only
//! evict an index whose pin count is zero.

mod tree;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use prost::Message;
use tracing::info;
pub use tree::*;

use crate::layout::{BlockletLayout, ColumnarFormatVersion};
use crate::proto::DataFileFooter;
use crate::segment_properties::{SegmentProperties, SegmentPropertiesRef};
use crate::{StorageError, StorageResult};

/// Contract between a cached object and the cache holding it.
pub trait Cacheable: Send + Sync {
    /// Freshness token of the underlying files.
    fn file_timestamp(&self) -> u64;

    /// Number of readers currently using the object.
    fn access_count(&self) -> usize;

    /// Estimated memory footprint in bytes.
    fn memory_size(&self) -> u64;

    fn is_evictable(&self) -> bool {
        self.access_count() == 0
    }
}

#[derive(Debug)]
pub struct BlockIndex {
    properties: SegmentPropertiesRef,
    tree: BlockletTree,
    total_row_count: u64,
    access_count: AtomicUsize,
    memory_size: AtomicU64,
    file_timestamp: u64,
}

impl BlockIndex {
    /// Build the index from the footers of a segment. The segment properties are taken from
    /// the first footer.
    pub fn build(footers: &[DataFileFooter]) -> StorageResult<Self> {
        let first = footers.first().ok_or(StorageError::EmptyFooterList)?;
        let properties = SegmentProperties::from_columns(&first.columns)?;
        Self::build_with_properties(Arc::new(properties), footers)
    }

    /// Build the index from the footers of a segment whose properties are already known.
    pub fn build_with_properties(
        properties: SegmentPropertiesRef,
        footers: &[DataFileFooter],
    ) -> StorageResult<Self> {
        if footers.is_empty() {
            return Err(StorageError::EmptyFooterList);
        }

        let mut nodes = vec![];
        let mut first_row_in_segment = 0;
        let mut memory_size = 0;
        for footer in footers {
            validate_footer(&properties, footer)?;
            let file_path: Arc<str> = footer.file_path.as_str().into();
            let version = ColumnarFormatVersion::from_number(footer.version);
            let mut first_row_in_block = 0;
            for (blocklet_id, info) in footer.blocklets.iter().enumerate() {
                nodes.push(DataRefNode {
                    file_path: file_path.clone(),
                    blocklet_id: blocklet_id as u32,
                    first_row_in_block,
                    first_row_in_segment,
                    layout: Arc::new(BlockletLayout::from_info(version, info)),
                    min_values: info.min_values.clone(),
                    max_values: info.max_values.clone(),
                });
                first_row_in_block += info.row_count as u64;
                first_row_in_segment += info.row_count as u64;
            }
            memory_size += footer.encoded_len() as u64;
        }

        info!(
            files = footers.len(),
            blocklets = nodes.len(),
            rows = first_row_in_segment,
            "block index built"
        );
        Ok(Self {
            properties,
            tree: BlockletTree::new(nodes),
            total_row_count: first_row_in_segment,
            access_count: AtomicUsize::new(0),
            memory_size: AtomicU64::new(memory_size),
            file_timestamp: 0,
        })
    }

    pub fn with_file_timestamp(mut self, file_timestamp: u64) -> Self {
        self.file_timestamp = file_timestamp;
        self
    }

    pub fn segment_properties(&self) -> &SegmentPropertiesRef {
        &self.properties
    }

    pub fn block_reference_tree(&self) -> &BlockletTree {
        &self.tree
    }

    pub fn total_row_count(&self) -> u64 {
        self.total_row_count
    }

    pub fn pin(&self) {
        self.access_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the pin count. Does nothing if the index is not pinned.
    pub fn unpin(&self) {
        let _ = self
            .access_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            });
    }

    /// Pin the index until the returned guard is dropped.
    pub fn pin_guard(self: &Arc<Self>) -> PinGuard {
        self.pin();
        PinGuard {
            index: self.clone(),
        }
    }

    pub fn access_count(&self) -> usize {
        self.access_count.load(Ordering::SeqCst)
    }

    pub fn memory_size(&self) -> u64 {
        self.memory_size.load(Ordering::Relaxed)
    }

    pub fn set_memory_size(&self, bytes: u64) {
        self.memory_size.store(bytes, Ordering::Relaxed);
    }

    pub fn file_timestamp(&self) -> u64 {
        self.file_timestamp
    }
}

impl Cacheable for BlockIndex {
    fn file_timestamp(&self) -> u64 {
        self.file_timestamp
    }

    fn access_count(&self) -> usize {
        BlockIndex::access_count(self)
    }

    fn memory_size(&self) -> u64 {
        BlockIndex::memory_size(self)
    }
}

fn validate_footer(properties: &SegmentProperties, footer: &DataFileFooter) -> StorageResult<()> {
    let inconsistent = |reason: String| StorageError::inconsistent_footer(&footer.file_path, reason);

    let footer_properties = SegmentProperties::from_columns(&footer.columns)?;
    if let Some(diff) = properties.diff(&footer_properties) {
        return Err(inconsistent(diff));
    }
    for (id, blocklet) in footer.blocklets.iter().enumerate() {
        if blocklet.dimension_chunks.len() != properties.num_dimensions()
            || blocklet.measure_chunks.len() != properties.num_measures()
        {
            return Err(inconsistent(format!(
                "blocklet {id} has {} dimension and {} measure chunks",
                blocklet.dimension_chunks.len(),
                blocklet.measure_chunks.len()
            )));
        }
        if blocklet.min_values.len() != blocklet.max_values.len()
            || (!blocklet.min_values.is_empty()
                && blocklet.min_values.len() != properties.num_dimensions())
        {
            return Err(inconsistent(format!(
                "blocklet {id} has {} min and {} max values",
                blocklet.min_values.len(),
                blocklet.max_values.len()
            )));
        }
    }
    let rows: u64 = footer.blocklets.iter().map(|b| b.row_count as u64).sum();
    if rows != footer.num_rows {
        return Err(inconsistent(format!(
            "blocklets hold {rows} rows, footer declares {}",
            footer.num_rows
        )));
    }
    Ok(())
}

/// Keeps a [`BlockIndex`] pinned while alive.
pub struct PinGuard {
    index: Arc<BlockIndex>,
}

impl PinGuard {
    pub fn index(&self) -> &Arc<BlockIndex> {
        &self.index
    }
}

impl std::ops::Deref for PinGuard {
    type Target = BlockIndex;

    fn deref(&self) -> &BlockIndex {
        &self.index
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.index.unpin();
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::proto::{BlockletInfo, ChunkLocation};
    use crate::segment_properties::tests::helper_properties;

    fn blocklet(row_count: u32) -> BlockletInfo {
        BlockletInfo {
            row_count,
            dimension_chunks: vec![ChunkLocation::default(); 2],
            measure_chunks: vec![ChunkLocation::default()],
            min_values: vec![b"aa".to_vec(), b"alice".to_vec()],
            max_values: vec![b"zz".to_vec(), b"zoe".to_vec()],
        }
    }

    fn footer(path: &str, version: u32, row_counts: &[u32]) -> DataFileFooter {
        DataFileFooter {
            version,
            num_rows: row_counts.iter().map(|r| *r as u64).sum(),
            columns: helper_properties().to_columns(),
            blocklets: row_counts.iter().map(|r| blocklet(*r)).collect(),
            file_path: path.into(),
        }
    }

    fn helper_index() -> BlockIndex {
        BlockIndex::build(&[footer("part-0", 1, &[10, 20]), footer("part-1", 2, &[5])]).unwrap()
    }

    #[test]
    fn test_build() {
        let index = helper_index();
        assert_eq!(index.total_row_count(), 35);
        assert_eq!(**index.segment_properties(), helper_properties());

        let tree = index.block_reference_tree();
        assert_eq!(tree.len(), 3);
        let node = tree.node_of_row(31).unwrap();
        assert_eq!(&*node.file_path, "part-1");
        assert_eq!(node.first_row_in_block, 0);
        assert_eq!(node.first_row_in_segment, 30);
        assert_eq!(node.layout.version, ColumnarFormatVersion::V2);

        let node = tree.node_of_row(12).unwrap();
        assert_eq!((node.blocklet_id, node.first_row_in_block), (1, 10));
        assert_eq!(node.layout.version, ColumnarFormatVersion::V1);

        assert!(index.memory_size() > 0);
        index.set_memory_size(4096);
        assert_eq!(Cacheable::memory_size(&index), 4096);
        assert_eq!(index.file_timestamp(), 0);
        assert_eq!(helper_index().with_file_timestamp(42).file_timestamp(), 42);
    }

    #[test]
    fn test_empty_footer_list() {
        assert!(matches!(
            BlockIndex::build(&[]),
            Err(StorageError::EmptyFooterList)
        ));
        assert!(BlockIndex::build_with_properties(Arc::new(helper_properties()), &[]).is_err());
    }

    #[test]
    fn test_inconsistent_footers() {
        let mut other = footer("part-1", 2, &[5]);
        other.columns.pop();
        let err = BlockIndex::build(&[footer("part-0", 2, &[10]), other]).unwrap_err();
        assert!(matches!(err, StorageError::InconsistentFooter { ref path, .. } if path == "part-1"));
        assert!(err.is_format_error());

        let mut other = footer("part-1", 2, &[5]);
        other.blocklets[0].measure_chunks.clear();
        assert!(BlockIndex::build(&[other]).is_err());

        let mut other = footer("part-1", 2, &[5]);
        other.blocklets[0].max_values.pop();
        assert!(BlockIndex::build(&[other]).is_err());

        let mut other = footer("part-1", 2, &[5]);
        other.num_rows = 6;
        assert!(BlockIndex::build(&[other]).is_err());
    }

    #[test]
    fn test_empty_file() {
        let index = BlockIndex::build(&[footer("part-0", 2, &[])]).unwrap();
        assert_eq!(index.total_row_count(), 0);
        assert!(index.block_reference_tree().is_empty());
    }

    #[test_case(&[1, 1, -1], 1)]
    #[test_case(&[-1, -1, 1], 1)]
    #[test_case(&[1, -1, -1, 1, 1], 2)]
    #[test_case(&[-1; 5], 0)]
    #[test_case(&[1, 1, 1, -1, -1, -1, -1, 1], 1)]
    fn test_pin_unpin(ops: &[i32], expected: usize) {
        let index = helper_index();
        for op in ops {
            if *op > 0 {
                index.pin();
            } else {
                index.unpin();
            }
            assert_eq!(index.is_evictable(), index.access_count() == 0);
        }
        assert_eq!(index.access_count(), expected);
    }

    #[test]
    fn test_concurrent_pin() {
        let index = Arc::new(helper_index());
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        index.pin();
                    }
                });
            }
        });
        assert_eq!(index.access_count(), 8000);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1001 {
                        index.unpin();
                    }
                });
            }
        });
        assert_eq!(index.access_count(), 0);
        assert!(index.is_evictable());
    }

    #[test]
    fn test_pin_guard() {
        let index = Arc::new(helper_index());
        {
            let guard = index.pin_guard();
            let _other = index.pin_guard();
            assert_eq!(guard.access_count(), 2);
            assert!(!index.is_evictable());
        }
        assert_eq!(index.access_count(), 0);
    }
}
