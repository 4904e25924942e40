// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::path::Path;
use std::sync::Arc;

use crate::layout::BlockletLayout;

/// One blocklet of the segment, with the statistics used for pruning.
#[derive(Clone, Debug, PartialEq)]
pub struct DataRefNode {
    pub file_path: Arc<str>,
    /// Ordinal of the blocklet within its data file
    pub blocklet_id: u32,
    /// First row of the blocklet, relative to its data file
    pub first_row_in_block: u64,
    /// First row of the blocklet, relative to the segment
    pub first_row_in_segment: u64,
    pub layout: Arc<BlockletLayout>,
    /// Min value of each dimension column
    pub min_values: Vec<Vec<u8>>,
    /// Max value of each dimension column
    pub max_values: Vec<Vec<u8>>,
}

impl DataRefNode {
    pub fn row_count(&self) -> u64 {
        self.layout.row_count as u64
    }

    /// Name of the block the blocklet belongs to: the stem of its data file. `None` for a
    /// footer that was not read from a file.
    pub fn block_name(&self) -> Option<&str> {
        Path::new(&*self.file_path)
            .file_stem()
            .and_then(|stem| stem.to_str())
    }

    /// Whether values of `column` in `lo..=hi` may appear in this blocklet.
    pub fn may_contain(&self, column: usize, lo: &[u8], hi: &[u8]) -> bool {
        match (self.min_values.get(column), self.max_values.get(column)) {
            (Some(min), Some(max)) => min.as_slice() <= hi && lo <= max.as_slice(),
            // no statistics, cannot prune
            _ => true,
        }
    }
}

/// Blocklets of a segment ordered by their first row. Read-only once built.
#[derive(Clone, Debug, Default)]
pub struct BlockletTree {
    nodes: Arc<[DataRefNode]>,
}

impl BlockletTree {
    pub(super) fn new(nodes: Vec<DataRefNode>) -> Self {
        debug_assert!(nodes
            .windows(2)
            .all(|w| w[0].first_row_in_segment + w[0].row_count() == w[1].first_row_in_segment));
        Self {
            nodes: nodes.into(),
        }
    }

    pub fn nodes(&self) -> &[DataRefNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: usize) -> Option<&DataRefNode> {
        self.nodes.get(id)
    }

    /// Find the blocklet holding row `row` of the segment.
    pub fn node_of_row(&self, row: u64) -> Option<&DataRefNode> {
        // A row x is in blocklet `i` if first_row[i] <= x < first_row[i + 1], so the blocklet
        // is the one before the partition point of `first_row <= x`. Empty blocklets share
        // their first row with the next one and are skipped by the row count check.
        let pp = self
            .nodes
            .partition_point(|node| node.first_row_in_segment <= row);
        let node = self.nodes.get(pp.checked_sub(1)?)?;
        (row < node.first_row_in_segment + node.row_count()).then_some(node)
    }

    /// Blocklets whose `[min, max]` range of dimension `column` intersects `[lo, hi]`.
    pub fn prune<'a>(
        &'a self,
        column: usize,
        lo: &'a [u8],
        hi: &'a [u8],
    ) -> impl Iterator<Item = &'a DataRefNode> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.may_contain(column, lo, hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ColumnarFormatVersion;

    fn node(first_row: u64, row_count: u32, min: &str, max: &str) -> DataRefNode {
        DataRefNode {
            file_path: "part-0.seg".into(),
            blocklet_id: 0,
            first_row_in_block: first_row,
            first_row_in_segment: first_row,
            layout: Arc::new(BlockletLayout {
                version: ColumnarFormatVersion::V2,
                row_count,
                dimension_chunks: vec![],
                measure_chunks: vec![],
            }),
            min_values: vec![min.as_bytes().to_vec()],
            max_values: vec![max.as_bytes().to_vec()],
        }
    }

    fn tree() -> BlockletTree {
        BlockletTree::new(vec![
            node(0, 233, "aa", "cz"),
            node(233, 2100, "ca", "ff"),
            node(2333, 0, "", ""),
            node(2333, 21000, "xa", "zz"),
        ])
    }

    #[test]
    fn test_node_of_row() {
        let tree = tree();
        assert_eq!(tree.node_of_row(0).unwrap().first_row_in_segment, 0);
        assert_eq!(tree.node_of_row(232).unwrap().first_row_in_segment, 0);
        assert_eq!(tree.node_of_row(233).unwrap().first_row_in_segment, 233);
        assert_eq!(tree.node_of_row(2333).unwrap().row_count(), 21000);
        assert!(tree.node_of_row(23333).is_none());
        assert!(BlockletTree::default().node_of_row(0).is_none());
    }

    #[test]
    fn test_prune() {
        let tree = tree();
        let pruned = |lo: &str, hi: &str| {
            tree.prune(0, lo.as_bytes(), hi.as_bytes())
                .map(|node| node.first_row_in_segment)
                .collect::<Vec<_>>()
        };
        assert_eq!(pruned("cb", "cc"), vec![0, 233]);
        assert_eq!(pruned("gg", "ww"), Vec::<u64>::new());
        assert_eq!(pruned("zz", "zz"), vec![2333]);
        // no statistics for column 1
        assert_eq!(tree.prune(1, b"a", b"b").count(), 4);
    }

    #[test]
    fn test_block_name() {
        let mut node = node(0, 1, "a", "b");
        assert_eq!(node.block_name(), Some("part-0"));
        node.file_path = "/data/t1/part-1.seg".into();
        assert_eq!(node.block_name(), Some("part-1"));
        node.file_path = "".into();
        assert_eq!(node.block_name(), None);
    }
}
