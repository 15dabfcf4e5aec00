//! Directory B-tree nodes and their traversal
//!
//! Node layout, relative to the node offset:
//!
//! ```text
//! 0x000  8 bytes reserved
//! 0x008  62 x { block_size: u32, child_offset: u32 }   (block_size == 0 ends the list)
//! 0x200  entry_count: u32                               (8 + 63 * 8)
//! 0x204  entry_count x 32-byte entry records
//! ```

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::bytes::ByteReader;
use crate::entry::{ENTRY_RECORD_LEN, EntryRecord};
use crate::error::{DatError, Result};
use crate::source::BlockSource;

/// Offset of the first child slot within a node
pub const CHILD_SLOTS_OFFSET: usize = 8;
/// Size of one child slot
pub const CHILD_SLOT_LEN: usize = 8;
/// Maximum number of child slots in a node
pub const MAX_CHILD_SLOTS: usize = 62;
/// Offset of the entry count within a node
pub const ENTRY_COUNT_OFFSET: usize = CHILD_SLOTS_OFFSET + 63 * CHILD_SLOT_LEN;
/// Offset of the first entry record within a node
pub const ENTRIES_OFFSET: usize = ENTRY_COUNT_OFFSET + 4;
/// A node holds one entry fewer than it has child slots
pub const MAX_NODE_ENTRIES: u32 = (MAX_CHILD_SLOTS - 1) as u32;

/// Pointer from a node to one of its children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSlot {
    /// Block size of the child node
    pub block_size: u32,
    /// Absolute offset of the child node
    pub offset: u32,
}

/// One decoded directory node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    /// Absolute offset of this node
    pub offset: u64,
    /// Child pointers that survived truncation to `entries.len() + 1`
    pub children: Vec<ChildSlot>,
    /// Entry records stored in this node, including zero-sized ones
    pub entries: Vec<EntryRecord>,
}

impl DirectoryNode {
    /// Read the node at `offset` from `source`
    pub fn read<S: BlockSource + ?Sized>(source: &S, offset: u64) -> Result<Self> {
        let header = source.read_at(offset, ENTRIES_OFFSET)?;
        let header = ByteReader::at(&header, offset);

        let mut children = Vec::new();
        for slot in 0..MAX_CHILD_SLOTS {
            let at = CHILD_SLOTS_OFFSET + slot * CHILD_SLOT_LEN;
            let block_size = header.u32_at(at)?;
            if block_size == 0 {
                break;
            }
            children.push(ChildSlot {
                block_size,
                offset: header.u32_at(at + 4)?,
            });
        }

        let entry_count = header.u32_at(ENTRY_COUNT_OFFSET)?;
        if entry_count > MAX_NODE_ENTRIES {
            return Err(DatError::CorruptDirectory {
                offset,
                reason: format!("entry count {entry_count} exceeds {MAX_NODE_ENTRIES}"),
            });
        }

        // One child pointer per entry plus one trailing pointer.
        children.truncate(entry_count as usize + 1);

        let records_len = entry_count as usize * ENTRY_RECORD_LEN;
        let records_offset = offset + ENTRIES_OFFSET as u64;
        let records = source.read_at(records_offset, records_len)?;
        let records = ByteReader::at(&records, records_offset);

        let entries = (0..entry_count as usize)
            .map(|i| EntryRecord::parse(&records, i * ENTRY_RECORD_LEN))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            offset,
            children,
            entries,
        })
    }
}

/// Everything collected from a directory traversal
#[derive(Debug, Clone, Default)]
pub struct DirectoryTree {
    /// Non-empty entries in visit order
    pub entries: Vec<EntryRecord>,
    /// Number of nodes decoded
    pub nodes_visited: usize,
    /// Child pointers ignored because they were out of range, repeated or unreadable
    pub children_skipped: usize,
}

/// Walk the directory tree rooted at `root` without recursion.
///
/// The root node must decode; child nodes that point outside the source, at
/// an offset already visited, or that fail to decode are skipped with a
/// warning so partially damaged archives still yield their metadata.
pub fn read_tree<S: BlockSource + ?Sized>(source: &S, root: u64) -> Result<DirectoryTree> {
    let mut tree = DirectoryTree::default();
    let mut visited = HashSet::from([root]);
    let mut pending = vec![root];

    while let Some(offset) = pending.pop() {
        let node = match DirectoryNode::read(source, offset) {
            Ok(node) => node,
            Err(e) if offset == root => return Err(e),
            Err(e) => {
                warn!("skipping unreadable directory node at 0x{offset:x}: {e}");
                tree.children_skipped += 1;
                continue;
            }
        };

        debug!(
            "directory node 0x{:x}: {} entries, {} children",
            offset,
            node.entries.len(),
            node.children.len()
        );
        tree.nodes_visited += 1;
        tree.entries
            .extend(node.entries.iter().filter(|entry| entry.size > 0));

        // Reverse so children are visited in slot order.
        for child in node.children.iter().rev() {
            let child_offset = u64::from(child.offset);
            if child_offset >= source.len() {
                warn!(
                    "directory node 0x{offset:x} points outside the archive (0x{child_offset:x})"
                );
                tree.children_skipped += 1;
            } else if !visited.insert(child_offset) {
                warn!(
                    "directory node 0x{offset:x} points at already visited node 0x{child_offset:x}"
                );
                tree.children_skipped += 1;
            } else {
                pending.push(child_offset);
            }
        }
    }

    Ok(tree)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::fixture::{ArchiveBuilder, FixtureEntry};

    #[test]
    fn layout_constants_match_format() {
        assert_eq!(ENTRY_COUNT_OFFSET, 0x200);
        assert_eq!(ENTRIES_OFFSET, 0x204);
        assert_eq!(MAX_NODE_ENTRIES, 61);
    }

    #[test]
    fn reads_single_node() {
        let data = ArchiveBuilder::new()
            .node(0x200, &[], &[FixtureEntry::plain(0xCAFE_BABE, 0x800, 16, 7)])
            .build();

        let node = DirectoryNode::read(&data, 0x200).unwrap();
        assert!(node.children.is_empty());
        assert_eq!(node.entries.len(), 1);
        assert_eq!(node.entries[0].id, 0xCAFE_BABE);
    }

    #[test]
    fn truncates_children_to_entry_count_plus_one() {
        let data = ArchiveBuilder::with_len(0x4000)
            .node(
                0x200,
                &[0x1000, 0x1400, 0x1800, 0x1C00],
                &[FixtureEntry::plain(1, 0x3000, 4, 1)],
            )
            .build();

        let node = DirectoryNode::read(&data, 0x200).unwrap();
        let offsets: Vec<u32> = node.children.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0x1000, 0x1400]);
    }

    #[test]
    fn rejects_oversized_entry_count() {
        let mut data = ArchiveBuilder::new().node(0x200, &[], &[]).build();
        let at = 0x200 + ENTRY_COUNT_OFFSET;
        data[at..at + 4].copy_from_slice(&62u32.to_le_bytes());

        assert!(matches!(
            DirectoryNode::read(&data, 0x200),
            Err(DatError::CorruptDirectory { offset: 0x200, .. })
        ));
    }

    #[test]
    fn walks_children_in_slot_order() {
        let data = ArchiveBuilder::with_len(0x4000)
            .node(
                0x200,
                &[0x1000, 0x1800],
                &[FixtureEntry::plain(20, 0x3000, 4, 1)],
            )
            .node(0x1000, &[], &[FixtureEntry::plain(10, 0x3000, 4, 1)])
            .node(0x1800, &[], &[FixtureEntry::plain(30, 0x3000, 4, 1)])
            .build();

        let tree = read_tree(&data, 0x200).unwrap();
        let ids: Vec<u32> = tree.entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![20, 10, 30]);
        assert_eq!(tree.nodes_visited, 3);
        assert_eq!(tree.children_skipped, 0);
    }

    #[test]
    fn cycles_terminate() {
        // Root points at a child that points back at the root and at itself.
        let data = ArchiveBuilder::with_len(0x4000)
            .node(0x200, &[0x1000], &[FixtureEntry::plain(1, 0x3000, 4, 1)])
            .node(
                0x1000,
                &[0x200, 0x1000],
                &[FixtureEntry::plain(2, 0x3000, 4, 1)],
            )
            .build();

        let tree = read_tree(&data, 0x200).unwrap();
        assert_eq!(tree.nodes_visited, 2);
        assert_eq!(tree.children_skipped, 2);
        assert_eq!(tree.entries.len(), 2);
    }

    #[test]
    fn out_of_range_children_are_skipped() {
        let data = ArchiveBuilder::new()
            .node(
                0x200,
                &[0xFFFF_0000],
                &[FixtureEntry::plain(1, 0x800, 4, 1)],
            )
            .build();

        let tree = read_tree(&data, 0x200).unwrap();
        assert_eq!(tree.entries.len(), 1);
        assert_eq!(tree.children_skipped, 1);
    }

    #[test]
    fn unreadable_child_does_not_fail_the_walk() {
        // Child node starts too close to the end to hold a header.
        let data = ArchiveBuilder::new()
            .node(0x200, &[0xF00], &[FixtureEntry::plain(1, 0x800, 4, 1)])
            .build();

        let tree = read_tree(&data, 0x200).unwrap();
        assert_eq!(tree.entries.len(), 1);
        assert_eq!(tree.children_skipped, 1);
    }

    #[test]
    fn unreadable_root_fails() {
        let data = vec![0u8; 0x300];
        assert!(matches!(
            read_tree(&data, 0x200),
            Err(DatError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn zero_sized_entries_are_dropped() {
        let data = ArchiveBuilder::new()
            .node(
                0x200,
                &[],
                &[
                    FixtureEntry::plain(1, 0x800, 0, 1),
                    FixtureEntry::plain(2, 0x800, 8, 1),
                ],
            )
            .build();

        let tree = read_tree(&data, 0x200).unwrap();
        let ids: Vec<u32> = tree.entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2]);
    }
}
