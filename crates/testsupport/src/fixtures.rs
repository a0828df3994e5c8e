//! Assembly of well-formed trees for verification tests.
//!
//! [`TreeBuilder`] turns a sorted row set into a complete multi-level
//! index image: leaves chunked by fanout, boundary tuples carried up level
//! by level, sibling links wired, metadata at block 0. The shapes it
//! produces are exactly what the verifier expects of a healthy tree, so
//! tests plant damage by patching the finished image.

use common::PageId;
use page::codec;
use page::tuple::{rle_compress, IndexTuple, KeyDatum};
use page::{flags, slot_state, MetaPage, PageHeader, Slot, HEADER_BYTES, META_MAGIC, META_VERSION, PAGE_SIZE, SLOT_BYTES};
use verify::HeapRow;

use crate::sources::MemIndex;

/// Builds index images from rows. Rows must already be in index order
/// (see [`crate::sources::sort_rows`]) and unique.
#[derive(Clone, Debug)]
pub struct TreeBuilder {
    arity: u16,
    fanout: usize,
    vary_encodings: bool,
}

struct Node {
    block: PageId,
    /// Data entries in slot order, negative-infinity entry included for
    /// internal nodes.
    entries: Vec<IndexTuple>,
    /// Boundary copy of the node's last entry; `None` on the level's last
    /// node. Becomes the parent pivot of the node's right sibling.
    high_key: Option<IndexTuple>,
}

impl TreeBuilder {
    pub fn new(arity: u16) -> Self {
        Self {
            arity,
            fanout: 4,
            vary_encodings: false,
        }
    }

    /// Maximum data entries per page; small values force tall trees.
    pub fn fanout(mut self, fanout: usize) -> Self {
        assert!(fanout >= 1);
        self.fanout = fanout;
        self
    }

    /// Store leaf components under a mix of encodings so fingerprinting
    /// has to canonicalize.
    pub fn vary_encodings(mut self, vary: bool) -> Self {
        self.vary_encodings = vary;
        self
    }

    pub fn build(&self, rows: &[HeapRow]) -> MemIndex {
        let mut pages: Vec<Vec<u8>> = vec![vec![0; PAGE_SIZE]]; // block 0 = meta

        // Leaf level.
        let mut nodes: Vec<Node> = Vec::new();
        let chunks: Vec<&[HeapRow]> = if rows.is_empty() {
            vec![&[]]
        } else {
            rows.chunks(self.fanout).collect()
        };
        for (i, chunk) in chunks.iter().enumerate() {
            let last = i + 1 == chunks.len();
            let entries: Vec<IndexTuple> = chunk
                .iter()
                .enumerate()
                .map(|(j, row)| self.leaf_entry(row, j))
                .collect();
            let high_key = (!last).then(|| boundary_copy(chunk.last().expect("non-empty chunk")));
            nodes.push(Node {
                block: alloc(&mut pages),
                entries,
                high_key,
            });
        }
        let mut level = 0u32;
        self.write_level(&mut pages, &nodes, level, nodes.len() == 1);

        // Carry boundaries up until one node holds the whole level below.
        while nodes.len() > 1 {
            let mut parents: Vec<Node> = Vec::new();
            let groups: Vec<&[Node]> = nodes.chunks(self.fanout).collect();
            for group in &groups {
                let mut entries = Vec::with_capacity(group.len());
                for (j, child) in group.iter().enumerate() {
                    if j == 0 {
                        entries.push(IndexTuple {
                            heap: None,
                            child: Some(child.block),
                            key: vec![],
                        });
                    } else {
                        // The child's lower bound is its left sibling's
                        // high key.
                        let sep = group[j - 1]
                            .high_key
                            .clone()
                            .expect("non-last child has a high key");
                        entries.push(IndexTuple {
                            heap: sep.heap,
                            child: Some(child.block),
                            key: sep.key,
                        });
                    }
                }
                let high_key = group
                    .last()
                    .expect("non-empty group")
                    .high_key
                    .clone();
                parents.push(Node {
                    block: alloc(&mut pages),
                    entries,
                    high_key,
                });
            }
            nodes = parents;
            level += 1;
            self.write_level(&mut pages, &nodes, level, nodes.len() == 1);
        }

        let root = nodes[0].block;
        write_meta(&mut pages[0], self.arity, root, level);
        MemIndex::new(pages)
    }

    fn leaf_entry(&self, row: &HeapRow, position: usize) -> IndexTuple {
        let key = row
            .key
            .iter()
            .map(|value| {
                if !self.vary_encodings {
                    return KeyDatum::Inline(value.clone());
                }
                match position % 3 {
                    1 if value.len() < 256 => KeyDatum::Short(value.clone()),
                    2 => KeyDatum::Compressed {
                        raw_len: value.len() as u32,
                        data: rle_compress(value),
                    },
                    _ => KeyDatum::Inline(value.clone()),
                }
            })
            .collect();
        IndexTuple {
            heap: Some(row.heap),
            child: None,
            key,
        }
    }

    fn write_level(&self, pages: &mut [Vec<u8>], nodes: &[Node], level: u32, is_root: bool) {
        for (i, node) in nodes.iter().enumerate() {
            let prev = if i == 0 { PageId::NONE } else { nodes[i - 1].block };
            let next = if i + 1 == nodes.len() {
                PageId::NONE
            } else {
                nodes[i + 1].block
            };
            let mut page_flags = if level == 0 { flags::LEAF } else { 0 };
            if is_root {
                page_flags |= flags::ROOT;
            }
            pages[node.block.0 as usize] =
                assemble_page(node, page_flags, level, prev, next);
        }
    }
}

/// A boundary (pivot) tuple standing in for `row`: full components plus
/// the heap tiebreak, so it compares above everything left of it even
/// among duplicates.
fn boundary_copy(row: &HeapRow) -> IndexTuple {
    IndexTuple {
        heap: Some(row.heap),
        child: None,
        key: row.key.iter().cloned().map(KeyDatum::Inline).collect(),
    }
}

fn alloc(pages: &mut Vec<Vec<u8>>) -> PageId {
    let block = PageId(pages.len() as u64);
    pages.push(vec![0; PAGE_SIZE]);
    block
}

fn assemble_page(
    node: &Node,
    page_flags: u16,
    level: u32,
    prev: PageId,
    next: PageId,
) -> Vec<u8> {
    raw_page(
        0x1000 + node.block.0,
        page_flags,
        level,
        prev,
        next,
        node.high_key.as_ref(),
        &node.entries,
    )
}

/// Assemble one page byte-for-byte from its parts. Tests use this for
/// shapes the builder never produces, half-dead stragglers included.
pub fn raw_page(
    lsn: u64,
    page_flags: u16,
    level: u32,
    prev: PageId,
    next: PageId,
    high_key: Option<&IndexTuple>,
    entries: &[IndexTuple],
) -> Vec<u8> {
    let mut bytes = vec![0u8; PAGE_SIZE];
    let mut free_offset = PAGE_SIZE;
    let mut num_slots = 0u16;

    let mut push = |bytes: &mut Vec<u8>, tuple: &IndexTuple| {
        let payload = codec::encode_tuple(tuple);
        let start = free_offset
            .checked_sub(payload.len())
            .expect("page overflow: lower the fanout");
        let slots_end = HEADER_BYTES + (num_slots as usize + 1) * SLOT_BYTES;
        assert!(start >= slots_end, "page overflow: lower the fanout");
        bytes[start..free_offset].copy_from_slice(&payload);
        codec::encode_slot(
            &Slot {
                state: slot_state::NORMAL,
                offset: start as u16,
                len: payload.len() as u16,
            },
            bytes,
            num_slots,
        );
        free_offset = start;
        num_slots += 1;
    };

    if let Some(high_key) = high_key {
        push(&mut bytes, high_key);
    }
    for tuple in entries {
        push(&mut bytes, tuple);
    }

    let header = PageHeader {
        lsn,
        flags: page_flags,
        level,
        prev,
        next,
        num_slots,
        free_offset: free_offset as u16,
    };
    codec::encode_header(&header, &mut bytes);
    bytes
}

fn write_meta(bytes: &mut Vec<u8>, arity: u16, root: PageId, root_level: u32) {
    let header = PageHeader {
        lsn: 0x1000,
        flags: flags::META,
        level: 0,
        prev: PageId::NONE,
        next: PageId::NONE,
        num_slots: 0,
        free_offset: PAGE_SIZE as u16,
    };
    codec::encode_header(&header, bytes);
    codec::encode_meta(
        &MetaPage {
            magic: META_MAGIC,
            version: META_VERSION,
            key_arity: arity,
            root,
            root_level,
            fast_root: root,
            fast_level: root_level,
        },
        bytes,
    );
}
