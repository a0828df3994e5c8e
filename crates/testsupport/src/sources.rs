//! In-memory implementations of the verifier's injected capabilities,
//! plus byte-level patching for corruption scenarios.

use common::{CheckResult, PageId, RecordId};
use page::codec;
use page::tuple::IndexTuple;
use page::{PageHeader, Slot, PAGE_SIZE};
use std::collections::VecDeque;
use std::io;

pub use verify::{HeapRow, HeapSource, PageSource};

/// A whole index held in memory, block number = vector index.
#[derive(Clone, Debug, Default)]
pub struct MemIndex {
    pages: Vec<Vec<u8>>,
}

impl MemIndex {
    pub fn new(pages: Vec<Vec<u8>>) -> Self {
        for page in &pages {
            assert_eq!(page.len(), PAGE_SIZE);
        }
        Self { pages }
    }

    pub fn num_pages(&self) -> u64 {
        self.pages.len() as u64
    }

    pub fn raw(&mut self, block: PageId) -> &mut Vec<u8> {
        &mut self.pages[block.0 as usize]
    }

    /// Append a hand-built page and return its block number.
    pub fn push_page(&mut self, bytes: Vec<u8>) -> PageId {
        assert_eq!(bytes.len(), PAGE_SIZE);
        let block = PageId(self.pages.len() as u64);
        self.pages.push(bytes);
        block
    }

    /// Rewrite a page's header in place.
    pub fn patch_header(&mut self, block: PageId, patch: impl FnOnce(&mut PageHeader)) {
        let bytes = self.raw(block);
        let mut header = codec::decode_header(block, bytes).expect("test page header decodes");
        patch(&mut header);
        codec::encode_header(&header, bytes);
    }

    /// Rewrite one line pointer in place.
    pub fn patch_slot(&mut self, block: PageId, slot: u16, patch: impl FnOnce(&mut Slot)) {
        let bytes = self.raw(block);
        let mut decoded = codec::decode_slot(block, bytes, slot).expect("test slot decodes");
        patch(&mut decoded);
        codec::encode_slot(&decoded, bytes, slot);
    }

    /// Overwrite the tuple a slot addresses. The replacement must encode
    /// to no more bytes than the slot currently holds.
    pub fn replace_tuple(&mut self, block: PageId, slot: u16, tuple: &IndexTuple) {
        let payload = codec::encode_tuple(tuple);
        let bytes = self.raw(block);
        let mut decoded = codec::decode_slot(block, bytes, slot).expect("test slot decodes");
        assert!(
            payload.len() <= decoded.len as usize,
            "replacement tuple must fit in the slot's storage"
        );
        let start = decoded.offset as usize;
        bytes[start..start + payload.len()].copy_from_slice(&payload);
        decoded.len = payload.len() as u16;
        codec::encode_slot(&decoded, bytes, slot);
    }
}

impl PageSource for MemIndex {
    fn fetch(&mut self, block: PageId) -> CheckResult<Vec<u8>> {
        self.pages
            .get(block.0 as usize)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("block {block} past end of index"),
                )
                .into()
            })
    }

    fn page_count_hint(&self) -> Option<u64> {
        Some(self.num_pages())
    }
}

/// A table iterator over a fixed set of rows.
#[derive(Clone, Debug, Default)]
pub struct MemHeap {
    rows: VecDeque<HeapRow>,
}

impl MemHeap {
    pub fn new(rows: impl IntoIterator<Item = HeapRow>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }
}

impl HeapSource for MemHeap {
    fn next_row(&mut self) -> CheckResult<Option<HeapRow>> {
        Ok(self.rows.pop_front())
    }
}

/// A single-component row with a synthetic location, the shape most tests
/// work in.
pub fn row(key: &[u8], heap_page: u64, heap_slot: u16) -> HeapRow {
    HeapRow {
        key: vec![key.to_vec()],
        heap: RecordId {
            page_id: PageId(heap_page),
            slot: heap_slot,
        },
    }
}

/// Sort rows the way the index orders them: components first, location as
/// the tiebreak.
pub fn sort_rows(rows: &mut [HeapRow]) {
    rows.sort_by(|a, b| a.key.cmp(&b.key).then(a.heap.cmp(&b.heap)));
}
