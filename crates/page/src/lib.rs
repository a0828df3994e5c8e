//! On-disk page format for the B-tree index under verification, and an
//! untrusting parser for it.
//!
//! A page is a fixed 4096-byte unit: a fixed-width header, a slot (line
//! pointer) array growing up from the header, and tuple payloads packed
//! down from the page tail. Block 0 is reserved for the metadata page.
//!
//! `Page::parse` performs every baseline structural sanity check the
//! verifier relies on; all deeper access (slots, tuples, the high key) is
//! bound-checked on every call and never trusts stored offsets or lengths.

#[cfg(test)]
mod tests;

pub mod codec;
pub mod tuple;

pub use tuple::{DatumError, IndexTuple, KeyDatum};

use common::{CheckError, CheckResult, PageId};
use serde::{Deserialize, Serialize};

/// Fixed page allocation in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Encoded size of `PageHeader` under the legacy fixed-int codec.
pub const HEADER_BYTES: usize = 34;

/// Encoded size of `Slot` under the legacy fixed-int codec.
pub const SLOT_BYTES: usize = 6;

/// Smallest possible encoded tuple (no heap ref, no child, empty key).
const MIN_TUPLE_BYTES: usize = 10;

/// Upper bound on the number of slots a page can address, assuming every
/// tuple is minimal. Anything above this is corruption, not a big page.
pub const MAX_SLOTS_PER_PAGE: u16 =
    ((PAGE_SIZE - HEADER_BYTES) / (SLOT_BYTES + MIN_TUPLE_BYTES)) as u16;

/// Ceiling on one tuple's encoded size.
pub const MAX_TUPLE_BYTES: usize = PAGE_SIZE / 8;

/// Space reserved so that suffix truncation can always append a heap
/// tiebreak reference to a boundary tuple during a future split. Boundary
/// tuples without a heap reference must fit under
/// `MAX_TUPLE_BYTES - TIEBREAK_RESERVE`.
pub const TIEBREAK_RESERVE: usize = 16;

/// Block number reserved for the metadata page.
pub const META_BLOCK: PageId = PageId(0);

pub const META_MAGIC: u32 = 0xB7EE_C4EC;
pub const META_VERSION: u32 = 2;
pub const META_MIN_VERSION: u32 = 1;

/// Page flag bits.
pub mod flags {
    /// Leaf page (level 0).
    pub const LEAF: u16 = 0x01;
    /// True root of the tree.
    pub const ROOT: u16 = 0x02;
    /// Fully deleted; level and contents are meaningless.
    pub const DELETED: u16 = 0x04;
    /// First phase of deletion done, unlink pending.
    pub const HALF_DEAD: u16 = 0x08;
    /// Metadata page; legal only at block 0.
    pub const META: u16 = 0x10;
    /// Right half of a split whose parent insertion never completed.
    pub const INCOMPLETE_SPLIT: u16 = 0x20;
    /// Page holds reclaimable dead entries; never legal on internal pages.
    pub const HAS_GARBAGE: u16 = 0x40;

    pub const KNOWN: u16 = LEAF | ROOT | DELETED | HALF_DEAD | META | INCOMPLETE_SPLIT | HAS_GARBAGE;
}

/// Fixed-width header at the front of every page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHeader {
    /// Log position of the last write that touched this page; carried into
    /// corruption reports so a finding can be matched against recovery.
    pub lsn: u64,
    pub flags: u16,
    /// Tree level; 0 for leaves, meaningless once `DELETED` is set.
    pub level: u32,
    pub prev: PageId,
    pub next: PageId,
    pub num_slots: u16,
    /// Lowest byte used by tuple payloads; free space ends here.
    pub free_offset: u16,
}

/// Slot (line pointer) states.
pub mod slot_state {
    pub const UNUSED: u16 = 0;
    pub const NORMAL: u16 = 1;
    pub const REDIRECT: u16 = 2;
    /// Entry is known dead but storage is still present. Legal on leaves.
    pub const DEAD: u16 = 3;
}

/// One line pointer: where a tuple's payload lives within the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub state: u16,
    pub offset: u16,
    pub len: u16,
}

/// Metadata payload stored after the header on block 0.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaPage {
    pub magic: u32,
    pub version: u32,
    /// Declared key arity of the index: every leaf entry carries exactly
    /// this many key components.
    pub key_arity: u16,
    /// True root, or `PageId::NONE` for a completely empty index.
    pub root: PageId,
    pub root_level: u32,
    /// Entry point scans actually use; may sit below a "skinny" true root.
    pub fast_root: PageId,
    pub fast_level: u32,
}

/// Why a page is skipped during traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnorableReason {
    Deleted,
    HalfDead,
}

/// Role of a page, decided once at parse time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageKind {
    Meta,
    Leaf,
    Internal,
}

/// Immutable, process-private copy of one on-disk page.
#[derive(Clone, Debug)]
pub struct Page {
    block: PageId,
    header: PageHeader,
    kind: PageKind,
    bytes: Vec<u8>,
}

impl Page {
    /// Parse a raw page copy, performing the baseline structural sanity
    /// checks that make all later accesses meaningful:
    ///
    /// - header decodes and the slot array fits ahead of tuple storage;
    /// - slot count within the page's addressable capacity;
    /// - the meta flag appears at block 0 and only there, with a plausible
    ///   magic and version;
    /// - a non-deleted leaf is level 0, a non-deleted internal page is not;
    /// - a non-deleted internal page has at least its negative-infinity
    ///   entry, and is neither half-dead nor flagged with garbage;
    /// - a non-rightmost, non-deleted leaf carries a high key.
    pub fn parse(block: PageId, bytes: Vec<u8>) -> CheckResult<Page> {
        if bytes.len() != PAGE_SIZE {
            return Err(CheckError::Format {
                block,
                detail: format!("page is {} bytes, expected {PAGE_SIZE}", bytes.len()),
            });
        }
        let header = codec::decode_header(block, &bytes)?;
        let fail = |detail: String| CheckError::Format { block, detail };

        if header.flags & !flags::KNOWN != 0 {
            return Err(fail(format!("unknown flag bits {:#06x}", header.flags)));
        }
        if header.num_slots > MAX_SLOTS_PER_PAGE {
            return Err(fail(format!(
                "{} slots exceeds addressable capacity {MAX_SLOTS_PER_PAGE}",
                header.num_slots
            )));
        }
        let slots_end = HEADER_BYTES + header.num_slots as usize * SLOT_BYTES;
        let free_offset = header.free_offset as usize;
        if free_offset > PAGE_SIZE || free_offset < slots_end {
            return Err(fail(format!(
                "slot array (ends {slots_end}) overlaps tuple storage (starts {free_offset})"
            )));
        }

        let is_meta = header.flags & flags::META != 0;
        if is_meta && block != META_BLOCK {
            return Err(fail("meta page found away from block 0".into()));
        }
        if block == META_BLOCK {
            if !is_meta {
                return Err(fail("block 0 is not flagged as the meta page".into()));
            }
            let meta = codec::decode_meta(block, &bytes)?;
            if meta.magic != META_MAGIC {
                return Err(fail(format!("bad meta magic {:#010x}", meta.magic)));
            }
            if meta.version < META_MIN_VERSION || meta.version > META_VERSION {
                return Err(fail(format!(
                    "meta version {} outside supported range {META_MIN_VERSION}..={META_VERSION}",
                    meta.version
                )));
            }
            return Ok(Page {
                block,
                header,
                kind: PageKind::Meta,
                bytes,
            });
        }

        let is_leaf = header.flags & flags::LEAF != 0;
        let deleted = header.flags & flags::DELETED != 0;
        let kind = if is_leaf { PageKind::Leaf } else { PageKind::Internal };
        let rightmost = header.next.is_none();

        // Deleted pages have no sane level or contents; everything below
        // only holds for live and half-dead pages.
        if !deleted {
            if is_leaf && header.level != 0 {
                return Err(fail(format!("leaf page has level {}", header.level)));
            }
            if !is_leaf && header.level == 0 {
                return Err(fail("internal page has level 0".into()));
            }
            if !is_leaf {
                // High key (when non-rightmost) plus the negative-infinity
                // entry at minimum.
                let min_slots = if rightmost { 1 } else { 2 };
                if header.num_slots < min_slots {
                    return Err(fail(format!(
                        "internal page has {} slots, needs at least {min_slots}",
                        header.num_slots
                    )));
                }
            } else if !rightmost && header.num_slots < 1 {
                return Err(fail("non-rightmost leaf lacks a high key".into()));
            }
        }

        if !is_leaf {
            if header.flags & flags::HALF_DEAD != 0 {
                return Err(fail("internal page is half-dead".into()));
            }
            if header.flags & flags::HAS_GARBAGE != 0 {
                return Err(fail("internal page has garbage entries".into()));
            }
        }

        Ok(Page {
            block,
            header,
            kind,
            bytes,
        })
    }

    pub fn block(&self) -> PageId {
        self.block
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn lsn(&self) -> u64 {
        self.header.lsn
    }

    pub fn level(&self) -> u32 {
        self.header.level
    }

    pub fn prev(&self) -> PageId {
        self.header.prev
    }

    pub fn next(&self) -> PageId {
        self.header.next
    }

    pub fn num_slots(&self) -> u16 {
        self.header.num_slots
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == PageKind::Leaf
    }

    pub fn is_internal(&self) -> bool {
        self.kind == PageKind::Internal
    }

    pub fn is_rightmost(&self) -> bool {
        self.header.next.is_none()
    }

    pub fn is_root_flagged(&self) -> bool {
        self.header.flags & flags::ROOT != 0
    }

    pub fn is_incomplete_split(&self) -> bool {
        self.header.flags & flags::INCOMPLETE_SPLIT != 0
    }

    pub fn is_half_dead(&self) -> bool {
        self.header.flags & flags::HALF_DEAD != 0
    }

    pub fn is_deleted(&self) -> bool {
        self.header.flags & flags::DELETED != 0
    }

    pub fn ignorable_reason(&self) -> Option<IgnorableReason> {
        if self.is_deleted() {
            Some(IgnorableReason::Deleted)
        } else if self.is_half_dead() {
            Some(IgnorableReason::HalfDead)
        } else {
            None
        }
    }

    /// Deleted or half-dead: skipped during traversal, possibly still
    /// reachable through stale sibling links.
    pub fn is_ignorable(&self) -> bool {
        self.ignorable_reason().is_some()
    }

    /// Slot index of the high key, when this page has one.
    pub fn high_key_slot(&self) -> Option<u16> {
        if self.is_rightmost() || self.num_slots() == 0 {
            None
        } else {
            Some(0)
        }
    }

    /// First slot holding a data entry (past the high key, if any).
    pub fn first_data_slot(&self) -> u16 {
        if self.is_rightmost() { 0 } else { 1 }
    }

    /// Highest usable slot index, or `None` for a page with no slots.
    pub fn max_slot(&self) -> Option<u16> {
        self.num_slots().checked_sub(1)
    }

    /// Number of data entries (excluding the high key).
    pub fn num_data_entries(&self) -> u16 {
        self.num_slots().saturating_sub(self.first_data_slot())
    }

    /// Is `slot` the negative-infinity entry? Only internal pages have one,
    /// always as their first data entry, truncated to zero key components.
    pub fn is_negative_infinity_slot(&self, slot: u16) -> bool {
        self.is_internal() && slot == self.first_data_slot()
    }

    /// Fetch and validate one line pointer. Stored offsets and lengths are
    /// never trusted: the payload must lie fully between the slot array and
    /// the page end, and the slot must be a state the index actually
    /// writes.
    pub fn slot_checked(&self, slot: u16) -> CheckResult<Slot> {
        let fail = |detail: String| CheckError::Format {
            block: self.block,
            detail,
        };
        if slot >= self.num_slots() {
            return Err(fail(format!(
                "slot {slot} out of range ({} slots)",
                self.num_slots()
            )));
        }
        let decoded = codec::decode_slot(self.block, &self.bytes, slot)?;
        if decoded.state != slot_state::NORMAL && decoded.state != slot_state::DEAD {
            return Err(fail(format!(
                "slot {slot} has invalid state {}",
                decoded.state
            )));
        }
        if decoded.len == 0 {
            return Err(fail(format!("slot {slot} has no storage")));
        }
        let slots_end = HEADER_BYTES + self.num_slots() as usize * SLOT_BYTES;
        let start = decoded.offset as usize;
        let end = start + decoded.len as usize;
        if start < slots_end || end > PAGE_SIZE {
            return Err(fail(format!(
                "slot {slot} payload {start}..{end} escapes tuple storage"
            )));
        }
        Ok(decoded)
    }

    /// Decode the tuple at `slot` along with the number of payload bytes
    /// its encoding consumed (for the torn-write check).
    pub fn tuple_with_len(&self, slot: u16) -> CheckResult<(IndexTuple, usize)> {
        let sl = self.slot_checked(slot)?;
        let start = sl.offset as usize;
        let payload = &self.bytes[start..start + sl.len as usize];
        codec::decode_tuple(self.block, payload)
    }

    pub fn tuple(&self, slot: u16) -> CheckResult<IndexTuple> {
        Ok(self.tuple_with_len(slot)?.0)
    }

    pub fn high_key(&self) -> CheckResult<Option<IndexTuple>> {
        match self.high_key_slot() {
            Some(slot) => Ok(Some(self.tuple(slot)?)),
            None => Ok(None),
        }
    }

    /// Meta payload; only valid for the meta page.
    pub fn meta(&self) -> CheckResult<MetaPage> {
        debug_assert_eq!(self.kind, PageKind::Meta);
        codec::decode_meta(self.block, &self.bytes)
    }
}
