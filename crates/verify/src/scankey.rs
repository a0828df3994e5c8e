//! Search keys built from index tuples, and the three-way comparison
//! against page entries that every ordering check is defined over.

use common::{CheckError, CheckResult, CorruptionKind, CorruptionReport, PageId, RecordId};
use page::tuple::{DatumError, IndexTuple, KeyDatum};
use page::Page;
use std::borrow::Cow;
use std::cmp::Ordering;

use crate::source::{HeapRow, ValueOracle};

/// An insertion-style search key: the logical bytes of each key component
/// plus the heap tiebreak, when present.
///
/// `pivot_search` changes how a comparison that exhausts the key's
/// components resolves against an entry that still has a heap tiebreak:
/// ordinary searches treat that as equality, while invariant checks against
/// boundary tuples need "less than", because the boundary's truncated
/// suffix stands for the lowest possible value.
#[derive(Clone, Debug)]
pub struct ScanKey {
    pub values: Vec<Vec<u8>>,
    pub heap: Option<RecordId>,
    pub pivot_search: bool,
}

/// Resolve a stored datum to its logical bytes, turning resolution
/// failures into run errors blamed on `block`.
pub(crate) fn datum_bytes(block: PageId, datum: &KeyDatum) -> CheckResult<Cow<'_, [u8]>> {
    datum.logical_bytes().map_err(|e| match e {
        DatumError::External { pointer } => CheckError::corruption(CorruptionReport {
            kind: CorruptionKind::ExternalDatum,
            block,
            level: None,
            offsets: vec![],
            detail: format!("overflow pointer {pointer}"),
        }),
        other => CheckError::Format {
            block,
            detail: other.to_string(),
        },
    })
}

impl ScanKey {
    /// Build a key from a tuple found on `block`, carrying however many
    /// components the tuple actually stores.
    pub fn from_tuple(block: PageId, tuple: &IndexTuple, pivot_search: bool) -> CheckResult<Self> {
        let mut values = Vec::with_capacity(tuple.key.len());
        for datum in &tuple.key {
            values.push(datum_bytes(block, datum)?.into_owned());
        }
        Ok(Self {
            values,
            heap: tuple.heap,
            pivot_search,
        })
    }

    /// Build the key a table row would have been inserted under.
    pub fn from_heap_row(row: &HeapRow) -> Self {
        Self {
            values: row.key.clone(),
            heap: Some(row.heap),
            pivot_search: false,
        }
    }

    pub fn arity(&self) -> u16 {
        self.values.len() as u16
    }

    /// Three-way comparison against the entry at `offset` on `page`.
    ///
    /// An internal page's negative-infinity entry has no comparable key;
    /// everything sorts after it. Otherwise components are compared
    /// pairwise through the oracle over the shared prefix; a key with more
    /// components than the entry sorts after it (the entry's truncated
    /// suffix is the lowest possible value), and ties fall through to the
    /// heap tiebreak.
    pub fn compare(
        &self,
        oracle: &dyn ValueOracle,
        page: &Page,
        offset: u16,
    ) -> CheckResult<Ordering> {
        if page.is_negative_infinity_slot(offset) {
            return Ok(Ordering::Greater);
        }
        let tuple = page.tuple(offset)?;
        let shared = self.values.len().min(tuple.key.len());
        for (value, datum) in self.values.iter().zip(tuple.key.iter()).take(shared) {
            let entry = datum_bytes(page.block(), datum)?;
            let cmp = oracle.compare_values(value, &entry);
            if cmp != Ordering::Equal {
                return Ok(cmp);
            }
        }
        if self.values.len() > tuple.key.len() {
            return Ok(Ordering::Greater);
        }
        match (self.heap, tuple.heap) {
            (None, _) => {
                // The key ran out of components while the entry may still
                // have a tiebreak. A pivot-search key sits left of every
                // real entry sharing its prefix.
                if self.pivot_search {
                    Ok(Ordering::Less)
                } else {
                    Ok(Ordering::Equal)
                }
            }
            (Some(_), None) => Ok(Ordering::Greater),
            (Some(a), Some(b)) => Ok(a.cmp(&b)),
        }
    }
}
