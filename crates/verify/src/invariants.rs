//! Ordering predicates the page checks are written in terms of.
//!
//! Each predicate is a three-way comparison plus a tie-break extension.
//! Boundary tuples deliberately truncate trailing key components, so two
//! tuples can compare equal while one of them actually bounds an open
//! range; the extensions resolve those ties the way the truncated suffix
//! logically sorts instead of trusting raw equality.

use common::{CheckError, CheckResult, CorruptionKind, CorruptionReport, RecordId};
use page::tuple::IndexTuple;
use page::Page;
use std::cmp::Ordering;

use crate::scankey::ScanKey;
use crate::source::ValueOracle;

/// Read a tuple's heap tiebreak, insisting it exists where the format
/// requires it. A data entry on a leaf page without one cannot take part
/// in any comparison and is corruption in its own right.
pub(crate) fn heap_tid_careful(
    page: &Page,
    tuple: &IndexTuple,
    offset: u16,
) -> CheckResult<Option<RecordId>> {
    let nonpivot = page.is_leaf() && offset >= page.first_data_slot();
    if nonpivot && tuple.heap.is_none() {
        return Err(CheckError::corruption(CorruptionReport {
            kind: CorruptionKind::KeyArity,
            block: page.block(),
            level: Some(page.level()),
            offsets: vec![offset],
            detail: "leaf entry lacks a heap tiebreak reference".into(),
        }));
    }
    Ok(tuple.heap)
}

/// Is `key` strictly left of the entry at `offset`?
///
/// On a tie, an entry with more key components than the key wins (its
/// extra components push it right), and with equal arity an entry that
/// carries a heap tiebreak the key lacks also wins.
pub(crate) fn strictly_less(
    oracle: &dyn ValueOracle,
    key: &ScanKey,
    page: &Page,
    offset: u16,
) -> CheckResult<bool> {
    match key.compare(oracle, page, offset)? {
        Ordering::Less => Ok(true),
        Ordering::Greater => Ok(false),
        Ordering::Equal => {
            let tuple = page.tuple(offset)?;
            let entry_heap = heap_tid_careful(page, &tuple, offset)?;
            if tuple.key_arity() == key.arity() {
                Ok(key.heap.is_none() && entry_heap.is_some())
            } else {
                Ok(key.arity() < tuple.key_arity())
            }
        }
    }
}

/// Is `key` at or left of the entry at `offset`? Used only for leaf
/// high-key checks, where exact equality of a truncated copy is legal, so
/// no tie-break extension applies.
pub(crate) fn less_or_equal(
    oracle: &dyn ValueOracle,
    key: &ScanKey,
    page: &Page,
    offset: u16,
) -> CheckResult<bool> {
    Ok(key.compare(oracle, page, offset)? != Ordering::Greater)
}

/// Is `key` strictly right of the entry at `offset`? Symmetric tie-break
/// to [`strictly_less`].
pub(crate) fn strictly_greater(
    oracle: &dyn ValueOracle,
    key: &ScanKey,
    page: &Page,
    offset: u16,
) -> CheckResult<bool> {
    match key.compare(oracle, page, offset)? {
        Ordering::Greater => Ok(true),
        Ordering::Less => Ok(false),
        Ordering::Equal => {
            let tuple = page.tuple(offset)?;
            let entry_heap = heap_tid_careful(page, &tuple, offset)?;
            if tuple.key_arity() == key.arity() {
                Ok(key.heap.is_some() && entry_heap.is_none())
            } else {
                Ok(key.arity() > tuple.key_arity())
            }
        }
    }
}

/// [`strictly_less`] evaluated against a page other than the current
/// target: a parent's boundary key against its child's entries.
pub(crate) fn strictly_less_on_child(
    oracle: &dyn ValueOracle,
    key: &ScanKey,
    child: &Page,
    offset: u16,
) -> CheckResult<bool> {
    strictly_less(oracle, key, child, offset)
}
