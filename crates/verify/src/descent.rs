//! Independent re-finding of leaf entries by a search from the root.
//!
//! The level walk proves the tree is ordered; it cannot prove that a
//! search would actually arrive at each entry, since that also depends on
//! the downlinks taken along the way. The prober repeats the search the
//! tree itself would run for an insertion of the same key and confirms it
//! lands on an equal entry.

use common::{CheckError, CheckResult, CorruptionKind, CorruptionReport, PageId};
use page::tuple::IndexTuple;
use page::Page;
use std::cmp::Ordering;

use crate::scankey::ScanKey;
use crate::state::CheckState;

/// Pages a single probe may touch before the descent is declared lost.
/// Generous against any plausible tree height plus right-moves past
/// unfinished splits; a probe that exceeds it is chasing a cycle.
const MAX_DESCENT_HOPS: u32 = 512;

/// Search for `tuple` from the fast root, the entry point real scans use.
/// Returns whether an entry comparing equal (heap tiebreak included) sits
/// at the position the search arrives at.
///
/// Exclusive lock only: a concurrent split between the walk and the probe
/// would make a miss meaningless.
pub(crate) fn root_descend(state: &mut CheckState<'_>, tuple: &IndexTuple) -> CheckResult<bool> {
    // Insertion semantics, not boundary-search semantics: the key carries
    // the full arity and the heap tiebreak, so comparison is total.
    let key = ScanKey::from_tuple(state.meta.fast_root, tuple, false)?;
    let mut block = state.meta.fast_root;
    let mut hops = 0u32;

    loop {
        hops += 1;
        if hops > MAX_DESCENT_HOPS {
            return Err(CheckError::corruption(CorruptionReport {
                kind: CorruptionKind::RootDescent,
                block,
                level: None,
                offsets: vec![],
                detail: format!("search did not terminate within {MAX_DESCENT_HOPS} pages"),
            }));
        }
        let page = state.fetch_page(block)?;

        // Move right past pages whose high key the search key exceeds;
        // with the exclusive lock held that only happens at the seam of
        // an unfinished split.
        if let Some(hk_slot) = page.high_key_slot()
            && key.compare(state.oracle, &page, hk_slot)? == Ordering::Greater
        {
            block = page.next();
            continue;
        }

        if page.is_leaf() {
            return leaf_position_holds_equal(state, &page, &key);
        }

        block = descend_slot(state, &page, &key)?;
    }
}

/// Pick the downlink an insertion of `key` would follow: the child of the
/// last entry the key is not left of. The negative-infinity entry anchors
/// the search, so there is always one.
fn descend_slot(state: &CheckState<'_>, page: &Page, key: &ScanKey) -> CheckResult<PageId> {
    let mut lo = page.first_data_slot();
    let mut hi = page.num_slots() - 1;
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if key.compare(state.oracle, page, mid)? == Ordering::Less {
            hi = mid - 1;
        } else {
            lo = mid;
        }
    }
    page.tuple(lo)?.child.ok_or_else(|| CheckError::Format {
        block: page.block(),
        detail: "internal entry lacks a child reference".into(),
    })
}

/// Binary-search the leaf for the key's position and test for an equal
/// entry there.
fn leaf_position_holds_equal(
    state: &CheckState<'_>,
    page: &Page,
    key: &ScanKey,
) -> CheckResult<bool> {
    let mut lo = page.first_data_slot();
    let mut hi = page.num_slots();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if key.compare(state.oracle, page, mid)? == Ordering::Greater {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo >= page.num_slots() {
        return Ok(false);
    }
    Ok(key.compare(state.oracle, page, lo)? == Ordering::Equal)
}
