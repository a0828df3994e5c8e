//! Per-page checks: every entry on the target page against its own page,
//! its right sibling, and (under the exclusive lock) its children and its
//! parent's downlinks.

use common::{CheckError, CheckResult, CorruptionKind, CorruptionReport, PageId};
use page::tuple::IndexTuple;
use page::{slot_state, Page, MAX_TUPLE_BYTES, TIEBREAK_RESERVE};
use tracing::{debug, warn};

use crate::descent;
use crate::fingerprint;
use crate::invariants;
use crate::scankey::ScanKey;
use crate::state::CheckState;

fn report(kind: CorruptionKind, page: &Page, offsets: Vec<u16>, detail: String) -> CheckError {
    CheckError::corruption(CorruptionReport {
        kind,
        block: page.block(),
        level: Some(page.level()),
        offsets,
        detail: format!("{detail}; page log position {}", page.lsn()),
    })
}

fn child_of(block: PageId, tuple: &IndexTuple) -> CheckResult<PageId> {
    tuple.child.ok_or_else(|| CheckError::Format {
        block,
        detail: "internal entry lacks a child reference".into(),
    })
}

/// Validate one non-ignorable page. The walker has already vetted the
/// page's level and sibling links; everything here is about the entries.
pub(crate) fn check_target_page(state: &mut CheckState<'_>, target: &Page) -> CheckResult<()> {
    let exclusive = state.options.exclusive_lock;
    let arity = state.meta.key_arity;

    if let Some(hk_slot) = target.high_key_slot() {
        let high_key = target.tuple(hk_slot)?;
        if high_key.key_arity() > arity {
            return Err(report(
                CorruptionKind::KeyArity,
                target,
                vec![hk_slot],
                format!(
                    "high key has {} components, index arity is {arity}",
                    high_key.key_arity()
                ),
            ));
        }
    }

    for offset in target.first_data_slot()..target.num_slots() {
        let slot = target.slot_checked(offset)?;
        let (tuple, consumed) = target.tuple_with_len(offset)?;

        // A payload whose encoding consumes fewer bytes than the slot
        // claims was probably half-written.
        if consumed != slot.len as usize {
            return Err(report(
                CorruptionKind::TornTuple,
                target,
                vec![offset],
                format!("encoding spans {consumed} bytes, slot claims {}", slot.len),
            ));
        }

        check_entry_arity(target, offset, &tuple, arity)?;

        if target.is_internal()
            && let Some(filter) = &mut state.downlink_filter
        {
            let child = child_of(target.block(), &tuple)?;
            filter.add_element(&child.0.to_le_bytes());
        }

        // The negative-infinity entry carries no comparable key.
        if target.is_negative_infinity_slot(offset) {
            continue;
        }

        // Dead entries stay search-reachable until their storage is
        // reclaimed, so the probe covers them too.
        if state.options.root_descent && target.is_leaf() {
            if !descent::root_descend(state, &tuple)? {
                return Err(report(
                    CorruptionKind::RootDescent,
                    target,
                    vec![offset],
                    "entry not found by an independent search from the root".into(),
                ));
            }
        }

        let key = ScanKey::from_tuple(target.block(), &tuple, true)?;

        // Boundary tuples on internal pages must leave room for the heap
        // tiebreak a future split may force onto them.
        let limit = if target.is_internal() && tuple.heap.is_none() {
            MAX_TUPLE_BYTES - TIEBREAK_RESERVE
        } else {
            MAX_TUPLE_BYTES
        };
        if consumed > limit {
            return Err(report(
                CorruptionKind::TupleSize,
                target,
                vec![offset],
                format!("tuple spans {consumed} bytes, limit is {limit}"),
            ));
        }

        if target.is_leaf()
            && slot.state != slot_state::DEAD
            && state.filter.is_some()
        {
            let normalized = fingerprint::normalize_tuple(target.block(), &tuple)?;
            let bytes = fingerprint::fingerprint(&normalized);
            if let Some(filter) = &mut state.filter {
                filter.add_element(&bytes);
            }
        }

        if let Some(hk_slot) = target.high_key_slot() {
            // Leaf high keys are truncated copies of a real entry, so
            // equality is legal there; internal boundary keys are unique
            // within their level.
            let within_bound = if target.is_leaf() {
                invariants::less_or_equal(state.oracle, &key, target, hk_slot)?
            } else {
                invariants::strictly_less(state.oracle, &key, target, hk_slot)?
            };
            if !within_bound {
                return Err(report(
                    CorruptionKind::HighKeyBound,
                    target,
                    vec![offset],
                    "entry sorts above its page's high key".into(),
                ));
            }
        }

        if offset + 1 < target.num_slots() {
            if !invariants::strictly_less(state.oracle, &key, target, offset + 1)? {
                return Err(report(
                    CorruptionKind::ItemOrder,
                    target,
                    vec![offset, offset + 1],
                    "adjacent entries out of order".into(),
                ));
            }
        } else if let Some(right_key) = right_page_check_scankey(state, target)? {
            // The page's final entry must sort below its right sibling's
            // first comparable entry.
            if !invariants::strictly_greater(state.oracle, &right_key, target, offset)? {
                let suppressed = !exclusive && {
                    // A concurrent deletion can merge this page's key
                    // range into a sibling between the fetches. Re-fetch:
                    // a target that has since become ignorable explains
                    // the apparent violation.
                    let refetched = state.fetch_page(target.block())?;
                    refetched.is_ignorable()
                };
                if suppressed {
                    debug!(
                        block = %target.block(),
                        "target deleted during cross-page check, abandoning"
                    );
                } else {
                    return Err(report(
                        CorruptionKind::CrossPageOrder,
                        target,
                        vec![offset],
                        "final entry sorts above the right sibling's first entry".into(),
                    ));
                }
            }
        }

        if target.is_internal() && exclusive {
            let child = child_of(target.block(), &tuple)?;
            downlink_check(state, target, offset, &key, child)?;
        }
    }

    if exclusive
        && let Some(filter) = &state.downlink_filter
        && filter.lacks_element(&target.block().0.to_le_bytes())
    {
        downlink_missing_check(state, target)?;
    }

    Ok(())
}

/// Wrong component count for the entry's role is corruption: truncation is
/// only ever legal on boundary tuples, and the negative-infinity entry
/// carries no components at all.
fn check_entry_arity(
    target: &Page,
    offset: u16,
    tuple: &IndexTuple,
    arity: u16,
) -> CheckResult<()> {
    if target.is_leaf() {
        if tuple.key_arity() != arity {
            return Err(report(
                CorruptionKind::KeyArity,
                target,
                vec![offset],
                format!(
                    "leaf entry has {} components, index arity is {arity}",
                    tuple.key_arity()
                ),
            ));
        }
        invariants::heap_tid_careful(target, tuple, offset)?;
    } else if target.is_negative_infinity_slot(offset) {
        if tuple.key_arity() != 0 {
            return Err(report(
                CorruptionKind::KeyArity,
                target,
                vec![offset],
                format!(
                    "negative-infinity entry has {} components",
                    tuple.key_arity()
                ),
            ));
        }
    } else if tuple.key_arity() > arity {
        return Err(report(
            CorruptionKind::KeyArity,
            target,
            vec![offset],
            format!(
                "boundary tuple has {} components, index arity is {arity}",
                tuple.key_arity()
            ),
        ));
    }
    Ok(())
}

/// Build a key from the first comparable entry right of `target`, skipping
/// ignorable pages. The rightmost page of the level stops the skipping
/// even when it is ignorable: its entries still bound the target. `None`
/// means the level ends, or the sibling has nothing comparable, and the
/// cross-page check has nothing to say.
fn right_page_check_scankey(
    state: &mut CheckState<'_>,
    target: &Page,
) -> CheckResult<Option<ScanKey>> {
    let mut block = target.next();
    loop {
        if block.is_none() {
            return Ok(None);
        }
        let page = state.fetch_page(block)?;
        if page.is_ignorable() && !page.is_rightmost() {
            debug!(block = %block, "skipping ignorable right sibling");
            block = page.next();
            continue;
        }
        if !page.is_ignorable() && page.level() != target.level() {
            return Err(report(
                CorruptionKind::LevelMismatch,
                &page,
                vec![],
                format!("right sibling of a level-{} page", target.level()),
            ));
        }
        let first = if page.is_internal() {
            // Skip the sibling's own negative-infinity entry.
            page.first_data_slot() + 1
        } else {
            page.first_data_slot()
        };
        if first >= page.num_slots() {
            debug!(block = %block, "right sibling has no comparable entries");
            return Ok(None);
        }
        let tuple = page.tuple(first)?;
        return Ok(Some(ScanKey::from_tuple(page.block(), &tuple, true)?));
    }
}

/// A downlink is a strict lower bound on everything in the child it names.
/// Exclusive lock only: online, a concurrent split can move entries left
/// of the downlink before the parent is updated.
fn downlink_check(
    state: &mut CheckState<'_>,
    target: &Page,
    offset: u16,
    key: &ScanKey,
    child_block: PageId,
) -> CheckResult<()> {
    let child = state.fetch_page(child_block)?;
    if child.is_deleted() {
        return Err(report(
            CorruptionKind::DeletedPageReachable,
            target,
            vec![offset],
            format!("downlink names deleted block {child_block}"),
        ));
    }
    // A half-dead child is fine: its deletion was interrupted, but the
    // entries it still holds must respect the bound.
    for child_offset in child.first_data_slot()..child.num_slots() {
        if child.is_negative_infinity_slot(child_offset) {
            continue;
        }
        if !invariants::strictly_less_on_child(state.oracle, key, &child, child_offset)? {
            return Err(report(
                CorruptionKind::DownlinkBound,
                target,
                vec![offset],
                format!(
                    "entry {child_offset} on child block {child_block} sorts at or below \
                     the downlink"
                ),
            ));
        }
    }
    Ok(())
}

/// The target was never named as a downlink on its parent level. Decide
/// whether that is the footprint of an interrupted operation or real
/// damage.
fn downlink_missing_check(state: &mut CheckState<'_>, target: &Page) -> CheckResult<()> {
    // The true root has no parent to name it.
    if target.is_root_flagged() {
        return Ok(());
    }
    // The right half of an unfinished split gets its downlink only when
    // the split is retried.
    if state.rightsplit {
        debug!(block = %target.block(), "harmless interrupted page split detected");
        return Ok(());
    }
    if target.is_leaf() {
        return Err(report(
            CorruptionKind::MissingDownlink,
            target,
            vec![],
            "leaf block has no downlink on the parent level".into(),
        ));
    }

    // The remaining benign explanation is an interrupted multi-level
    // deletion with the target as its top parent. Descend the leftmost
    // spine: the deletion's half-dead leaf must still name the target.
    let mut level = target.level();
    let mut block = child_of(target.block(), &target.tuple(target.first_data_slot())?)?;
    let leaf = loop {
        let child = state.fetch_page(block)?;
        if child.is_leaf() {
            break child;
        }
        if child.level() != level - 1 {
            return Err(report(
                CorruptionKind::LevelMismatch,
                &child,
                vec![],
                format!("leftmost downlink from a level-{level} page"),
            ));
        }
        level = child.level();
        block = child_of(child.block(), &child.tuple(child.first_data_slot())?)?;
    };

    if leaf.is_half_dead() && !leaf.is_rightmost() {
        let pending = leaf.high_key()?.and_then(|hk| hk.child);
        if pending == Some(target.block()) {
            // Heuristic: the stored pending-parent reference is indirect
            // evidence of intent, so say so out loud even though it is
            // not reported as corruption.
            warn!(
                block = %target.block(),
                leaf = %leaf.block(),
                "suspected interrupted multi-level deletion, downlink absence treated as benign"
            );
            return Ok(());
        }
    }

    Err(report(
        CorruptionKind::MissingDownlink,
        target,
        vec![],
        "internal block has no downlink on the parent level".into(),
    ))
}
