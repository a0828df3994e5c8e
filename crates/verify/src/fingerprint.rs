//! Leaf-entry fingerprinting and the table cross-check drain.
//!
//! The same logical row can be stored under different component encodings
//! depending on decisions made at insert time, so fingerprints are taken
//! over a canonical form, never over raw page bytes.

use common::{CheckError, CheckResult, CorruptionKind, CorruptionReport, PageId};
use page::codec;
use page::tuple::{DatumError, IndexTuple, KeyDatum};
use tracing::debug;

use crate::source::HeapSource;
use crate::state::CheckState;

/// Rewrite every key component into canonical inline form. Idempotent: a
/// tuple that is already canonical comes back unchanged. A component still
/// in overflow form at this point is corruption, not something to resolve.
pub(crate) fn normalize_tuple(block: PageId, tuple: &IndexTuple) -> CheckResult<IndexTuple> {
    if tuple.is_canonical() {
        return Ok(tuple.clone());
    }
    let mut key = Vec::with_capacity(tuple.key.len());
    for datum in &tuple.key {
        key.push(canonical_datum(block, datum)?);
    }
    Ok(IndexTuple {
        heap: tuple.heap,
        child: tuple.child,
        key,
    })
}

fn canonical_datum(block: PageId, datum: &KeyDatum) -> CheckResult<KeyDatum> {
    datum.canonicalize().map_err(|e| match e {
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

/// Bytes a tuple is fingerprinted under: the encoding of its canonical
/// form. Two tuples fingerprint equal iff their logical content matches.
pub(crate) fn fingerprint(tuple: &IndexTuple) -> Vec<u8> {
    codec::encode_tuple(tuple)
}

/// Consume the table iterator, probing each row's equivalent leaf entry
/// against the fingerprint filter. The first absent row fails the run; a
/// filter hit for every row means each one is probably indexed (the filter
/// cannot produce a false negative).
pub(crate) fn drain_heap(state: &mut CheckState<'_>, heap: &mut dyn HeapSource) -> CheckResult<u64> {
    let filter = state
        .filter
        .take()
        .expect("heap drain requires the fingerprint filter");
    let mut matched = 0u64;
    while let Some(row) = heap.next_row()? {
        state.cancel.check()?;
        let equivalent = IndexTuple {
            heap: Some(row.heap),
            child: None,
            key: row.key.into_iter().map(KeyDatum::Inline).collect(),
        };
        if filter.lacks_element(&fingerprint(&equivalent)) {
            return Err(CheckError::MissingIndexEntry {
                heap: row.heap,
                detail: format!(
                    "row with {} key components has no fingerprinted leaf entry",
                    equivalent.key.len()
                ),
            });
        }
        matched += 1;
    }
    debug!(
        rows = matched,
        saturation = filter.prop_bits_set(),
        "table drain complete"
    );
    state.filter = Some(filter);
    Ok(matched)
}
