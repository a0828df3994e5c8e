use crate::invariants;
use crate::scankey::ScanKey;
use crate::source::ByteOrderOracle;
use common::PageId;
use page::Page;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::cmp::Ordering;
use testsupport::prelude::*;
use testsupport::proptest_generators::encoded_datum;

// A two-level fixture: leaves at blocks 1..=3 (two rows each), internal
// pages above them. Rows carry four-byte keys so replacements encode to
// the same width.
fn six_rows() -> Vec<HeapRow> {
    ["aaaa", "bbbb", "cccc", "dddd", "eeee", "ffff"]
        .iter()
        .enumerate()
        .map(|(i, k)| row(k.as_bytes(), 100, i as u16))
        .collect()
}

fn fetch(index: &mut MemIndex, block: u64) -> Page {
    let bytes = index.fetch(PageId(block)).unwrap();
    Page::parse(PageId(block), bytes).unwrap()
}

#[test]
fn compare_orders_entries_within_a_leaf() {
    let mut index = TreeBuilder::new(1).fanout(2).build(&six_rows());
    let leaf = fetch(&mut index, 1);
    let oracle = ByteOrderOracle;
    // Slot 0 is the high key; rows "aaaa" and "bbbb" sit at slots 1, 2.
    let key = ScanKey::from_tuple(leaf.block(), &leaf.tuple(1).unwrap(), true).unwrap();
    assert_eq!(key.compare(&oracle, &leaf, 1).unwrap(), Ordering::Equal);
    assert_eq!(key.compare(&oracle, &leaf, 2).unwrap(), Ordering::Less);
    let key = ScanKey::from_tuple(leaf.block(), &leaf.tuple(2).unwrap(), true).unwrap();
    assert_eq!(key.compare(&oracle, &leaf, 1).unwrap(), Ordering::Greater);
}

#[test]
fn negative_infinity_entry_sorts_below_everything() {
    let mut index = TreeBuilder::new(1).fanout(2).build(&six_rows());
    let leaf = fetch(&mut index, 1);
    // Block 4 is the first internal page; its first data entry is the
    // negative-infinity entry.
    let internal = fetch(&mut index, 4);
    assert!(internal.is_internal());
    let slot = internal.first_data_slot();
    assert!(internal.is_negative_infinity_slot(slot));
    let key = ScanKey::from_tuple(leaf.block(), &leaf.tuple(1).unwrap(), true).unwrap();
    assert_eq!(
        key.compare(&ByteOrderOracle, &internal, slot).unwrap(),
        Ordering::Greater
    );
}

#[test]
fn missing_tiebreak_resolves_by_search_mode() {
    let mut index = TreeBuilder::new(1).fanout(2).build(&six_rows());
    let leaf = fetch(&mut index, 1);
    let oracle = ByteOrderOracle;
    // Equal components, no heap tiebreak on the key: a boundary-search
    // key sits left of the real entry, an insertion key matches it.
    let keyless = ScanKey {
        values: vec![b"aaaa".to_vec()],
        heap: None,
        pivot_search: true,
    };
    assert_eq!(keyless.compare(&oracle, &leaf, 1).unwrap(), Ordering::Less);
    let insertion = ScanKey {
        pivot_search: false,
        ..keyless
    };
    assert_eq!(insertion.compare(&oracle, &leaf, 1).unwrap(), Ordering::Equal);
}

#[test]
fn heap_tiebreak_orders_duplicate_keys() {
    let rows: Vec<HeapRow> = (0..4).map(|i| row(b"same", 100, i)).collect();
    let mut index = TreeBuilder::new(1).fanout(8).build(&rows);
    let leaf = fetch(&mut index, 1);
    let oracle = ByteOrderOracle;
    let key = ScanKey::from_tuple(leaf.block(), &leaf.tuple(1).unwrap(), true).unwrap();
    assert_eq!(key.compare(&oracle, &leaf, 1).unwrap(), Ordering::Equal);
    assert_eq!(key.compare(&oracle, &leaf, 2).unwrap(), Ordering::Less);
    assert!(invariants::strictly_less(&oracle, &key, &leaf, 2).unwrap());
    let key = ScanKey::from_tuple(leaf.block(), &leaf.tuple(3).unwrap(), true).unwrap();
    assert!(invariants::strictly_greater(&oracle, &key, &leaf, 2).unwrap());
}

#[test]
fn truncated_high_key_bounds_its_own_copy() {
    let mut index = TreeBuilder::new(1).fanout(2).build(&six_rows());
    let leaf = fetch(&mut index, 1);
    let oracle = ByteOrderOracle;
    // The high key is a boundary copy of the page's last entry: equal to
    // it, strictly above everything before it.
    let last = ScanKey::from_tuple(leaf.block(), &leaf.tuple(2).unwrap(), true).unwrap();
    assert!(invariants::less_or_equal(&oracle, &last, &leaf, 0).unwrap());
    assert!(!invariants::strictly_less(&oracle, &last, &leaf, 0).unwrap());
    let first = ScanKey::from_tuple(leaf.block(), &leaf.tuple(1).unwrap(), true).unwrap();
    assert!(invariants::strictly_less(&oracle, &first, &leaf, 0).unwrap());
}

#[test]
fn tiebreak_extension_favors_entry_with_heap_reference() {
    let mut index = TreeBuilder::new(1).fanout(2).build(&six_rows());
    let leaf = fetch(&mut index, 1);
    let oracle = ByteOrderOracle;
    // An insertion-mode key without a tiebreak compares equal to the
    // entry, but the extension still resolves it as strictly less.
    let key = ScanKey {
        values: vec![b"aaaa".to_vec()],
        heap: None,
        pivot_search: false,
    };
    assert_eq!(key.compare(&oracle, &leaf, 1).unwrap(), Ordering::Equal);
    assert!(invariants::strictly_less(&oracle, &key, &leaf, 1).unwrap());
    assert!(!invariants::strictly_greater(&oracle, &key, &leaf, 1).unwrap());
}

#[test]
fn scan_key_from_heap_row_matches_indexed_entry() {
    let rows = six_rows();
    let mut index = TreeBuilder::new(1).fanout(2).build(&rows);
    let leaf = fetch(&mut index, 1);
    // `rows` holds the externally-linked copy of `HeapRow` (via
    // testsupport); rebuild it as this test build's own type.
    let key = ScanKey::from_heap_row(&crate::source::HeapRow {
        key: rows[0].key.clone(),
        heap: rows[0].heap,
    });
    assert_eq!(key.arity(), 1);
    assert_eq!(
        key.compare(&ByteOrderOracle, &leaf, 1).unwrap(),
        Ordering::Equal
    );
}

#[test]
fn scan_key_resolves_stored_encodings() {
    let rows = six_rows();
    let mut index = TreeBuilder::new(1)
        .fanout(6)
        .vary_encodings(true)
        .build(&rows);
    let leaf = fetch(&mut index, 1);
    for (i, wanted) in rows.iter().enumerate() {
        let tuple = leaf.tuple(i as u16).unwrap();
        let key = ScanKey::from_tuple(leaf.block(), &tuple, true).unwrap();
        assert_eq!(key.values, wanted.key, "slot {i}");
        assert_eq!(key.heap, Some(wanted.heap));
    }
}

#[test]
fn fingerprint_ignores_storage_encoding() {
    let rows = six_rows();
    let plain = TreeBuilder::new(1).fanout(6).build(&rows);
    let varied = TreeBuilder::new(1).fanout(6).vary_encodings(true).build(&rows);
    for (mut index_a, mut index_b) in [(plain, varied)] {
        let a = fetch(&mut index_a, 1);
        let b = fetch(&mut index_b, 1);
        for slot in 0..a.num_slots() {
            let norm_a =
                crate::fingerprint::normalize_tuple(a.block(), &a.tuple(slot).unwrap()).unwrap();
            let norm_b =
                crate::fingerprint::normalize_tuple(b.block(), &b.tuple(slot).unwrap()).unwrap();
            assert_eq!(
                crate::fingerprint::fingerprint(&norm_a),
                crate::fingerprint::fingerprint(&norm_b),
                "slot {slot}"
            );
        }
    }
}

#[test]
fn leaf_entry_without_heap_reference_is_rejected() {
    let mut index = TreeBuilder::new(1).fanout(2).build(&six_rows());
    let leaf = fetch(&mut index, 1);
    let mut tuple = leaf.tuple(1).unwrap();
    tuple.heap = None;
    let err = invariants::heap_tid_careful(&leaf, &tuple, 1).unwrap_err();
    assert!(matches!(err, common::CheckError::Corruption(_)));
}

proptest! {
    #[test]
    fn storage_encoding_never_leaks_into_keys_or_fingerprints(
        (value, datum) in encoded_datum(),
    ) {
        let heap = common::RecordId { page_id: PageId(100), slot: 0 };
        let stored = page::tuple::IndexTuple {
            heap: Some(heap),
            child: None,
            key: vec![datum],
        };
        let canonical = page::tuple::IndexTuple {
            heap: Some(heap),
            child: None,
            key: vec![page::tuple::KeyDatum::Inline(value.clone())],
        };
        let key = ScanKey::from_tuple(PageId(1), &stored, true).unwrap();
        prop_assert_eq!(&key.values, &vec![value]);
        let normalized = crate::fingerprint::normalize_tuple(PageId(1), &stored).unwrap();
        prop_assert_eq!(
            crate::fingerprint::fingerprint(&normalized),
            crate::fingerprint::fingerprint(&canonical)
        );
    }
}
