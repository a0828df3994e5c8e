//! Property-based generators for rows and component encodings.

use common::{PageId, RecordId};
use page::tuple::{rle_compress, KeyDatum};
use proptest::prelude::*;
use verify::HeapRow;

/// A unique, index-ordered row set with single-component keys. Uniqueness
/// comes from the generating set; ordering from the construction.
pub fn row_set(max_rows: usize) -> impl Strategy<Value = Vec<HeapRow>> {
    prop::collection::btree_set(prop::collection::vec(any::<u8>(), 1..12), 0..=max_rows).prop_map(
        |keys| {
            keys.into_iter()
                .enumerate()
                .map(|(i, key)| HeapRow {
                    key: vec![key],
                    heap: RecordId {
                        page_id: PageId(1000 + (i / 32) as u64),
                        slot: (i % 32) as u16,
                    },
                })
                .collect()
        },
    )
}

/// One logical value under an arbitrary storage encoding.
pub fn encoded_datum() -> impl Strategy<Value = (Vec<u8>, KeyDatum)> {
    (prop::collection::vec(any::<u8>(), 0..64), 0..3u8).prop_map(|(value, form)| {
        let datum = match form {
            1 => KeyDatum::Short(value.clone()),
            2 => KeyDatum::Compressed {
                raw_len: value.len() as u32,
                data: rle_compress(&value),
            },
            _ => KeyDatum::Inline(value.clone()),
        };
        (value, datum)
    })
}
