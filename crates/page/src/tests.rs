use super::*;
use common::RecordId;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tuple::rle_compress;

// -- raw page construction helpers (kept local: testsupport's builders sit
// above this crate) --

fn blank_page(flags_bits: u16, level: u32, prev: PageId, next: PageId) -> Vec<u8> {
    let mut bytes = vec![0u8; PAGE_SIZE];
    let header = PageHeader {
        lsn: 0,
        flags: flags_bits,
        level,
        prev,
        next,
        num_slots: 0,
        free_offset: PAGE_SIZE as u16,
    };
    codec::encode_header(&header, &mut bytes);
    bytes
}

fn push_tuple(bytes: &mut Vec<u8>, tuple: &IndexTuple) {
    let mut header = codec::decode_header(PageId(1), bytes).unwrap();
    let payload = codec::encode_tuple(tuple);
    let start = header.free_offset as usize - payload.len();
    bytes[start..header.free_offset as usize].copy_from_slice(&payload);
    let slot = Slot {
        state: slot_state::NORMAL,
        offset: start as u16,
        len: payload.len() as u16,
    };
    codec::encode_slot(&slot, bytes, header.num_slots);
    header.num_slots += 1;
    header.free_offset = start as u16;
    codec::encode_header(&header, bytes);
}

fn leaf_entry(key_byte: u8, slot: u16) -> IndexTuple {
    IndexTuple {
        heap: Some(RecordId { page_id: PageId(100), slot }),
        child: None,
        key: vec![KeyDatum::Inline(vec![key_byte])],
    }
}

fn meta_bytes() -> Vec<u8> {
    let mut bytes = blank_page(flags::META, 0, PageId::NONE, PageId::NONE);
    let meta = MetaPage {
        magic: META_MAGIC,
        version: META_VERSION,
        key_arity: 1,
        root: PageId(1),
        root_level: 0,
        fast_root: PageId(1),
        fast_level: 0,
    };
    codec::encode_meta(&meta, &mut bytes);
    bytes
}

// -- codec --

#[test]
fn header_roundtrips_in_declared_width() {
    let mut bytes = vec![0u8; PAGE_SIZE];
    let header = PageHeader {
        lsn: 0xDEAD_0001,
        flags: flags::LEAF | flags::ROOT,
        level: 0,
        prev: PageId(3),
        next: PageId::NONE,
        num_slots: 9,
        free_offset: 4000,
    };
    codec::encode_header(&header, &mut bytes);
    assert_eq!(codec::decode_header(PageId(1), &bytes).unwrap(), header);
}

#[test]
fn slot_roundtrips_in_declared_width() {
    let mut bytes = vec![0u8; PAGE_SIZE];
    let slot = Slot { state: slot_state::NORMAL, offset: 4090, len: 6 };
    codec::encode_slot(&slot, &mut bytes, 3);
    assert_eq!(codec::decode_slot(PageId(1), &bytes, 3).unwrap(), slot);
    // Adjacent slots are untouched.
    assert_eq!(
        codec::decode_slot(PageId(1), &bytes, 2).unwrap(),
        Slot { state: slot_state::UNUSED, offset: 0, len: 0 }
    );
}

#[test]
fn meta_roundtrips() {
    let bytes = meta_bytes();
    let meta = codec::decode_meta(META_BLOCK, &bytes).unwrap();
    assert_eq!(meta.magic, META_MAGIC);
    assert_eq!(meta.key_arity, 1);
    assert_eq!(meta.root, PageId(1));
}

// -- baseline sanity checks --

#[test]
fn empty_rightmost_root_leaf_parses() {
    let bytes = blank_page(flags::LEAF | flags::ROOT, 0, PageId::NONE, PageId::NONE);
    let parsed = Page::parse(PageId(1), bytes).unwrap();
    assert_eq!(parsed.kind(), PageKind::Leaf);
    assert!(parsed.is_rightmost());
    assert_eq!(parsed.high_key_slot(), None);
    assert_eq!(parsed.first_data_slot(), 0);
    assert_eq!(parsed.num_data_entries(), 0);
}

#[test]
fn meta_page_parses_at_block_zero() {
    let parsed = Page::parse(META_BLOCK, meta_bytes()).unwrap();
    assert_eq!(parsed.kind(), PageKind::Meta);
    assert_eq!(parsed.meta().unwrap().version, META_VERSION);
}

#[test]
fn meta_flag_away_from_block_zero_rejected() {
    let err = Page::parse(PageId(5), meta_bytes()).unwrap_err();
    assert!(matches!(err, CheckError::Format { block: PageId(5), .. }));
}

#[test]
fn block_zero_without_meta_flag_rejected() {
    let bytes = blank_page(flags::LEAF, 0, PageId::NONE, PageId::NONE);
    assert!(Page::parse(META_BLOCK, bytes).is_err());
}

#[test]
fn bad_meta_magic_rejected() {
    let mut bytes = meta_bytes();
    let mut meta = codec::decode_meta(META_BLOCK, &bytes).unwrap();
    meta.magic = 0xDEAD_BEEF;
    codec::encode_meta(&meta, &mut bytes);
    assert!(Page::parse(META_BLOCK, bytes).is_err());
}

#[test]
fn unsupported_meta_version_rejected() {
    let mut bytes = meta_bytes();
    let mut meta = codec::decode_meta(META_BLOCK, &bytes).unwrap();
    meta.version = META_VERSION + 1;
    codec::encode_meta(&meta, &mut bytes);
    assert!(Page::parse(META_BLOCK, bytes).is_err());
}

#[test]
fn leaf_with_nonzero_level_rejected() {
    let bytes = blank_page(flags::LEAF, 3, PageId::NONE, PageId::NONE);
    assert!(Page::parse(PageId(1), bytes).is_err());
}

#[test]
fn internal_with_level_zero_rejected() {
    let mut bytes = blank_page(0, 0, PageId::NONE, PageId::NONE);
    push_tuple(&mut bytes, &IndexTuple { heap: None, child: Some(PageId(2)), key: vec![] });
    assert!(Page::parse(PageId(1), bytes).is_err());
}

#[test]
fn deleted_page_level_not_checked() {
    // Level is meaningless once DELETED is set.
    let bytes = blank_page(flags::LEAF | flags::DELETED, 7, PageId::NONE, PageId(9));
    let parsed = Page::parse(PageId(1), bytes).unwrap();
    assert_eq!(parsed.ignorable_reason(), Some(IgnorableReason::Deleted));
}

#[test]
fn half_dead_internal_rejected() {
    let mut bytes = blank_page(flags::HALF_DEAD, 1, PageId::NONE, PageId::NONE);
    push_tuple(&mut bytes, &IndexTuple { heap: None, child: Some(PageId(2)), key: vec![] });
    assert!(Page::parse(PageId(1), bytes).is_err());
}

#[test]
fn garbage_flagged_internal_rejected() {
    let mut bytes = blank_page(flags::HAS_GARBAGE, 1, PageId::NONE, PageId::NONE);
    push_tuple(&mut bytes, &IndexTuple { heap: None, child: Some(PageId(2)), key: vec![] });
    assert!(Page::parse(PageId(1), bytes).is_err());
}

#[test]
fn internal_without_entries_rejected() {
    let bytes = blank_page(0, 1, PageId::NONE, PageId::NONE);
    assert!(Page::parse(PageId(1), bytes).is_err());
}

#[test]
fn non_rightmost_leaf_without_high_key_rejected() {
    let bytes = blank_page(flags::LEAF, 0, PageId::NONE, PageId(4));
    assert!(Page::parse(PageId(1), bytes).is_err());
}

#[test]
fn unknown_flag_bits_rejected() {
    let bytes = blank_page(flags::LEAF | 0x8000, 0, PageId::NONE, PageId::NONE);
    assert!(Page::parse(PageId(1), bytes).is_err());
}

#[test]
fn oversized_slot_count_rejected() {
    let mut bytes = blank_page(flags::LEAF, 0, PageId::NONE, PageId::NONE);
    let mut header = codec::decode_header(PageId(1), &bytes).unwrap();
    header.num_slots = MAX_SLOTS_PER_PAGE + 1;
    codec::encode_header(&header, &mut bytes);
    assert!(Page::parse(PageId(1), bytes).is_err());
}

#[test]
fn slot_array_overlapping_tuples_rejected() {
    let mut bytes = blank_page(flags::LEAF, 0, PageId::NONE, PageId::NONE);
    let mut header = codec::decode_header(PageId(1), &bytes).unwrap();
    header.num_slots = 10;
    header.free_offset = HEADER_BYTES as u16; // tuples would start inside slots
    codec::encode_header(&header, &mut bytes);
    assert!(Page::parse(PageId(1), bytes).is_err());
}

// -- slot and tuple access --

#[test]
fn tuples_read_back_through_checked_slots() {
    let mut bytes = blank_page(flags::LEAF, 0, PageId::NONE, PageId::NONE);
    push_tuple(&mut bytes, &leaf_entry(1, 0));
    push_tuple(&mut bytes, &leaf_entry(2, 1));
    let parsed = Page::parse(PageId(1), bytes).unwrap();
    assert_eq!(parsed.num_slots(), 2);
    let (tuple, consumed) = parsed.tuple_with_len(0).unwrap();
    assert_eq!(tuple, leaf_entry(1, 0));
    assert_eq!(consumed as u16, parsed.slot_checked(0).unwrap().len);
}

#[test]
fn out_of_range_slot_rejected() {
    let bytes = blank_page(flags::LEAF, 0, PageId::NONE, PageId::NONE);
    let parsed = Page::parse(PageId(1), bytes).unwrap();
    assert!(parsed.slot_checked(0).is_err());
}

#[test]
fn slot_payload_escaping_page_rejected() {
    let mut bytes = blank_page(flags::LEAF, 0, PageId::NONE, PageId::NONE);
    push_tuple(&mut bytes, &leaf_entry(1, 0));
    // Corrupt the slot to point past the end of the page.
    let mut slot = codec::decode_slot(PageId(1), &bytes, 0).unwrap();
    slot.offset = (PAGE_SIZE - 2) as u16;
    codec::encode_slot(&slot, &mut bytes, 0);
    let parsed = Page::parse(PageId(1), bytes).unwrap();
    assert!(parsed.slot_checked(0).is_err());
}

#[test]
fn slot_payload_inside_slot_array_rejected() {
    let mut bytes = blank_page(flags::LEAF, 0, PageId::NONE, PageId::NONE);
    push_tuple(&mut bytes, &leaf_entry(1, 0));
    let mut slot = codec::decode_slot(PageId(1), &bytes, 0).unwrap();
    slot.offset = HEADER_BYTES as u16;
    codec::encode_slot(&slot, &mut bytes, 0);
    let parsed = Page::parse(PageId(1), bytes).unwrap();
    assert!(parsed.slot_checked(0).is_err());
}

#[test]
fn redirect_and_unused_slots_rejected() {
    for bad_state in [slot_state::UNUSED, slot_state::REDIRECT] {
        let mut bytes = blank_page(flags::LEAF, 0, PageId::NONE, PageId::NONE);
        push_tuple(&mut bytes, &leaf_entry(1, 0));
        let mut slot = codec::decode_slot(PageId(1), &bytes, 0).unwrap();
        slot.state = bad_state;
        codec::encode_slot(&slot, &mut bytes, 0);
        let parsed = Page::parse(PageId(1), bytes).unwrap();
        assert!(parsed.slot_checked(0).is_err(), "state {bad_state} accepted");
    }
}

#[test]
fn high_key_only_on_non_rightmost_pages() {
    let mut bytes = blank_page(flags::LEAF, 0, PageId::NONE, PageId(9));
    push_tuple(&mut bytes, &leaf_entry(5, 0)); // high key slot
    push_tuple(&mut bytes, &leaf_entry(1, 1));
    let parsed = Page::parse(PageId(1), bytes).unwrap();
    assert_eq!(parsed.high_key_slot(), Some(0));
    assert_eq!(parsed.first_data_slot(), 1);
    assert_eq!(parsed.num_data_entries(), 1);
    assert!(parsed.high_key().unwrap().is_some());
}

#[test]
fn negative_infinity_slot_is_internal_only() {
    let mut bytes = blank_page(0, 1, PageId::NONE, PageId::NONE);
    push_tuple(&mut bytes, &IndexTuple { heap: None, child: Some(PageId(2)), key: vec![] });
    let parsed = Page::parse(PageId(1), bytes).unwrap();
    assert!(parsed.is_negative_infinity_slot(0));
    assert!(!parsed.is_negative_infinity_slot(1));
}

// -- key datum encodings --

#[test]
fn canonicalize_is_identity_for_inline() {
    let datum = KeyDatum::Inline(b"abc".to_vec());
    assert_eq!(datum.canonicalize().unwrap(), datum);
    assert!(IndexTuple { heap: None, child: None, key: vec![datum] }.is_canonical());
}

#[test]
fn short_form_canonicalizes_to_inline() {
    let datum = KeyDatum::Short(b"abc".to_vec());
    assert_eq!(datum.canonicalize().unwrap(), KeyDatum::Inline(b"abc".to_vec()));
}

#[test]
fn oversized_short_form_rejected() {
    let datum = KeyDatum::Short(vec![0u8; 300]);
    assert!(matches!(datum.logical_bytes(), Err(DatumError::OversizedShort { len: 300 })));
}

#[test]
fn compressed_form_decompresses_to_logical_bytes() {
    let raw = b"aaaabbbcc".to_vec();
    let datum = KeyDatum::Compressed {
        raw_len: raw.len() as u32,
        data: rle_compress(&raw),
    };
    assert_eq!(datum.logical_bytes().unwrap().as_ref(), raw.as_slice());
    assert_eq!(datum.canonicalize().unwrap(), KeyDatum::Inline(raw));
}

#[test]
fn corrupt_compression_rejected() {
    // Odd data length.
    let datum = KeyDatum::Compressed { raw_len: 3, data: vec![1, b'a', 2] };
    assert!(matches!(datum.logical_bytes(), Err(DatumError::BadCompression(_))));
    // Zero-length run.
    let datum = KeyDatum::Compressed { raw_len: 1, data: vec![0, b'a'] };
    assert!(matches!(datum.logical_bytes(), Err(DatumError::BadCompression(_))));
    // Declared length mismatch.
    let datum = KeyDatum::Compressed { raw_len: 5, data: vec![2, b'a'] };
    assert!(matches!(datum.logical_bytes(), Err(DatumError::BadCompression(_))));
}

#[test]
fn external_datum_never_resolves() {
    let datum = KeyDatum::External { pointer: 42, raw_len: 8 };
    assert!(matches!(datum.logical_bytes(), Err(DatumError::External { pointer: 42 })));
    assert!(datum.canonicalize().is_err());
}

proptest! {
    #[test]
    fn rle_roundtrips(raw in prop::collection::vec(any::<u8>(), 0..512)) {
        let datum = KeyDatum::Compressed {
            raw_len: raw.len() as u32,
            data: rle_compress(&raw),
        };
        let logical = datum.logical_bytes().unwrap();
        prop_assert_eq!(logical.as_ref(), raw.as_slice());
    }

    #[test]
    fn canonicalize_is_idempotent(raw in prop::collection::vec(any::<u8>(), 0..128)) {
        let compressed = KeyDatum::Compressed {
            raw_len: raw.len() as u32,
            data: rle_compress(&raw),
        };
        let once = compressed.canonicalize().unwrap();
        let twice = once.canonicalize().unwrap();
        prop_assert_eq!(once, twice);
    }
}
