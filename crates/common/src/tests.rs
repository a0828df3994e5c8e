use super::*;
use std::io;

#[test]
fn page_id_none_sentinel() {
    assert!(PageId::NONE.is_none());
    assert!(!PageId(0).is_none());
    assert_eq!(format!("{}", PageId::NONE), "none");
    assert_eq!(format!("{}", PageId(7)), "7");
}

#[test]
fn record_id_orders_by_page_then_slot() {
    let a = RecordId { page_id: PageId(1), slot: 9 };
    let b = RecordId { page_id: PageId(2), slot: 0 };
    let c = RecordId { page_id: PageId(2), slot: 1 };
    assert!(a < b);
    assert!(b < c);
    assert_eq!(format!("{b}"), "(2,0)");
}

#[test]
fn options_defaults_are_sane() {
    let opts = VerifyOptions::default();
    assert!(!opts.exclusive_lock);
    assert!(!opts.cross_check_table);
    assert!(!opts.root_descent);
    assert!(opts.memory_budget_bytes > 0);
    assert!(opts.validate(false).is_ok());
}

#[test]
fn root_descent_requires_exclusive_lock() {
    let opts = VerifyOptions::builder().root_descent(true).build();
    assert!(matches!(opts.validate(false), Err(CheckError::Config(_))));

    let opts = VerifyOptions::builder()
        .root_descent(true)
        .exclusive_lock(true)
        .build();
    assert!(opts.validate(false).is_ok());
}

#[test]
fn cross_check_requires_table_scan() {
    let opts = VerifyOptions::builder().cross_check_table(true).build();
    assert!(matches!(opts.validate(false), Err(CheckError::Config(_))));
    assert!(opts.validate(true).is_ok());
}

#[test]
fn zero_memory_budget_rejected() {
    let opts = VerifyOptions::builder().memory_budget_bytes(0).build();
    assert!(matches!(opts.validate(false), Err(CheckError::Config(_))));
}

#[test]
fn corruption_report_formats_cleanly() {
    let report = CorruptionReport {
        kind: CorruptionKind::HighKeyBound,
        block: PageId(12),
        level: Some(0),
        offsets: vec![3],
        detail: "item above high key".into(),
    };
    let text = format!("{report}");
    assert!(text.contains("high key"));
    assert!(text.contains("block 12"));
    assert!(text.contains("level 0"));
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let err: CheckError = e.into();
    assert!(matches!(err, CheckError::Io(_)));
}

#[test]
fn cancel_token_trips_once_set() {
    let token = CancelToken::new();
    assert!(token.check().is_ok());
    token.cancel();
    assert!(matches!(token.check(), Err(CheckError::Cancelled)));
    // Clones observe the same flag.
    let clone = token.clone();
    assert!(clone.is_cancelled());
}
