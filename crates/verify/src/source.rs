//! Capabilities the caller injects into a verification run.
//!
//! The verifier owns no storage and no comparison semantics of its own. It
//! reads page images through a [`PageSource`], drains table rows through a
//! [`HeapSource`], and orders opaque key component values through a
//! [`ValueOracle`]. Everything else is derived from those three.

use common::{CheckResult, PageId, RecordId};
use std::cmp::Ordering;

/// Read-only access to the index file, one page image at a time.
///
/// A fetch must return a private copy of exactly one page; the verifier
/// never writes through this interface and never holds more than a handful
/// of copies at once. Implementations backed by live storage may serve the
/// copy under a short page latch, but must not hold anything across calls.
pub trait PageSource {
    /// Copy the raw bytes of `block`. The copy must be a consistent image
    /// of the page at some instant (no torn reads of the header).
    fn fetch(&mut self, block: PageId) -> CheckResult<Vec<u8>>;

    /// Number of blocks in the index, when cheaply known. Used only to
    /// size the downlink filter; `None` falls back to the caller's row
    /// estimate.
    fn page_count_hint(&self) -> Option<u64> {
        None
    }
}

/// One table row, in the shape the index would store it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapRow {
    /// Logical bytes of each key component, full arity, canonical form.
    pub key: Vec<Vec<u8>>,
    /// The row's location, used as the comparison tiebreak.
    pub heap: RecordId,
}

/// Single-pass iterator over the table rows the index is expected to
/// cover. Supplied only when the table cross-check is requested; each row
/// is consumed exactly once.
///
/// A row whose canonical location cannot be resolved by the producer is an
/// error on the producer's side; it propagates through the run unchanged.
pub trait HeapSource {
    fn next_row(&mut self) -> CheckResult<Option<HeapRow>>;
}

/// Three-way ordering over opaque encoded key component values.
///
/// The verifier compares logical bytes only; what those bytes mean is the
/// oracle's business. The ordering must be total and must match the one
/// the index was built under, or every ordering check is meaningless.
pub trait ValueOracle {
    fn compare_values(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain lexicographic byte ordering, for indexes whose key encoding is
/// order-preserving.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByteOrderOracle;

impl ValueOracle for ByteOrderOracle {
    fn compare_values(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}
