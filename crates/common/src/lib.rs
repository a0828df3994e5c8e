//! Shared identifiers, error taxonomy, and run configuration for the
//! B-tree verifier.
//!
//! Everything the member crates agree on lives here: block/record ids that
//! are serialized into page bytes, the `CheckError` hierarchy every check
//! reports through, and the `VerifyOptions` a caller hands to a run.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Block number of one fixed-size page in the index file.
///
/// `PageId::NONE` plays the role of a null sibling/root link on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl PageId {
    /// Sentinel for "no page", used by sibling links and the meta root.
    pub const NONE: PageId = PageId(u64::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl PartialOrd for PageId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PageId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

/// Reference from a leaf index entry into the table it indexes.
///
/// Doubles as the tiebreak key component: two leaf entries with equal key
/// values are ordered by their `RecordId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.page_id, self.slot)
    }
}

/// Which structural invariant a corruption report is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorruptionKind {
    /// A sibling chain loops back on itself.
    CircularLink,
    /// Left and right sibling links of adjacent pages disagree.
    LinkDisagreement,
    /// A downlink or sibling link reaches a fully deleted page.
    DeletedPageReachable,
    /// A page fell off the end of its level (ignorable rightmost page).
    IgnorableRightmost,
    /// The first valid page of a level is not actually leftmost.
    NotLeftmost,
    /// The declared true-root page does not carry the root flag.
    NotTrueRoot,
    /// A page's level does not match the level being walked.
    LevelMismatch,
    /// Items within one page are out of order.
    ItemOrder,
    /// The last item of a page is not below its right sibling's first item.
    CrossPageOrder,
    /// An item violates its page's high-key upper bound.
    HighKeyBound,
    /// A child item violates the lower bound from its parent's downlink.
    DownlinkBound,
    /// A non-ignorable page has no downlink in its parent level.
    MissingDownlink,
    /// A tuple declares the wrong number of key components for its role.
    KeyArity,
    /// A tuple exceeds the size ceiling for its role.
    TupleSize,
    /// A slot's stored length disagrees with the tuple it addresses.
    TornTuple,
    /// A leaf entry still carries an unresolved overflow reference.
    ExternalDatum,
    /// A leaf entry found reachable by the level walk could not be found by
    /// an independent search from the root.
    RootDescent,
    /// The meta page is malformed or appears at the wrong block.
    MetaPage,
    /// A non-leaf level contains no valid pages at all.
    EmptyLevel,
}

impl std::fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CircularLink => "circular sibling link",
            Self::LinkDisagreement => "sibling links not in agreement",
            Self::DeletedPageReachable => "deleted page reachable",
            Self::IgnorableRightmost => "ignorable rightmost page",
            Self::NotLeftmost => "page is not leftmost on its level",
            Self::NotTrueRoot => "page is not the true root",
            Self::LevelMismatch => "page level mismatch",
            Self::ItemOrder => "item order invariant violated",
            Self::CrossPageOrder => "cross-page item order invariant violated",
            Self::HighKeyBound => "high key invariant violated",
            Self::DownlinkBound => "downlink lower bound invariant violated",
            Self::MissingDownlink => "block lacks downlink in parent",
            Self::KeyArity => "wrong number of key components",
            Self::TupleSize => "tuple exceeds size limit",
            Self::TornTuple => "tuple size does not equal slot length",
            Self::ExternalDatum => "unresolved overflow datum in leaf entry",
            Self::RootDescent => "entry not reachable from root",
            Self::MetaPage => "meta page corrupt",
            Self::EmptyLevel => "non-leaf level contains no valid pages",
        };
        f.write_str(s)
    }
}

/// Structured description of one confirmed invariant violation.
///
/// Carries enough detail (block, level, offsets) to reproduce the finding
/// without re-running verification.
#[derive(Clone, Debug)]
pub struct CorruptionReport {
    pub kind: CorruptionKind,
    /// Block blamed for the violation.
    pub block: PageId,
    /// Tree level of the blamed block, when known.
    pub level: Option<u32>,
    /// Slot offsets implicated, lowest first.
    pub offsets: Vec<u16>,
    /// Human-readable specifics (links followed, lengths, compared items).
    pub detail: String,
}

impl std::fmt::Display for CorruptionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at block {}", self.kind, self.block)?;
        if let Some(level) = self.level {
            write!(f, " level {level}")?;
        }
        if !self.offsets.is_empty() {
            write!(f, " offsets {:?}", self.offsets)?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Canonical error type for a verification run.
///
/// `Io` means a page could not be read at all; it is fatal but is not a
/// corruption verdict. Everything except `Config` and `Cancelled` aborts the
/// run at the first occurrence.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Page bytes failed baseline structural sanity checks.
    #[error("format error at block {block}: {detail}")]
    Format { block: PageId, detail: String },
    /// An ordering, bound, link, or downlink invariant failed.
    #[error("corruption: {0}")]
    Corruption(Box<CorruptionReport>),
    /// Table cross-check found a row with no matching index entry.
    #[error("table row {heap} lacks matching index entry: {detail}")]
    MissingIndexEntry { heap: RecordId, detail: String },
    /// Invalid option combination, rejected before the run starts.
    #[error("configuration: {0}")]
    Config(String),
    /// The caller's cancellation signal was observed; not a verdict.
    #[error("verification cancelled")]
    Cancelled,
}

impl CheckError {
    pub fn corruption(report: CorruptionReport) -> Self {
        Self::Corruption(Box::new(report))
    }
}

/// Result alias that carries a `CheckError`.
pub type CheckResult<T> = Result<T, CheckError>;

/// Caller-supplied configuration for one verification run.
///
/// # Example
/// ```
/// use common::VerifyOptions;
///
/// let opts = VerifyOptions::builder()
///     .exclusive_lock(true)
///     .cross_check_table(true)
///     .estimated_row_count(10_000)
///     .build();
/// assert!(opts.validate(true).is_ok());
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct VerifyOptions {
    /// Caller holds an exclusive structural lock: no concurrent split,
    /// merge, or removal can occur. Enables all cross-page checks.
    #[builder(default = false)]
    pub exclusive_lock: bool,
    /// Fingerprint leaf entries and drain the table iterator afterwards.
    #[builder(default = false)]
    pub cross_check_table: bool,
    /// Re-find every leaf entry by an independent search from the root.
    /// Requires `exclusive_lock`.
    #[builder(default = false)]
    pub root_descent: bool,
    /// Estimate of the number of rows the index covers; sizes the filter.
    #[builder(default = 1024)]
    pub estimated_row_count: u64,
    /// Upper bound on Bloom filter allocation.
    #[builder(default = 8 * 1024 * 1024)]
    pub memory_budget_bytes: usize,
    /// Seed for filter hashing; runs are reproducible given the same seed.
    #[builder(default = 0)]
    pub seed: u64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            exclusive_lock: false,
            cross_check_table: false,
            root_descent: false,
            estimated_row_count: 1024,
            memory_budget_bytes: 8 * 1024 * 1024,
            seed: 0,
        }
    }
}

impl VerifyOptions {
    /// Reject invalid mode combinations before any page is fetched.
    pub fn validate(&self, have_table_scan: bool) -> CheckResult<()> {
        if self.root_descent && !self.exclusive_lock {
            return Err(CheckError::Config(
                "root descent verification requires the exclusive structural lock".into(),
            ));
        }
        if self.cross_check_table && !have_table_scan {
            return Err(CheckError::Config(
                "table cross-check requested but no table scan capability supplied".into(),
            ));
        }
        if self.memory_budget_bytes == 0 {
            return Err(CheckError::Config(
                "memory budget must be at least one byte".into(),
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation signal, polled once per page visited and once
/// per table row drained.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Error out of a run when the token has been triggered.
    pub fn check(&self) -> CheckResult<()> {
        if self.is_cancelled() {
            Err(CheckError::Cancelled)
        } else {
            Ok(())
        }
    }
}
