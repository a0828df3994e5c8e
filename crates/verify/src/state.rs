//! Mutable context threaded through one verification run.

use bloom::BloomFilter;
use common::{CancelToken, CheckError, CheckResult, PageId, VerifyOptions};
use page::{MetaPage, Page};

use crate::source::{PageSource, ValueOracle};

/// Everything a check needs to see: the injected capabilities, the decoded
/// metadata, the per-run filters, and the running counters.
pub(crate) struct CheckState<'a> {
    pub source: &'a mut dyn PageSource,
    pub oracle: &'a dyn ValueOracle,
    pub options: &'a VerifyOptions,
    pub cancel: CancelToken,
    pub meta: MetaPage,
    /// Fingerprints of every live leaf entry; probed by the heap drain.
    pub filter: Option<BloomFilter>,
    /// Block numbers seen as downlink targets on the parent level.
    pub downlink_filter: Option<BloomFilter>,
    /// Whether the previously visited page on this level was the left half
    /// of an unfinished split. Its right sibling legitimately lacks a
    /// downlink until the split's parent insertion is retried.
    pub rightsplit: bool,
    pub pages_visited: u64,
}

impl CheckState<'_> {
    /// Fetch and parse one page, polling cancellation first. Every page
    /// the run looks at comes through here.
    pub fn fetch_page(&mut self, block: PageId) -> CheckResult<Page> {
        self.cancel.check()?;
        if block.is_none() {
            return Err(CheckError::Format {
                block,
                detail: "attempt to fetch the nonexistent block".into(),
            });
        }
        let bytes = self.source.fetch(block)?;
        self.pages_visited += 1;
        Page::parse(block, bytes)
    }
}
