//! Per-operation context for B+ tree latching.

use ferrite_buffer::{PageReadGuard, PageWriteGuard};
use ferrite_common::page::PageId;

/// A latched page held by an operation.
pub enum PageGuard {
    /// Shared latch.
    Read(PageReadGuard),
    /// Exclusive latch.
    Write(PageWriteGuard),
}

impl PageGuard {
    /// Returns the latched page's id.
    pub fn page_id(&self) -> PageId {
        match self {
            PageGuard::Read(guard) => guard.page_id(),
            PageGuard::Write(guard) => guard.page_id(),
        }
    }

    /// Returns the page data.
    pub fn data(&self) -> &[u8] {
        match self {
            PageGuard::Read(guard) => guard.data(),
            PageGuard::Write(guard) => guard.data(),
        }
    }

    /// Returns the page data mutably, None for a shared latch.
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            PageGuard::Read(_) => None,
            PageGuard::Write(guard) => Some(guard.data_mut()),
        }
    }
}

/// Context owned by a single tree operation.
///
/// Latched pages accumulate in the page set in acquisition order; releasing
/// drops them in that same order, each drop unlatching and unpinning its
/// page. Pages emptied by merges wait in the deleted set until every latch
/// is released, then go back to the buffer pool.
#[derive(Default)]
pub struct Transaction {
    page_set: Vec<PageGuard>,
    deleted_page_set: Vec<PageId>,
}

impl Transaction {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a latched page to the page set.
    pub fn add_to_page_set(&mut self, guard: PageGuard) {
        self.page_set.push(guard);
    }

    /// The held latches in acquisition order.
    pub fn page_set(&self) -> &[PageGuard] {
        &self.page_set
    }

    /// Mutable access to the held latches.
    pub fn page_set_mut(&mut self) -> &mut Vec<PageGuard> {
        &mut self.page_set
    }

    /// Releases every held latch in acquisition order.
    pub fn release_page_set(&mut self) {
        self.page_set.drain(..);
    }

    /// Queues a page id for removal after the release sweep.
    pub fn add_to_deleted_set(&mut self, page_id: PageId) {
        self.deleted_page_set.push(page_id);
    }

    /// Takes the queued page ids, leaving the set empty.
    pub fn take_deleted_set(&mut self) -> Vec<PageId> {
        std::mem::take(&mut self.deleted_page_set)
    }
}
