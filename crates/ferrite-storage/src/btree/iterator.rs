//! Range iterator over the leaf sibling chain.

use crate::btree::page::LeafPage;
use ferrite_buffer::{BufferFrame, BufferPool};
use ferrite_common::page::PageId;
use ferrite_common::types::RecordId;
use std::sync::Arc;

/// Stateful cursor over the leaves of a B+ tree.
///
/// The cursor pins its current leaf for its whole lifetime but holds no
/// latch; entry reads take the page's data lock one read at a time.
/// Advancing past a leaf's end fetches the next leaf before unpinning the
/// previous one.
pub struct IndexIterator {
    pool: Arc<BufferPool>,
    page: Option<Arc<BufferFrame>>,
    index: usize,
}

impl IndexIterator {
    pub(crate) fn new(pool: Arc<BufferPool>, page: Option<Arc<BufferFrame>>, index: usize) -> Self {
        Self { pool, page, index }
    }

    /// True once the cursor has moved past the last entry of the last leaf.
    pub fn is_end(&self) -> bool {
        match &self.page {
            None => true,
            Some(frame) => {
                let data = frame.read_data();
                let leaf = LeafPage::new(&data[..]);
                self.index >= leaf.size() && !leaf.next_page_id().is_valid()
            }
        }
    }

    fn release(&mut self) {
        if let Some(frame) = self.page.take() {
            self.pool.unpin_page(frame.page_id(), false);
        }
    }
}

impl Iterator for IndexIterator {
    type Item = (i64, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.page.as_ref()?;

            let (item, next_page_id) = {
                let data = frame.read_data();
                let leaf = LeafPage::new(&data[..]);
                if self.index < leaf.size() {
                    (
                        Some((leaf.key_at(self.index), leaf.record_at(self.index))),
                        PageId::INVALID,
                    )
                } else {
                    (None, leaf.next_page_id())
                }
            };

            if let Some(item) = item {
                self.index += 1;
                return Some(item);
            }

            if !next_page_id.is_valid() {
                return None;
            }

            match self.pool.fetch_page(next_page_id) {
                Ok(next_frame) => {
                    self.release();
                    self.page = Some(next_frame);
                    self.index = 0;
                }
                Err(e) => {
                    tracing::warn!("iterator failed to fetch leaf {}: {}", next_page_id, e);
                    self.release();
                    return None;
                }
            }
        }
    }
}

impl Drop for IndexIterator {
    fn drop(&mut self) {
        self.release();
    }
}
