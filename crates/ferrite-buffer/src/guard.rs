//! RAII guards for latched buffer pool page access.

use crate::frame::{BufferFrame, PageBuf};
use crate::pool::BufferPool;
use ferrite_common::page::PageId;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Guard combining a pin with the page's shared latch.
///
/// Dropping the guard releases the latch and unpins the page (clean). Guards
/// are owned values, so a traversal can collect them in its page set and
/// release them in acquisition order later.
pub struct PageReadGuard {
    pool: Arc<BufferPool>,
    page_id: PageId,
    data: ArcRwLockReadGuard<RawRwLock, PageBuf>,
}

impl PageReadGuard {
    pub(crate) fn new(pool: Arc<BufferPool>, frame: &Arc<BufferFrame>) -> Self {
        let page_id = frame.page_id();
        let data = frame.data().read_arc();
        Self {
            pool,
            page_id,
            data,
        }
    }

    /// Returns the page id of the latched page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page data.
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }
}

impl Deref for PageReadGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data[..]
    }
}

impl Drop for PageReadGuard {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, false);
    }
}

/// Guard combining a pin with the page's exclusive latch.
///
/// Dropping the guard releases the latch and unpins the page dirty, the
/// write-intent discipline of the tree's release sweep.
pub struct PageWriteGuard {
    pool: Arc<BufferPool>,
    page_id: PageId,
    data: ArcRwLockWriteGuard<RawRwLock, PageBuf>,
}

impl PageWriteGuard {
    pub(crate) fn new(pool: Arc<BufferPool>, frame: &Arc<BufferFrame>) -> Self {
        let page_id = frame.page_id();
        let data = frame.data().write_arc();
        Self {
            pool,
            page_id,
            data,
        }
    }

    /// Returns the page id of the latched page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page data.
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    /// Returns the page data mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }
}

impl Deref for PageWriteGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data[..]
    }
}

impl DerefMut for PageWriteGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data[..]
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{DiskManager, DiskManagerConfig};
    use crate::pool::BufferPoolConfig;
    use tempfile::{tempdir, TempDir};

    fn create_test_pool(num_frames: usize) -> (Arc<BufferPool>, TempDir) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(
            DiskManager::new(DiskManagerConfig {
                path: dir.path().join("test.db"),
                fsync_enabled: false,
            })
            .unwrap(),
        );
        let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames }, disk));
        (pool, dir)
    }

    #[test]
    fn test_read_guard_unpins_clean_on_drop() {
        let (pool, _dir) = create_test_pool(4);
        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);

        {
            let guard = pool.fetch_page_read(page_id).unwrap();
            assert_eq!(guard.page_id(), page_id);
            assert_eq!(pool.stats().pinned_pages, 1);
        }

        let stats = pool.stats();
        assert_eq!(stats.pinned_pages, 0);
        assert_eq!(stats.dirty_pages, 0);
    }

    #[test]
    fn test_write_guard_unpins_dirty_on_drop() {
        let (pool, _dir) = create_test_pool(4);
        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);

        {
            let mut guard = pool.fetch_page_write(page_id).unwrap();
            guard.data_mut()[10] = 0xEE;
        }

        let stats = pool.stats();
        assert_eq!(stats.pinned_pages, 0);
        assert_eq!(stats.dirty_pages, 1);

        let guard = pool.fetch_page_read(page_id).unwrap();
        assert_eq!(guard[10], 0xEE);
    }

    #[test]
    fn test_concurrent_read_guards() {
        let (pool, _dir) = create_test_pool(4);
        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);

        let g1 = pool.fetch_page_read(page_id).unwrap();
        let g2 = pool.fetch_page_read(page_id).unwrap();
        assert_eq!(g1.data(), g2.data());
        assert_eq!(pool.stats().pinned_pages, 1);
        drop(g1);
        drop(g2);
        assert_eq!(pool.stats().pinned_pages, 0);
    }

    #[test]
    fn test_guards_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<PageReadGuard>();
        assert_send::<PageWriteGuard>();
    }
}
