//! Buffer pool manager.

use crate::disk::DiskManager;
use crate::frame::{BufferFrame, FrameId};
use crate::guard::{PageReadGuard, PageWriteGuard};
use crate::replacer::{LruReplacer, Replacer};
use ferrite_common::page::PageId;
use ferrite_common::{FerriteError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page id to frame id mapping
/// - Free frame list for never-used frames, strictly preferred over eviction
/// - LRU replacement for eviction
/// - Pin counting for concurrent access
/// - Dirty write-back through the disk manager
///
/// A single pool-level mutex serializes page table, free list, and frame
/// metadata changes. Per-page data latches are orthogonal: callers acquire
/// them after a fetch and release them before the final unpin.
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<Arc<BufferFrame>>,
    /// Page table and free list.
    inner: Mutex<PoolInner>,
    /// Page replacement policy.
    replacer: LruReplacer,
    /// Backing store.
    disk: Arc<DiskManager>,
}

struct PoolInner {
    /// Maps resident page ids to their frames.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page.
    free_list: VecDeque<FrameId>,
}

impl BufferPool {
    /// Creates a new buffer pool over the given disk manager.
    pub fn new(config: BufferPoolConfig, disk: Arc<DiskManager>) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| Arc::new(BufferFrame::new(FrameId(i as u32))))
            .collect();

        // All frames start in the free list
        let free_list: VecDeque<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::with_capacity(num_frames),
                free_list,
            }),
            replacer: LruReplacer::new(num_frames),
            disk,
        }
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the backing disk manager.
    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.inner.lock().free_list.len()
    }

    /// Returns the number of pages currently resident in the pool.
    pub fn resident_count(&self) -> usize {
        self.inner.lock().page_table.len()
    }

    /// Returns the number of evictable frames.
    pub fn evictable_count(&self) -> usize {
        self.replacer.size()
    }

    /// Checks if a page is resident in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.inner.lock().page_table.contains_key(&page_id)
    }

    /// Takes a frame for a new resident page: free list first, then the
    /// replacer. Evicted dirty pages are written back. The returned frame is
    /// no longer in the page table, free list, or replacer.
    fn take_victim_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self
            .replacer
            .victim()
            .ok_or(FerriteError::BufferPoolFull)?;
        let frame = &self.frames[frame_id.0 as usize];

        let old_page_id = frame.page_id();
        if old_page_id.is_valid() {
            if frame.is_dirty() {
                tracing::debug!("writing back dirty page {} on eviction", old_page_id);
                let data = frame.read_data();
                if let Err(e) = self.disk.write_page(old_page_id, &data) {
                    // Put the victim back so the pool stays consistent
                    drop(data);
                    self.replacer.unpin(frame_id);
                    return Err(e);
                }
                frame.set_dirty(false);
            }
            inner.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }

    /// Fetches a page into the pool, pinning it.
    ///
    /// If the page is resident its pin count is incremented; otherwise a
    /// frame is taken (free list first, then eviction) and the page is read
    /// from disk. Fails with `BufferPoolFull` when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<BufferFrame>> {
        if !page_id.is_valid() {
            return Err(FerriteError::PageNotFound { page_id: page_id.0 });
        }

        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.pin_count() == 0 {
                self.replacer.pin(frame_id);
            }
            frame.pin();
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.take_victim_frame(&mut inner)?;
        let frame = &self.frames[frame_id.0 as usize];

        let bytes = match self.disk.read_page(page_id) {
            Ok(bytes) => bytes,
            Err(e) => {
                frame.reset();
                inner.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        frame.reset();
        frame.set_page_id(page_id);
        frame.copy_from(&bytes);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);

        Ok(Arc::clone(frame))
    }

    /// Unpins a page, optionally marking it dirty.
    ///
    /// The dirty flag is sticky: once set it stays until the page is written
    /// out. Returns false if the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.0 as usize];

        if frame.pin_count() <= 0 {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }

        if frame.unpin() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes a page out if dirty, clearing the dirty flag. Does not unpin.
    ///
    /// Returns false if the page id is invalid or the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }

        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.0 as usize];

        if frame.is_dirty() {
            let data = frame.read_data();
            self.disk.write_page(page_id, &data)?;
            frame.set_dirty(false);
        }
        Ok(true)
    }

    /// Allocates a new page and pins it in a zeroed frame.
    ///
    /// The disk manager zero-extends the data file, so the allocation itself
    /// is durable.
    pub fn new_page(&self) -> Result<(PageId, Arc<BufferFrame>)> {
        let mut inner = self.inner.lock();

        if inner.free_list.is_empty() && self.replacer.size() == 0 {
            tracing::debug!("buffer pool exhausted, all frames pinned");
            return Err(FerriteError::BufferPoolFull);
        }

        let frame_id = self.take_victim_frame(&mut inner)?;
        let frame = &self.frames[frame_id.0 as usize];

        let page_id = match self.disk.allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                frame.reset();
                inner.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);

        Ok((page_id, Arc::clone(frame)))
    }

    /// Removes a page from the pool and deallocates it.
    ///
    /// Returns `Ok(true)` if the page was removed or was not resident,
    /// `Ok(false)` if it is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.frames[frame_id.0 as usize];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        if frame.is_dirty() {
            let data = frame.read_data();
            self.disk.write_page(page_id, &data)?;
            frame.set_dirty(false);
        }

        self.replacer.pin(frame_id);
        inner.page_table.remove(&page_id);
        frame.reset();
        inner.free_list.push_back(frame_id);
        self.disk.deallocate_page(page_id)?;
        Ok(true)
    }

    /// Writes out every resident dirty page, clearing dirty flags.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.inner.lock();

        for (&page_id, &frame_id) in inner.page_table.iter() {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                self.disk.write_page(page_id, &data)?;
                frame.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Fetches a page and acquires its latch shared.
    pub fn fetch_page_read(self: &Arc<Self>, page_id: PageId) -> Result<PageReadGuard> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageReadGuard::new(Arc::clone(self), &frame))
    }

    /// Fetches a page and acquires its latch exclusive.
    pub fn fetch_page_write(self: &Arc<Self>, page_id: PageId) -> Result<PageWriteGuard> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageWriteGuard::new(Arc::clone(self), &frame))
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let inner = self.inner.lock();

        let mut pinned_pages = 0;
        let mut dirty_pages = 0;
        for &frame_id in inner.page_table.values() {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_pinned() {
                pinned_pages += 1;
            }
            if frame.is_dirty() {
                dirty_pages += 1;
            }
        }

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: inner.free_list.len(),
            resident_pages: inner.page_table.len(),
            pinned_pages,
            dirty_pages,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of resident pages.
    pub resident_pages: usize,
    /// Number of pinned pages.
    pub pinned_pages: usize,
    /// Number of dirty pages.
    pub dirty_pages: usize,
}
