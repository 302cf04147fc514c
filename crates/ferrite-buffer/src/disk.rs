//! Disk manager for page-level file I/O.

use ferrite_common::page::{PageId, PAGE_SIZE};
use ferrite_common::{FerriteError, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Path to the data file.
    pub path: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./ferrite.db"),
            fsync_enabled: true,
        }
    }
}

/// Manages reading and writing pages to the data file.
///
/// Page ids map directly to file offsets (`page_id * PAGE_SIZE`). Allocation
/// is monotonic: a fresh page zero-extends the file, so an allocated page can
/// always be read back. Deallocated ids are recorded but not recycled; a
/// free-space map owning reuse is a separate concern.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// Open file handle and allocation state.
    inner: Mutex<DiskInner>,
}

struct DiskInner {
    /// The data file.
    file: File,
    /// Number of pages in the file.
    num_pages: u32,
    /// Page ids released by the caller, kept for accounting.
    deallocated: HashSet<i32>,
}

impl DiskManager {
    /// Creates a new disk manager, opening or creating the data file.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            config,
            inner: Mutex::new(DiskInner {
                file,
                num_pages,
                deallocated: HashSet::new(),
            }),
        })
    }

    /// Returns the data file path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut inner = self.inner.lock();

        if !page_id.is_valid() || page_id.0 as u32 >= inner.num_pages {
            return Err(FerriteError::PageNotFound { page_id: page_id.0 });
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = [0u8; PAGE_SIZE];
        inner.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(FerriteError::PageNotFound { page_id: page_id.0 });
        }

        let mut inner = self.inner.lock();

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(data)?;

        if self.config.fsync_enabled {
            inner.file.sync_all()?;
        }

        // Update page count if we extended the file
        if page_id.0 as u32 >= inner.num_pages {
            inner.num_pages = page_id.0 as u32 + 1;
        }

        Ok(())
    }

    /// Allocates a new page, returning its id.
    ///
    /// The file is zero-extended so the allocation survives a crash and the
    /// page can be read back immediately.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();

        let page_num = inner.num_pages;
        let page_id = PageId(page_num as i32);

        let offset = (page_num as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.config.fsync_enabled {
            inner.file.sync_all()?;
        }

        inner.num_pages = page_num + 1;

        Ok(page_id)
    }

    /// Marks a page id as no longer in use.
    ///
    /// The id is not recycled; allocation stays monotonic.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() {
            return Err(FerriteError::PageNotFound { page_id: page_id.0 });
        }

        let mut inner = self.inner.lock();
        inner.deallocated.insert(page_id.0);
        tracing::debug!("deallocated page {}", page_id);
        Ok(())
    }

    /// Returns the number of pages in the data file.
    pub fn num_pages(&self) -> u32 {
        self.inner.lock().num_pages
    }

    /// Returns the number of deallocated pages.
    pub fn deallocated_count(&self) -> usize {
        self.inner.lock().deallocated.len()
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.inner.lock().file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_disk_manager() -> (DiskManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = DiskManagerConfig {
            path: dir.path().join("test.db"),
            fsync_enabled: false,
        };
        let dm = DiskManager::new(config).unwrap();
        (dm, dir)
    }

    #[test]
    fn test_disk_manager_new() {
        let (dm, _dir) = create_test_disk_manager();
        assert_eq!(dm.num_pages(), 0);
        assert!(dm.path().exists());
    }

    #[test]
    fn test_disk_manager_allocate_page() {
        let (dm, _dir) = create_test_disk_manager();

        let page1 = dm.allocate_page().unwrap();
        assert_eq!(page1, PageId(0));

        let page2 = dm.allocate_page().unwrap();
        assert_eq!(page2, PageId(1));

        assert_eq!(dm.num_pages(), 2);
    }

    #[test]
    fn test_disk_manager_allocated_page_is_zeroed() {
        let (dm, _dir) = create_test_disk_manager();

        let page_id = dm.allocate_page().unwrap();
        let data = dm.read_page(page_id).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_write_read() {
        let (dm, _dir) = create_test_disk_manager();

        let page_id = dm.allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[100] = 0xCD;
        data[PAGE_SIZE - 1] = 0xEF;
        dm.write_page(page_id, &data).unwrap();

        let read_data = dm.read_page(page_id).unwrap();
        assert_eq!(read_data[0], 0xAB);
        assert_eq!(read_data[100], 0xCD);
        assert_eq!(read_data[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_disk_manager_read_nonexistent_page() {
        let (dm, _dir) = create_test_disk_manager();

        dm.allocate_page().unwrap();

        let result = dm.read_page(PageId(99));
        assert!(matches!(
            result,
            Err(FerriteError::PageNotFound { page_id: 99 })
        ));

        let result = dm.read_page(PageId::INVALID);
        assert!(result.is_err());
    }

    #[test]
    fn test_disk_manager_overwrite_page() {
        let (dm, _dir) = create_test_disk_manager();

        let page_id = dm.allocate_page().unwrap();

        let mut data1 = [0u8; PAGE_SIZE];
        data1[0] = 0xAA;
        dm.write_page(page_id, &data1).unwrap();

        let mut data2 = [0u8; PAGE_SIZE];
        data2[0] = 0xBB;
        dm.write_page(page_id, &data2).unwrap();

        let read_data = dm.read_page(page_id).unwrap();
        assert_eq!(read_data[0], 0xBB);
    }

    #[test]
    fn test_disk_manager_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.db");
        let page_id;

        {
            let config = DiskManagerConfig {
                path: path.clone(),
                fsync_enabled: true,
            };
            let dm = DiskManager::new(config).unwrap();
            page_id = dm.allocate_page().unwrap();

            let mut data = [0u8; PAGE_SIZE];
            data[0] = 0xFF;
            dm.write_page(page_id, &data).unwrap();
        }

        {
            let config = DiskManagerConfig {
                path,
                fsync_enabled: true,
            };
            let dm = DiskManager::new(config).unwrap();
            assert_eq!(dm.num_pages(), 1);

            let read_data = dm.read_page(page_id).unwrap();
            assert_eq!(read_data[0], 0xFF);
        }
    }

    #[test]
    fn test_disk_manager_deallocate() {
        let (dm, _dir) = create_test_disk_manager();

        let page_id = dm.allocate_page().unwrap();
        dm.deallocate_page(page_id).unwrap();
        assert_eq!(dm.deallocated_count(), 1);

        // Allocation stays monotonic
        let next = dm.allocate_page().unwrap();
        assert_eq!(next, PageId(1));
    }

    #[test]
    fn test_disk_manager_deallocate_invalid() {
        let (dm, _dir) = create_test_disk_manager();
        assert!(dm.deallocate_page(PageId::INVALID).is_err());
    }

    #[test]
    fn test_disk_manager_flush() {
        let (dm, _dir) = create_test_disk_manager();

        dm.allocate_page().unwrap();
        dm.flush().unwrap();
    }
}
