//! Header page: index name to root page id records.
//!
//! Page 0 is reserved. It stores a record count followed by fixed-size
//! records of `(name: [u8; 32], root_page_id: i32)`. Besides persisting
//! roots, the page doubles as the guard latch serializing root changes:
//! every tree operation latches it first.

use ferrite_common::page::{PageId, PAGE_SIZE};
use ferrite_common::{FerriteError, Result};

/// Maximum index name length in bytes.
pub const HEADER_NAME_SIZE: usize = 32;

const RECORD_SIZE: usize = HEADER_NAME_SIZE + 4;
const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

/// Maximum number of index records the header page can hold.
pub const HEADER_RECORD_CAPACITY: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

#[inline]
fn record_offset(index: usize) -> usize {
    RECORDS_OFFSET + index * RECORD_SIZE
}

fn padded_name(name: &str) -> Result<[u8; HEADER_NAME_SIZE]> {
    let bytes = name.as_bytes();
    if bytes.len() > HEADER_NAME_SIZE {
        return Err(FerriteError::ConfigError(format!(
            "index name '{}' exceeds {} bytes",
            name, HEADER_NAME_SIZE
        )));
    }
    let mut buf = [0u8; HEADER_NAME_SIZE];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

/// Read-only view over the header page.
pub struct HeaderPage<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPage<'a> {
    /// Wraps header page bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of records.
    pub fn record_count(&self) -> usize {
        i32::from_le_bytes([
            self.data[RECORD_COUNT_OFFSET],
            self.data[RECORD_COUNT_OFFSET + 1],
            self.data[RECORD_COUNT_OFFSET + 2],
            self.data[RECORD_COUNT_OFFSET + 3],
        ]) as usize
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let offset = record_offset(index);
        &self.data[offset..offset + HEADER_NAME_SIZE]
    }

    fn root_at(&self, index: usize) -> PageId {
        let offset = record_offset(index) + HEADER_NAME_SIZE;
        PageId(i32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]))
    }

    fn find(&self, name: &[u8; HEADER_NAME_SIZE]) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.name_at(i) == name)
    }

    /// Looks up the root page id registered under the given name.
    pub fn lookup(&self, name: &str) -> Result<Option<PageId>> {
        let name = padded_name(name)?;
        Ok(self.find(&name).map(|i| self.root_at(i)))
    }
}

/// Mutable view over the header page.
pub struct HeaderPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPageMut<'a> {
    /// Wraps header page bytes.
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    /// Formats the bytes as an empty header page.
    pub fn init(data: &'a mut [u8]) -> Self {
        data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4].copy_from_slice(&0i32.to_le_bytes());
        Self { data }
    }

    /// Read-only view of the same bytes.
    pub fn as_ref(&self) -> HeaderPage<'_> {
        HeaderPage { data: self.data }
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&(count as i32).to_le_bytes());
    }

    fn write_record(&mut self, index: usize, name: &[u8; HEADER_NAME_SIZE], root: PageId) {
        let offset = record_offset(index);
        self.data[offset..offset + HEADER_NAME_SIZE].copy_from_slice(name);
        self.data[offset + HEADER_NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root.to_bytes());
    }

    /// Inserts a new record. Fails if the name is already registered or the
    /// page is full.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> Result<()> {
        let padded = padded_name(name)?;
        let count = self.as_ref().record_count();
        if self.as_ref().find(&padded).is_some() {
            return Err(FerriteError::ConfigError(format!(
                "index '{}' already registered",
                name
            )));
        }
        if count >= HEADER_RECORD_CAPACITY {
            return Err(FerriteError::HeaderPageFull);
        }
        self.write_record(count, &padded, root);
        self.set_record_count(count + 1);
        Ok(())
    }

    /// Updates an existing record. Returns false if the name is unknown.
    pub fn update_record(&mut self, name: &str, root: PageId) -> Result<bool> {
        let padded = padded_name(name)?;
        match self.as_ref().find(&padded) {
            Some(index) => {
                self.write_record(index, &padded, root);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Inserts or updates the record for the given name.
    pub fn set_record(&mut self, name: &str, root: PageId) -> Result<()> {
        if self.update_record(name, root)? {
            return Ok(());
        }
        self.insert_record(name, root)
    }
}
