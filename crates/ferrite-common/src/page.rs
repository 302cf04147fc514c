//! Page identifiers and size constants for FerriteDB storage.

use serde::{Deserialize, Serialize};

/// Page size in bytes (4 KB). All disk I/O and caching happens in units of
/// this size.
pub const PAGE_SIZE: usize = 4096;

/// Sentinel page id meaning "no page".
pub const INVALID_PAGE_ID: PageId = PageId(-1);

/// The reserved page holding the index name to root page id records. It also
/// serves as the guard page serializing root changes.
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Unique identifier for a page within the data file.
///
/// Page ids are assigned monotonically by the disk manager and stored as
/// 4-byte little-endian integers in on-disk structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub i32);

impl PageId {
    /// Invalid page id sentinel.
    pub const INVALID: PageId = INVALID_PAGE_ID;

    /// The reserved header page id.
    pub const HEADER: PageId = HEADER_PAGE_ID;

    /// Returns true if this is a valid page id.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }

    /// Serializes the page id to its on-disk form.
    #[inline]
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Deserializes a page id from its on-disk form.
    #[inline]
    pub fn from_bytes(buf: [u8; 4]) -> Self {
        Self(i32::from_le_bytes(buf))
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_constant() {
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_page_id_validity() {
        assert!(PageId(0).is_valid());
        assert!(PageId(123).is_valid());
        assert!(!PageId::INVALID.is_valid());
        assert!(!PageId(-7).is_valid());
    }

    #[test]
    fn test_header_page_id() {
        assert_eq!(HEADER_PAGE_ID, PageId(0));
        assert!(HEADER_PAGE_ID.is_valid());
    }

    #[test]
    fn test_page_id_bytes_roundtrip() {
        for id in [PageId(0), PageId(1), PageId(i32::MAX), PageId::INVALID] {
            assert_eq!(PageId::from_bytes(id.to_bytes()), id);
        }
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId(5).to_string(), "5");
        assert_eq!(PageId::INVALID.to_string(), "-1");
    }

    #[test]
    fn test_page_id_ordering() {
        assert!(PageId(1) < PageId(2));
        assert!(PageId::INVALID < PageId(0));
    }

    #[test]
    fn test_page_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(PageId(1));
        set.insert(PageId(2));
        set.insert(PageId(1));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_page_id_serde_roundtrip() {
        let original = PageId(500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: PageId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
