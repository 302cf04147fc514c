//! Shared value types for FerriteDB.

use crate::page::PageId;
use serde::{Deserialize, Serialize};

/// Identifier of a record in a table: the page holding it plus its slot
/// number within that page.
///
/// Record ids are the values stored in index leaves. They are opaque to the
/// index itself and serialize to a fixed 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Page holding the record.
    pub page_id: PageId,
    /// Slot number within the page.
    pub slot_num: u32,
}

impl RecordId {
    /// Size of a record id on disk.
    pub const SIZE: usize = 8;

    /// Creates a new record id.
    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }

    /// Serializes to the on-disk form.
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.page_id.to_bytes());
        buf[4..8].copy_from_slice(&self.slot_num.to_le_bytes());
        buf
    }

    /// Deserializes from the on-disk form.
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            page_id: PageId::from_bytes([buf[0], buf[1], buf[2], buf[3]]),
            slot_num: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id, self.slot_num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_new() {
        let rid = RecordId::new(PageId(3), 7);
        assert_eq!(rid.page_id, PageId(3));
        assert_eq!(rid.slot_num, 7);
    }

    #[test]
    fn test_record_id_roundtrip() {
        let rid = RecordId::new(PageId(1000), 42);
        assert_eq!(RecordId::from_bytes(&rid.to_bytes()), rid);
    }

    #[test]
    fn test_record_id_roundtrip_edge_cases() {
        for rid in [
            RecordId::new(PageId(0), 0),
            RecordId::new(PageId(i32::MAX), u32::MAX),
            RecordId::new(PageId::INVALID, 1),
        ] {
            assert_eq!(RecordId::from_bytes(&rid.to_bytes()), rid);
        }
    }

    #[test]
    fn test_record_id_size() {
        let rid = RecordId::new(PageId(1), 2);
        assert_eq!(rid.to_bytes().len(), RecordId::SIZE);
    }

    #[test]
    fn test_record_id_display() {
        let rid = RecordId::new(PageId(5), 123);
        assert_eq!(rid.to_string(), "5:123");
    }

    #[test]
    fn test_record_id_serde_roundtrip() {
        let original = RecordId::new(PageId(10), 500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: RecordId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
