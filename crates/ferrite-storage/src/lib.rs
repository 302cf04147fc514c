//! Storage engine index layer for FerriteDB.
//!
//! This crate provides:
//! - A disk-resident B+ tree with unique integer keys and record id values
//! - Latch crabbing for fine-grained concurrent access
//! - On-page layouts for leaf, internal, and header pages
//! - A range iterator over the leaf sibling chain
//! - Bulk loaders reading keys from plain text files

mod btree;

pub use btree::header::{HeaderPage, HeaderPageMut, HEADER_NAME_SIZE, HEADER_RECORD_CAPACITY};
pub use btree::iterator::IndexIterator;
pub use btree::page::{
    InternalPage, InternalPageMut, LeafPage, LeafPageMut, INTERNAL_CAPACITY, LEAF_CAPACITY,
};
pub use btree::transaction::{PageGuard, Transaction};
pub use btree::tree::{BPlusTree, BPlusTreeConfig};
