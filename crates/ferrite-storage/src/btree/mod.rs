//! Disk-resident B+ tree index.
//!
//! Pages are fixed 4 KB blocks cached by the buffer pool. Every tree page
//! starts with a common 24-byte header (page type, lsn, size, max size,
//! parent, own id); leaves append a sibling pointer and a sorted array of
//! `(key, record id)` entries, internal nodes a sorted array of
//! `(key, child)` entries whose first key is unused.
//!
//! Concurrency follows latch crabbing: operations latch the reserved header
//! page first (shared for reads, exclusive for writes), then descend
//! acquiring child latches before releasing ancestors. Writers release
//! ancestors as soon as the current node cannot propagate a structural
//! change. Latches live in the operation's [`Transaction`] page set and are
//! released in acquisition order by a single sweep at the end, after which
//! pages emptied by merges are returned to the buffer pool.
//!
//! [`Transaction`]: transaction::Transaction

pub mod header;
pub mod iterator;
pub mod page;
pub mod transaction;
pub mod tree;
