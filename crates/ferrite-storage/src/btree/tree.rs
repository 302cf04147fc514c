//! Concurrent B+ tree over the buffer pool.

use crate::btree::header::{HeaderPage, HeaderPageMut};
use crate::btree::iterator::IndexIterator;
use crate::btree::page::{
    self, InternalPage, InternalPageMut, LeafPage, LeafPageMut, INTERNAL_CAPACITY, LEAF_CAPACITY,
    PAGE_TYPE_INTERNAL, PAGE_TYPE_LEAF,
};
use crate::btree::transaction::{PageGuard, Transaction};
use ferrite_buffer::{BufferFrame, BufferPool, PageWriteGuard};
use ferrite_common::page::PageId;
use ferrite_common::types::RecordId;
use ferrite_common::{FerriteError, Result};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Latching intent of a descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    Read,
    Insert,
    Delete,
}

/// Where a latch-free descent should land.
#[derive(Debug, Clone, Copy)]
enum SeekTarget {
    Leftmost,
    Key(i64),
    Rightmost,
}

/// Fan-out configuration for a B+ tree.
#[derive(Debug, Clone)]
pub struct BPlusTreeConfig {
    /// Maximum entries per leaf page.
    pub leaf_max_size: usize,
    /// Maximum entries per internal page. Must stay below the physical
    /// capacity: an internal page transiently holds one extra entry before
    /// it splits.
    pub internal_max_size: usize,
}

impl Default for BPlusTreeConfig {
    fn default() -> Self {
        Self {
            leaf_max_size: LEAF_CAPACITY,
            internal_max_size: INTERNAL_CAPACITY - 1,
        }
    }
}

fn internal_err(msg: &str) -> FerriteError {
    FerriteError::Internal(msg.to_string())
}

/// Borrows the exclusively latched page data at a page set index.
fn write_guard_data(txn: &mut Transaction, index: usize) -> Result<&mut [u8]> {
    txn.page_set_mut()[index]
        .data_mut()
        .ok_or_else(|| internal_err("expected an exclusive latch in the page set"))
}

/// Disk-resident B+ tree index with unique i64 keys and record id values.
///
/// Concurrency uses latch crabbing over the buffer pool's page latches. The
/// reserved header page is latched first by every operation (shared for
/// reads, exclusive for writes), serializing root changes; the root id
/// cached here is only read or written under that latch and mirrored into
/// the header page's record for this index.
pub struct BPlusTree {
    /// Name registered in the header page.
    index_name: String,
    /// Page cache backing the tree.
    pool: Arc<BufferPool>,
    /// Cached root page id, INVALID when the tree is empty.
    root_page_id: AtomicI32,
    /// Maximum entries per leaf page.
    leaf_max_size: usize,
    /// Maximum entries per internal page.
    internal_max_size: usize,
}

impl BPlusTree {
    /// Opens or creates the index named `index_name`.
    ///
    /// A fresh data file gets its header page here; an existing file has its
    /// root looked up from the header records, so the tree survives restarts
    /// given the pool was flushed.
    pub fn new(
        index_name: impl Into<String>,
        pool: Arc<BufferPool>,
        config: BPlusTreeConfig,
    ) -> Result<Self> {
        let index_name = index_name.into();
        if config.leaf_max_size < 2 || config.leaf_max_size > LEAF_CAPACITY {
            return Err(FerriteError::ConfigError(format!(
                "leaf_max_size must be in 2..={}, got {}",
                LEAF_CAPACITY, config.leaf_max_size
            )));
        }
        if config.internal_max_size < 3 || config.internal_max_size >= INTERNAL_CAPACITY {
            return Err(FerriteError::ConfigError(format!(
                "internal_max_size must be in 3..{}, got {}",
                INTERNAL_CAPACITY, config.internal_max_size
            )));
        }

        let root = Self::ensure_header(&index_name, &pool)?;
        Ok(Self {
            index_name,
            pool,
            root_page_id: AtomicI32::new(root.0),
            leaf_max_size: config.leaf_max_size,
            internal_max_size: config.internal_max_size,
        })
    }

    fn ensure_header(index_name: &str, pool: &Arc<BufferPool>) -> Result<PageId> {
        match pool.fetch_page_read(PageId::HEADER) {
            Ok(guard) => {
                let root = HeaderPage::new(guard.data()).lookup(index_name)?;
                Ok(root.unwrap_or(PageId::INVALID))
            }
            Err(FerriteError::PageNotFound { .. }) => {
                let (page_id, frame) = pool.new_page()?;
                if page_id != PageId::HEADER {
                    return Err(internal_err("data file is missing its header page"));
                }
                {
                    let mut data = frame.write_data();
                    HeaderPageMut::init(&mut data[..]);
                }
                pool.unpin_page(page_id, true);
                Ok(PageId::INVALID)
            }
            Err(e) => Err(e),
        }
    }

    /// The name this index is registered under.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// The buffer pool backing this tree.
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Current root page id, INVALID when empty.
    pub fn root_page_id(&self) -> PageId {
        PageId(self.root_page_id.load(Ordering::Acquire))
    }

    /// Returns true if the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        !self.root_page_id().is_valid()
    }

    /// Maximum entries per leaf page.
    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    /// Maximum entries per internal page.
    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    // =========================================================================
    // Point lookup
    // =========================================================================

    /// Looks up the record stored under `key`.
    pub fn get_value(&self, key: i64, txn: &mut Transaction) -> Result<Option<RecordId>> {
        let result = self.get_value_inner(key, txn);
        let sweep = self.release_and_unpin(txn);
        let value = result?;
        sweep?;
        Ok(value)
    }

    fn get_value_inner(&self, key: i64, txn: &mut Transaction) -> Result<Option<RecordId>> {
        let guard = self.pool.fetch_page_read(PageId::HEADER)?;
        txn.add_to_page_set(PageGuard::Read(guard));
        if self.is_empty() {
            return Ok(None);
        }

        self.find_leaf(key, AccessMode::Read, txn)?;
        let leaf_guard = txn
            .page_set()
            .last()
            .ok_or_else(|| internal_err("empty page set after descent"))?;
        Ok(LeafPage::new(leaf_guard.data()).lookup(key))
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Inserts a unique key. Returns false if the key is already present.
    pub fn insert(&self, key: i64, value: RecordId, txn: &mut Transaction) -> Result<bool> {
        let result = self.insert_inner(key, value, txn);
        let sweep = self.release_and_unpin(txn);
        let inserted = result?;
        sweep?;
        Ok(inserted)
    }

    fn insert_inner(&self, key: i64, value: RecordId, txn: &mut Transaction) -> Result<bool> {
        let guard = self.pool.fetch_page_write(PageId::HEADER)?;
        txn.add_to_page_set(PageGuard::Write(guard));
        if self.is_empty() {
            self.start_new_tree(key, value, txn)?;
            return Ok(true);
        }

        self.find_leaf(key, AccessMode::Insert, txn)?;
        let leaf_idx = txn.page_set().len() - 1;

        let needs_split = {
            let data = write_guard_data(txn, leaf_idx)?;
            let mut leaf = LeafPageMut::new(data);
            if leaf.as_ref().lookup(key).is_some() {
                return Ok(false);
            }
            let new_size = leaf.insert(key, value);
            new_size == leaf.as_ref().max_size()
        };

        if needs_split {
            self.split_leaf(leaf_idx, txn)?;
        }
        Ok(true)
    }

    fn start_new_tree(&self, key: i64, value: RecordId, txn: &mut Transaction) -> Result<()> {
        let (page_id, frame) = self.pool.new_page()?;
        {
            let mut data = frame.write_data();
            let mut leaf =
                LeafPageMut::init(&mut data[..], page_id, PageId::INVALID, self.leaf_max_size);
            leaf.insert(key, value);
        }
        self.pool.unpin_page(page_id, true);
        self.set_root(page_id, txn)?;
        tracing::debug!("started new tree '{}' at root {}", self.index_name, page_id);
        Ok(())
    }

    fn split_leaf(&self, leaf_idx: usize, txn: &mut Transaction) -> Result<()> {
        let (new_page_id, frame) = self.pool.new_page()?;

        let (leaf_page_id, separator) = {
            let data = write_guard_data(txn, leaf_idx)?;
            let mut leaf = LeafPageMut::new(data);
            let mut new_data = frame.write_data();
            let mut sibling = LeafPageMut::init(
                &mut new_data[..],
                new_page_id,
                leaf.as_ref().parent_page_id(),
                self.leaf_max_size,
            );
            leaf.move_half_to(&mut sibling);
            sibling.set_next_page_id(leaf.as_ref().next_page_id());
            leaf.set_next_page_id(new_page_id);
            (leaf.as_ref().page_id(), sibling.as_ref().key_at(0))
        };
        tracing::debug!("leaf {} split, new sibling {}", leaf_page_id, new_page_id);

        let result = self.insert_into_parent(leaf_idx, separator, new_page_id, &frame, txn);
        self.pool.unpin_page(new_page_id, true);
        result
    }

    /// Links a freshly split-off sibling into the tree: `key` becomes the
    /// separator between the page at `child_idx` and `new_page_id`.
    ///
    /// The new sibling is pinned but never latched while this runs; it is
    /// unreachable until linked because every ancestor up to the deepest
    /// insert-safe node is still exclusively latched by this operation.
    fn insert_into_parent(
        &self,
        child_idx: usize,
        key: i64,
        new_page_id: PageId,
        new_frame: &Arc<BufferFrame>,
        txn: &mut Transaction,
    ) -> Result<()> {
        let (child_page_id, child_parent) = {
            let data = txn.page_set()[child_idx].data();
            (page::page_id_of(data), page::page_parent_of(data))
        };

        if !child_parent.is_valid() {
            // The old root split: grow the tree by one level
            let (root_page_id, root_frame) = self.pool.new_page()?;
            {
                let mut data = root_frame.write_data();
                let mut root = InternalPageMut::init(
                    &mut data[..],
                    root_page_id,
                    PageId::INVALID,
                    self.internal_max_size,
                );
                root.populate_new_root(child_page_id, key, new_page_id);
            }
            self.pool.unpin_page(root_page_id, true);

            {
                let data = write_guard_data(txn, child_idx)?;
                page::set_page_parent(data, root_page_id);
            }
            {
                let mut data = new_frame.write_data();
                page::set_page_parent(&mut data[..], root_page_id);
            }
            self.set_root(root_page_id, txn)?;
            tracing::debug!("root split, new root {}", root_page_id);
            return Ok(());
        }

        if child_idx == 0 {
            return Err(internal_err("split propagated past the page set"));
        }
        let parent_idx = child_idx - 1;
        if txn.page_set()[parent_idx].page_id() != child_parent {
            return Err(FerriteError::PageCorrupted {
                page_id: child_parent.0,
                reason: "parent latch missing during split".to_string(),
            });
        }

        let new_size = {
            let data = write_guard_data(txn, parent_idx)?;
            let mut parent = InternalPageMut::new(data);
            parent
                .insert_node_after(child_page_id, key, new_page_id)
                .ok_or_else(|| FerriteError::PageCorrupted {
                    page_id: child_parent.0,
                    reason: "child entry missing from parent".to_string(),
                })?
        };

        // Internal pages split only once strictly above max_size
        if new_size > self.internal_max_size {
            self.split_internal(parent_idx, txn)?;
        }
        Ok(())
    }

    fn split_internal(&self, node_idx: usize, txn: &mut Transaction) -> Result<()> {
        let (new_page_id, frame) = self.pool.new_page()?;

        let (node_page_id, separator, moved_children) = {
            let data = write_guard_data(txn, node_idx)?;
            let mut node = InternalPageMut::new(data);
            let mut new_data = frame.write_data();
            let mut sibling = InternalPageMut::init(
                &mut new_data[..],
                new_page_id,
                node.as_ref().parent_page_id(),
                self.internal_max_size,
            );
            let moved = node.move_half_to(&mut sibling);
            (node.as_ref().page_id(), sibling.as_ref().key_at(0), moved)
        };
        self.set_parent_links(&moved_children, new_page_id, txn)?;
        tracing::debug!(
            "internal {} split, new sibling {}",
            node_page_id,
            new_page_id
        );

        let result = self.insert_into_parent(node_idx, separator, new_page_id, &frame, txn);
        self.pool.unpin_page(new_page_id, true);
        result
    }

    /// Rewrites the parent pointer of each child.
    ///
    /// A child this operation already holds latched must be updated through
    /// its own guard; re-latching it would self-deadlock. Everything else is
    /// briefly fetched and written directly, which is safe because those
    /// pages are unreachable while this operation latches their ancestors.
    fn set_parent_links(
        &self,
        children: &[PageId],
        parent: PageId,
        txn: &mut Transaction,
    ) -> Result<()> {
        for &child in children {
            let mut on_path = false;
            for guard in txn.page_set_mut().iter_mut() {
                if guard.page_id() == child {
                    let data = guard
                        .data_mut()
                        .ok_or_else(|| internal_err("expected exclusive latch on path page"))?;
                    page::set_page_parent(data, parent);
                    on_path = true;
                    break;
                }
            }
            if on_path {
                continue;
            }

            let frame = self.pool.fetch_page(child)?;
            {
                let mut data = frame.write_data();
                page::set_page_parent(&mut data[..], parent);
            }
            self.pool.unpin_page(child, true);
        }
        Ok(())
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Removes `key` if present.
    pub fn remove(&self, key: i64, txn: &mut Transaction) -> Result<()> {
        let result = self.remove_inner(key, txn);
        let sweep = self.release_and_unpin(txn);
        result?;
        sweep
    }

    fn remove_inner(&self, key: i64, txn: &mut Transaction) -> Result<()> {
        let guard = self.pool.fetch_page_write(PageId::HEADER)?;
        txn.add_to_page_set(PageGuard::Write(guard));
        if self.is_empty() {
            return Ok(());
        }

        self.find_leaf(key, AccessMode::Delete, txn)?;
        let leaf_idx = txn.page_set().len() - 1;

        let (removed, underflow) = {
            let data = write_guard_data(txn, leaf_idx)?;
            let mut leaf = LeafPageMut::new(data);
            let removed = leaf.remove(key);
            let view = leaf.as_ref();
            (removed, view.size() < view.min_size())
        };

        if !removed {
            return Ok(());
        }
        if underflow {
            self.coalesce_or_redistribute(leaf_idx, txn)?;
        }
        Ok(())
    }

    /// Restores the size invariant of an underfull node: merge with a
    /// sibling when the combined entries fit, otherwise borrow one entry.
    /// Siblings are latched with the parent still exclusively held, left
    /// before right.
    fn coalesce_or_redistribute(&self, node_idx: usize, txn: &mut Transaction) -> Result<()> {
        let node_parent = page::page_parent_of(txn.page_set()[node_idx].data());
        if !node_parent.is_valid() {
            return self.adjust_root(node_idx, txn);
        }

        if node_idx == 0 {
            return Err(internal_err("rebalance propagated past the page set"));
        }
        let parent_idx = node_idx - 1;
        if txn.page_set()[parent_idx].page_id() != node_parent {
            return Err(FerriteError::PageCorrupted {
                page_id: node_parent.0,
                reason: "parent latch missing during rebalance".to_string(),
            });
        }

        let node_page_id = txn.page_set()[node_idx].page_id();
        let (node_size, node_max) = {
            let data = txn.page_set()[node_idx].data();
            (page::page_size_of(data), page::page_max_size_of(data))
        };
        let (index, parent_size) = {
            let parent = InternalPage::new(txn.page_set()[parent_idx].data());
            let index =
                parent
                    .value_index(node_page_id)
                    .ok_or_else(|| FerriteError::PageCorrupted {
                        page_id: node_parent.0,
                        reason: "node missing from its parent".to_string(),
                    })?;
            (index, parent.size())
        };

        // Merge into the left sibling when everything fits
        if index > 0 {
            let left_id =
                InternalPage::new(txn.page_set()[parent_idx].data()).value_at(index - 1);
            let left_guard = self.pool.fetch_page_write(left_id)?;
            if node_size + page::page_size_of(left_guard.data()) < node_max {
                self.merge_into_left(parent_idx, node_idx, left_guard, index, txn)?;
                return self.rebalance_parent_after_merge(parent_idx, txn);
            }
        }

        // Or pull the right sibling into this node
        if index + 1 < parent_size {
            let right_id =
                InternalPage::new(txn.page_set()[parent_idx].data()).value_at(index + 1);
            let right_guard = self.pool.fetch_page_write(right_id)?;
            if node_size + page::page_size_of(right_guard.data()) < node_max {
                self.merge_from_right(parent_idx, node_idx, right_guard, index + 1, txn)?;
                return self.rebalance_parent_after_merge(parent_idx, txn);
            }
        }

        // No merge fits: borrow a single entry from a sibling
        if index > 0 {
            let left_id =
                InternalPage::new(txn.page_set()[parent_idx].data()).value_at(index - 1);
            let left_guard = self.pool.fetch_page_write(left_id)?;
            self.redistribute_from_left(parent_idx, node_idx, left_guard, index, txn)
        } else {
            let right_id = InternalPage::new(txn.page_set()[parent_idx].data()).value_at(1);
            let right_guard = self.pool.fetch_page_write(right_id)?;
            self.redistribute_from_right(parent_idx, node_idx, right_guard, index, txn)
        }
    }

    fn rebalance_parent_after_merge(&self, parent_idx: usize, txn: &mut Transaction) -> Result<()> {
        let (is_root, size, min_size) = {
            let data = txn.page_set()[parent_idx].data();
            (
                !page::page_parent_of(data).is_valid(),
                page::page_size_of(data),
                page::page_min_size_of(data),
            )
        };
        let needs_rebalance = if is_root { size == 1 } else { size < min_size };
        if needs_rebalance {
            self.coalesce_or_redistribute(parent_idx, txn)?;
        }
        Ok(())
    }

    /// Merges the node at `node_idx` into its left sibling and drops the
    /// parent's separator at `separator_index`. The emptied node is queued
    /// for deletion.
    fn merge_into_left(
        &self,
        parent_idx: usize,
        node_idx: usize,
        mut left_guard: PageWriteGuard,
        separator_index: usize,
        txn: &mut Transaction,
    ) -> Result<()> {
        let left_page_id = left_guard.page_id();
        let node_page_id = txn.page_set()[node_idx].page_id();
        let middle_key =
            InternalPage::new(txn.page_set()[parent_idx].data()).key_at(separator_index);

        let moved_children = {
            let node_data = write_guard_data(txn, node_idx)?;
            if page::page_is_leaf(node_data) {
                let mut node = LeafPageMut::new(node_data);
                let mut left = LeafPageMut::new(left_guard.data_mut());
                let next = node.as_ref().next_page_id();
                node.move_all_to(&mut left);
                left.set_next_page_id(next);
                Vec::new()
            } else {
                let mut node = InternalPageMut::new(node_data);
                let mut left = InternalPageMut::new(left_guard.data_mut());
                node.move_all_to(&mut left, middle_key)
            }
        };
        self.set_parent_links(&moved_children, left_page_id, txn)?;

        {
            let parent_data = write_guard_data(txn, parent_idx)?;
            InternalPageMut::new(parent_data).remove(separator_index);
        }
        txn.add_to_deleted_set(node_page_id);
        tracing::debug!(
            "page {} coalesced into left sibling {}",
            node_page_id,
            left_page_id
        );
        Ok(())
    }

    /// Merges the right sibling into the node at `node_idx` and drops the
    /// parent's separator at `separator_index`. The emptied sibling is
    /// queued for deletion.
    fn merge_from_right(
        &self,
        parent_idx: usize,
        node_idx: usize,
        mut right_guard: PageWriteGuard,
        separator_index: usize,
        txn: &mut Transaction,
    ) -> Result<()> {
        let right_page_id = right_guard.page_id();
        let node_page_id = txn.page_set()[node_idx].page_id();
        let middle_key =
            InternalPage::new(txn.page_set()[parent_idx].data()).key_at(separator_index);

        let moved_children = {
            let node_data = write_guard_data(txn, node_idx)?;
            if page::page_is_leaf(node_data) {
                let mut right = LeafPageMut::new(right_guard.data_mut());
                let mut node = LeafPageMut::new(node_data);
                let next = right.as_ref().next_page_id();
                right.move_all_to(&mut node);
                node.set_next_page_id(next);
                Vec::new()
            } else {
                let mut right = InternalPageMut::new(right_guard.data_mut());
                let mut node = InternalPageMut::new(node_data);
                right.move_all_to(&mut node, middle_key)
            }
        };
        self.set_parent_links(&moved_children, node_page_id, txn)?;

        {
            let parent_data = write_guard_data(txn, parent_idx)?;
            InternalPageMut::new(parent_data).remove(separator_index);
        }
        txn.add_to_deleted_set(right_page_id);
        tracing::debug!(
            "right sibling {} coalesced into page {}",
            right_page_id,
            node_page_id
        );
        Ok(())
    }

    /// Moves the left sibling's last entry to the front of the node and
    /// refreshes the parent's separator.
    fn redistribute_from_left(
        &self,
        parent_idx: usize,
        node_idx: usize,
        mut left_guard: PageWriteGuard,
        index: usize,
        txn: &mut Transaction,
    ) -> Result<()> {
        let node_page_id = txn.page_set()[node_idx].page_id();
        let left_page_id = left_guard.page_id();

        if page::page_is_leaf(left_guard.data()) {
            let separator = {
                let left = LeafPage::new(left_guard.data());
                left.key_at(left.size() - 1)
            };
            {
                let node_data = write_guard_data(txn, node_idx)?;
                let mut node = LeafPageMut::new(node_data);
                let mut left = LeafPageMut::new(left_guard.data_mut());
                left.move_last_to_front_of(&mut node);
            }
            let parent_data = write_guard_data(txn, parent_idx)?;
            InternalPageMut::new(parent_data).set_key_at(index, separator);
        } else {
            let middle_key =
                InternalPage::new(txn.page_set()[parent_idx].data()).key_at(index);
            let separator = {
                let left = InternalPage::new(left_guard.data());
                left.key_at(left.size() - 1)
            };
            let moved_child = {
                let node_data = write_guard_data(txn, node_idx)?;
                let mut node = InternalPageMut::new(node_data);
                // The old sentinel slot becomes a real entry under the
                // parent's separator as it shifts right
                node.set_key_at(0, middle_key);
                let mut left = InternalPageMut::new(left_guard.data_mut());
                left.move_last_to_front_of(&mut node)
            };
            {
                let parent_data = write_guard_data(txn, parent_idx)?;
                InternalPageMut::new(parent_data).set_key_at(index, separator);
            }
            self.set_parent_links(&[moved_child], node_page_id, txn)?;
        }
        tracing::debug!(
            "page {} borrowed an entry from left sibling {}",
            node_page_id,
            left_page_id
        );
        Ok(())
    }

    /// Moves the right sibling's first entry to the end of the node and
    /// refreshes the parent's separator.
    fn redistribute_from_right(
        &self,
        parent_idx: usize,
        node_idx: usize,
        mut right_guard: PageWriteGuard,
        index: usize,
        txn: &mut Transaction,
    ) -> Result<()> {
        let node_page_id = txn.page_set()[node_idx].page_id();
        let right_page_id = right_guard.page_id();
        let separator_index = index + 1;

        if page::page_is_leaf(right_guard.data()) {
            // The sibling's second key becomes its first after the move
            let new_separator = LeafPage::new(right_guard.data()).key_at(1);
            {
                let node_data = write_guard_data(txn, node_idx)?;
                let mut node = LeafPageMut::new(node_data);
                let mut right = LeafPageMut::new(right_guard.data_mut());
                right.move_first_to_end_of(&mut node);
            }
            let parent_data = write_guard_data(txn, parent_idx)?;
            InternalPageMut::new(parent_data).set_key_at(separator_index, new_separator);
        } else {
            let middle_key =
                InternalPage::new(txn.page_set()[parent_idx].data()).key_at(separator_index);
            let (moved_child, new_separator) = {
                let node_data = write_guard_data(txn, node_idx)?;
                let mut node = InternalPageMut::new(node_data);
                let mut right = InternalPageMut::new(right_guard.data_mut());
                // The sibling's sentinel entry travels under the parent's
                // separator key
                right.set_key_at(0, middle_key);
                let new_separator = right.as_ref().key_at(1);
                let moved = right.move_first_to_end_of(&mut node);
                (moved, new_separator)
            };
            {
                let parent_data = write_guard_data(txn, parent_idx)?;
                InternalPageMut::new(parent_data).set_key_at(separator_index, new_separator);
            }
            self.set_parent_links(&[moved_child], node_page_id, txn)?;
        }
        tracing::debug!(
            "page {} borrowed an entry from right sibling {}",
            node_page_id,
            right_page_id
        );
        Ok(())
    }

    /// Shrinks the tree at the top: an emptied leaf root unroots the tree, an
    /// internal root left with one child hands the root to that child.
    fn adjust_root(&self, root_idx: usize, txn: &mut Transaction) -> Result<()> {
        let (is_leaf, size, root_page_id) = {
            let data = txn.page_set()[root_idx].data();
            (
                page::page_is_leaf(data),
                page::page_size_of(data),
                page::page_id_of(data),
            )
        };

        if is_leaf && size == 0 {
            self.set_root(PageId::INVALID, txn)?;
            txn.add_to_deleted_set(root_page_id);
            tracing::debug!("last key removed, tree '{}' is empty", self.index_name);
        } else if !is_leaf && size == 1 {
            let child = {
                let data = write_guard_data(txn, root_idx)?;
                InternalPageMut::new(data).remove_and_return_only_child()
            };
            self.set_parent_links(&[child], PageId::INVALID, txn)?;
            self.set_root(child, txn)?;
            txn.add_to_deleted_set(root_page_id);
            tracing::debug!("root {} collapsed into {}", root_page_id, child);
        }
        Ok(())
    }

    // =========================================================================
    // Descent and release
    // =========================================================================

    /// Descends to the leaf responsible for `key`, crabbing latches per the
    /// access mode. Ancestors (header page included) are released as soon as
    /// the newly latched child is safe; the leaf's latch is kept either way.
    /// Every latch taken ends up in the transaction's page set, leaf last.
    fn find_leaf(&self, key: i64, mode: AccessMode, txn: &mut Transaction) -> Result<()> {
        let mut page_id = self.root_page_id();
        loop {
            let guard = match mode {
                AccessMode::Read => PageGuard::Read(self.pool.fetch_page_read(page_id)?),
                AccessMode::Insert | AccessMode::Delete => {
                    PageGuard::Write(self.pool.fetch_page_write(page_id)?)
                }
            };

            let (is_leaf, next, release_ancestors) = {
                let data = guard.data();
                let page_type = page::page_type_of(data);
                if page_type != PAGE_TYPE_LEAF && page_type != PAGE_TYPE_INTERNAL {
                    return Err(FerriteError::PageCorrupted {
                        page_id: page_id.0,
                        reason: format!("unknown page type {}", page_type),
                    });
                }
                let is_leaf = page_type == PAGE_TYPE_LEAF;
                let next = if is_leaf {
                    PageId::INVALID
                } else {
                    InternalPage::new(data).lookup(key)
                };
                let release = match mode {
                    AccessMode::Read => true,
                    AccessMode::Insert | AccessMode::Delete => self.is_safe(data, mode),
                };
                (is_leaf, next, release)
            };

            if release_ancestors {
                txn.release_page_set();
            }
            txn.add_to_page_set(guard);
            if is_leaf {
                return Ok(());
            }
            page_id = next;
        }
    }

    /// A node is safe when the pending operation cannot propagate a
    /// structural change to its parent.
    fn is_safe(&self, data: &[u8], mode: AccessMode) -> bool {
        let size = page::page_size_of(data);
        match mode {
            AccessMode::Read => true,
            // Account for the post-insert split trigger at size == max_size
            AccessMode::Insert => size + 1 < page::page_max_size_of(data),
            AccessMode::Delete => {
                if !page::page_parent_of(data).is_valid() {
                    // The root is exempt from the minimum but must stay
                    // latched (header included) whenever this delete could
                    // unroot it or collapse it into its only child
                    if page::page_is_leaf(data) {
                        size > 1
                    } else {
                        size > 2
                    }
                } else {
                    size > page::page_min_size_of(data)
                }
            }
        }
    }

    /// End-of-operation sweep: releases every latch in acquisition order
    /// (unpinning with dirtiness per latch kind), then returns merged-away
    /// pages to the buffer pool.
    fn release_and_unpin(&self, txn: &mut Transaction) -> Result<()> {
        txn.release_page_set();

        let mut first_err = None;
        for page_id in txn.take_deleted_set() {
            // A false return means someone still pins the page (an open
            // iterator); it simply stays resident.
            if let Err(e) = self.pool.delete_page(page_id) {
                tracing::warn!("failed to remove page {}: {}", page_id, e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Cursor positioned at the smallest key.
    pub fn iter(&self) -> Result<IndexIterator> {
        let frame = self.find_leaf_frame(SeekTarget::Leftmost)?;
        Ok(IndexIterator::new(Arc::clone(&self.pool), frame, 0))
    }

    /// Cursor positioned at the first entry with key >= `key`.
    pub fn iter_from(&self, key: i64) -> Result<IndexIterator> {
        let frame = self.find_leaf_frame(SeekTarget::Key(key))?;
        let index = match &frame {
            Some(frame) => {
                let data = frame.read_data();
                LeafPage::new(&data[..]).key_index(key)
            }
            None => 0,
        };
        Ok(IndexIterator::new(Arc::clone(&self.pool), frame, index))
    }

    /// Cursor positioned one past the largest key; `is_end()` holds.
    pub fn iter_end(&self) -> Result<IndexIterator> {
        let frame = self.find_leaf_frame(SeekTarget::Rightmost)?;
        let index = match &frame {
            Some(frame) => {
                let data = frame.read_data();
                LeafPage::new(&data[..]).size()
            }
            None => 0,
        };
        Ok(IndexIterator::new(Arc::clone(&self.pool), frame, index))
    }

    /// Latch-free descent used by iterators: the returned leaf is pinned but
    /// not latched.
    fn find_leaf_frame(&self, target: SeekTarget) -> Result<Option<Arc<BufferFrame>>> {
        let root = {
            let _guard = self.pool.fetch_page_read(PageId::HEADER)?;
            self.root_page_id()
        };
        if !root.is_valid() {
            return Ok(None);
        }

        let mut frame = self.pool.fetch_page(root)?;
        loop {
            let next = {
                let data = frame.read_data();
                if page::page_is_leaf(&data[..]) {
                    None
                } else {
                    let node = InternalPage::new(&data[..]);
                    Some(match target {
                        SeekTarget::Leftmost => node.value_at(0),
                        SeekTarget::Key(key) => node.lookup(key),
                        SeekTarget::Rightmost => node.value_at(node.size() - 1),
                    })
                }
            };
            let Some(next) = next else {
                return Ok(Some(frame));
            };
            let next_frame = match self.pool.fetch_page(next) {
                Ok(next_frame) => next_frame,
                Err(e) => {
                    self.pool.unpin_page(frame.page_id(), false);
                    return Err(e);
                }
            };
            self.pool.unpin_page(frame.page_id(), false);
            frame = next_frame;
        }
    }

    // =========================================================================
    // Bulk loaders
    // =========================================================================

    /// Inserts one integer key per line from a text file. The record id is
    /// derived from the key.
    pub fn insert_from_file(&self, path: impl AsRef<Path>, txn: &mut Transaction) -> Result<()> {
        let contents = std::fs::read_to_string(path)?;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let key: i64 = line
                .parse()
                .map_err(|_| FerriteError::ParseError(format!("invalid key: '{}'", line)))?;
            let record = RecordId::new(PageId(key as i32), key as u32);
            self.insert(key, record, txn)?;
        }
        Ok(())
    }

    /// Removes one integer key per line from a text file.
    pub fn remove_from_file(&self, path: impl AsRef<Path>, txn: &mut Transaction) -> Result<()> {
        let contents = std::fs::read_to_string(path)?;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let key: i64 = line
                .parse()
                .map_err(|_| FerriteError::ParseError(format!("invalid key: '{}'", line)))?;
            self.remove(key, txn)?;
        }
        Ok(())
    }

    /// Mirrors a root change into the cached id and the header record. The
    /// caller holds the header page's exclusive latch as the first element
    /// of the page set.
    fn set_root(&self, new_root: PageId, txn: &mut Transaction) -> Result<()> {
        let guard = txn
            .page_set_mut()
            .first_mut()
            .ok_or_else(|| internal_err("page set missing the header guard"))?;
        if guard.page_id() != PageId::HEADER {
            return Err(internal_err("root change without the header guard held"));
        }
        let data = guard
            .data_mut()
            .ok_or_else(|| internal_err("header guard is not exclusive"))?;
        HeaderPageMut::new(data).set_record(&self.index_name, new_root)?;
        self.root_page_id.store(new_root.0, Ordering::Release);
        Ok(())
    }
}
