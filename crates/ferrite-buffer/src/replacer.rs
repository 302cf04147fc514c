//! Page replacement policy for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;

/// Sentinel link value for the intrusive list.
const NIL: u32 = u32::MAX;

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Removes and returns the least recently unpinned frame, or None if no
    /// frame is evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Removes a frame from the replacer. Idempotent if absent.
    fn pin(&self, frame_id: FrameId);

    /// Inserts a frame at the most-recently-unpinned position. Idempotent if
    /// already present.
    fn unpin(&self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// LRU replacement policy.
///
/// Evictable frames form a doubly linked list threaded through dense arrays
/// indexed by frame id, giving O(1) victim selection, insertion, and removal.
/// Front = most recently unpinned, back = least recently unpinned (the
/// eviction victim).
pub struct LruReplacer {
    inner: Mutex<LruInner>,
}

struct LruInner {
    /// Link to the next (older) list element per frame.
    next: Vec<u32>,
    /// Link to the previous (newer) list element per frame.
    prev: Vec<u32>,
    /// Whether the frame is currently in the list.
    present: Vec<bool>,
    /// Most recently unpinned frame.
    head: u32,
    /// Least recently unpinned frame.
    tail: u32,
    /// Number of frames in the list.
    len: usize,
}

impl LruReplacer {
    /// Creates a new LRU replacer for the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                next: vec![NIL; num_frames],
                prev: vec![NIL; num_frames],
                present: vec![false; num_frames],
                head: NIL,
                tail: NIL,
                len: 0,
            }),
        }
    }

    /// Returns the total frame capacity.
    pub fn capacity(&self) -> usize {
        self.inner.lock().present.len()
    }
}

impl LruInner {
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.prev[idx], self.next[idx]);
        if prev != NIL {
            self.next[prev as usize] = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.prev[next as usize] = prev;
        } else {
            self.tail = prev;
        }
        self.prev[idx] = NIL;
        self.next[idx] = NIL;
        self.present[idx] = false;
        self.len -= 1;
    }

    fn push_front(&mut self, idx: usize) {
        self.prev[idx] = NIL;
        self.next[idx] = self.head;
        if self.head != NIL {
            self.prev[self.head as usize] = idx as u32;
        }
        self.head = idx as u32;
        if self.tail == NIL {
            self.tail = idx as u32;
        }
        self.present[idx] = true;
        self.len += 1;
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.tail == NIL {
            return None;
        }
        let idx = inner.tail as usize;
        inner.unlink(idx);
        Some(FrameId(idx as u32))
    }

    fn pin(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        let mut inner = self.inner.lock();
        if idx >= inner.present.len() || !inner.present[idx] {
            return;
        }
        inner.unlink(idx);
    }

    fn unpin(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        let mut inner = self.inner.lock();
        if idx >= inner.present.len() || inner.present[idx] {
            return;
        }
        inner.push_front(idx);
    }

    fn size(&self) -> usize {
        self.inner.lock().len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_new() {
        let replacer = LruReplacer::new(10);
        assert_eq!(replacer.capacity(), 10);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_replacer_victim_empty() {
        let replacer = LruReplacer::new(10);
        assert!(replacer.victim().is_none());
    }

    #[test]
    fn test_lru_replacer_victim_single() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId(5));
        assert_eq!(replacer.size(), 1);

        assert_eq!(replacer.victim(), Some(FrameId(5)));
        assert_eq!(replacer.size(), 0);
        assert!(replacer.victim().is_none());
    }

    #[test]
    fn test_lru_replacer_victim_order() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId(1));
        replacer.unpin(FrameId(2));
        replacer.unpin(FrameId(3));

        // Victims come in unpin order, oldest first
        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), Some(FrameId(2)));
        assert_eq!(replacer.victim(), Some(FrameId(3)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_pin_removes() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId(1));
        replacer.unpin(FrameId(2));
        assert_eq!(replacer.size(), 2);

        replacer.pin(FrameId(1));
        assert_eq!(replacer.size(), 1);

        assert_eq!(replacer.victim(), Some(FrameId(2)));
    }

    #[test]
    fn test_lru_replacer_pin_absent_is_noop() {
        let replacer = LruReplacer::new(10);

        replacer.pin(FrameId(3));
        assert_eq!(replacer.size(), 0);

        replacer.unpin(FrameId(1));
        replacer.pin(FrameId(3));
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_lru_replacer_unpin_idempotent() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId(1));
        replacer.unpin(FrameId(1));
        assert_eq!(replacer.size(), 1);

        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_out_of_bounds() {
        let replacer = LruReplacer::new(5);

        replacer.unpin(FrameId(100));
        replacer.pin(FrameId(100));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_replacer_reinsertion_order() {
        // Pool of 7 frames: unpin 1..=6, re-pin then re-unpin 1 and 4.
        // Victims come "earliest un-re-pinned first, then re-unpinned in
        // their re-insertion order".
        let replacer = LruReplacer::new(7);

        for i in 1..=6 {
            replacer.unpin(FrameId(i));
        }
        replacer.pin(FrameId(1));
        replacer.pin(FrameId(4));
        replacer.unpin(FrameId(1));
        replacer.unpin(FrameId(4));

        assert_eq!(replacer.victim(), Some(FrameId(2)));
        assert_eq!(replacer.victim(), Some(FrameId(3)));
        assert_eq!(replacer.victim(), Some(FrameId(5)));
        assert_eq!(replacer.victim(), Some(FrameId(6)));
        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), Some(FrameId(4)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_pin_middle() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId(1));
        replacer.unpin(FrameId(2));
        replacer.unpin(FrameId(3));

        // Remove the middle element, links must stay intact
        replacer.pin(FrameId(2));

        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), Some(FrameId(3)));
        assert_eq!(replacer.victim(), None);
    }
}
