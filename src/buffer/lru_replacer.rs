use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::common::FrameId;

struct LruState {
    /// Unpin order: most recent at the front, victim taken from the back
    queue: VecDeque<FrameId>,
    /// Membership mirror of the queue
    present: HashSet<FrameId>,
}

/// Strict-LRU victim selector over the frames that are currently evictable
/// (pin count 0). Ordering is by unpin time; re-unpinning a frame that is
/// already tracked does not move it.
pub struct LruReplacer {
    /// Capacity bound; equals the buffer pool size
    capacity: usize,
    state: Mutex<LruState>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LruState {
                queue: VecDeque::with_capacity(capacity),
                present: HashSet::with_capacity(capacity),
            }),
        }
    }

    /// Removes and returns the least recently unpinned frame, if any.
    pub fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let frame_id = state.queue.pop_back()?;
        state.present.remove(&frame_id);
        Some(frame_id)
    }

    /// Removes a frame from the eviction set because it became referenced.
    /// No-op if the frame is not tracked.
    pub fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if state.present.remove(&frame_id) {
            state.queue.retain(|&f| f != frame_id);
        }
    }

    /// Marks a frame evictable, inserting it at the most-recent end. No-op if
    /// the frame is already tracked or the replacer is at capacity.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if state.present.contains(&frame_id) {
            return;
        }
        if state.queue.len() >= self.capacity {
            return;
        }
        state.queue.push_front(frame_id);
        state.present.insert(frame_id);
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_empty() {
        let replacer = LruReplacer::new(4);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_victim_order() {
        let replacer = LruReplacer::new(8);

        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));
        replacer.unpin(FrameId::new(3));
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(3)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_reunpin_does_not_move() {
        let replacer = LruReplacer::new(8);

        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));
        // 1 is already tracked, its position is unchanged
        replacer.unpin(FrameId::new(1));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_lru_replacer_pin_removes() {
        let replacer = LruReplacer::new(8);

        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));
        replacer.unpin(FrameId::new(3));

        replacer.pin(FrameId::new(2));
        // pinning an untracked frame is a no-op
        replacer.pin(FrameId::new(9));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(3)));
    }

    #[test]
    fn test_lru_replacer_capacity_bound() {
        let replacer = LruReplacer::new(2);

        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));
        replacer.unpin(FrameId::new(3));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), None);
    }
}
