use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use crate::common::types::FrameId;

/// LRU (Least Recently Used) page replacement policy.
///
/// Holds the set of evictable frames in unpin order: the frame unpinned
/// longest ago is the next victim. All operations are O(1) via a linked
/// hash map (hash lookup + intrusive recency list).
pub struct LruReplacer {
    lru_list: Mutex<LinkedHashMap<FrameId, ()>>,
}

impl LruReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            lru_list: Mutex::new(LinkedHashMap::with_capacity(pool_size)),
        }
    }

    /// Remove and return the least recently unpinned frame, if any.
    pub fn victim(&self) -> Option<FrameId> {
        self.lru_list.lock().pop_front().map(|(frame_id, ())| frame_id)
    }

    /// A pinned frame is no longer evictable; remove it if present.
    pub fn pin(&self, frame_id: FrameId) {
        self.lru_list.lock().remove(&frame_id);
    }

    /// An unpinned frame becomes evictable. No-op if already present; the
    /// frame keeps its original position in that case.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut list = self.lru_list.lock();
        if !list.contains_key(&frame_id) {
            list.insert(frame_id, ());
        }
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.lru_list.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_order_is_unpin_order() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);

        assert_eq!(replacer.size(), 3);
        assert_eq!(replacer.victim(), Some(0));
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_removes_frame() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.pin(0);

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_double_unpin_keeps_position() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(0);

        assert_eq!(replacer.victim(), Some(0));
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_pin_absent_frame_is_noop() {
        let replacer = LruReplacer::new(4);
        replacer.pin(3);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }
}
