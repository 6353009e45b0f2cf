//! A small bidirectional `u32 <-> u32` map, used by
//! [`crate::single_session::SingleSessionTransport`] to correlate a
//! client-assigned speech id with the service-assigned id the multiplexed
//! single session actually queues — spec.md §4.6 item 4 calls for this
//! explicitly and notes the pack carries no `bimap` crate, so it's
//! implemented directly rather than reached for as a dependency.

use std::collections::HashMap;

/// Keys are unique in each direction; inserting a pair already present
/// under either key first removes the stale pairing, the way a map keyed
/// on one side naturally would if you maintained both sides by hand.
#[derive(Debug, Default)]
pub struct BiMap {
    forward: HashMap<u32, u32>,
    backward: HashMap<u32, u32>,
}

impl BiMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, left: u32, right: u32) {
        if let Some(old_right) = self.forward.remove(&left) {
            self.backward.remove(&old_right);
        }
        if let Some(old_left) = self.backward.remove(&right) {
            self.forward.remove(&old_left);
        }
        self.forward.insert(left, right);
        self.backward.insert(right, left);
    }

    pub fn get_right(&self, left: u32) -> Option<u32> {
        self.forward.get(&left).copied()
    }

    pub fn get_left(&self, right: u32) -> Option<u32> {
        self.backward.get(&right).copied()
    }

    pub fn remove_left(&mut self, left: u32) {
        if let Some(right) = self.forward.remove(&left) {
            self.backward.remove(&right);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_both_directions() {
        let mut map = BiMap::new();
        map.insert(1, 100);
        assert_eq!(map.get_right(1), Some(100));
        assert_eq!(map.get_left(100), Some(1));
    }

    #[test]
    fn reinserting_a_key_drops_the_stale_pairing() {
        let mut map = BiMap::new();
        map.insert(1, 100);
        map.insert(1, 200);
        assert_eq!(map.get_right(1), Some(200));
        assert_eq!(map.get_left(100), None);
        assert_eq!(map.get_left(200), Some(1));
    }

    #[test]
    fn remove_left_clears_both_sides() {
        let mut map = BiMap::new();
        map.insert(1, 100);
        map.remove_left(1);
        assert_eq!(map.get_right(1), None);
        assert_eq!(map.get_left(100), None);
    }
}
