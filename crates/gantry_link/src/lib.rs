//! GANTRY Linked Set
//!
//! Allocation-conscious ordered container used for every per-scope
//! collection of pending work or waiting entities in the kernel. Entries
//! carry their own links and a back-reference to their owning set;
//! mutation fails fast on ownership misuse instead of corrupting the
//! chain.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod set;

pub use arena::{Arena, LinkError, NodeKey};
pub use set::{CopiedEntries, LinkedSet, SetId};

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Arbitrary interleavings of add/remove never corrupt the chain:
        /// the snapshot length always matches the tracked length, and
        /// every misuse is rejected with an error.
        #[test]
        fn linked_set_stays_consistent(ops in proptest::collection::vec(0usize..8, 1..64)) {
            let mut arena: Arena<usize> = Arena::new();
            let mut set = LinkedSet::new();
            let mut keys: Vec<NodeKey> = Vec::new();
            let mut linked: Vec<bool> = Vec::new();

            for (step, op) in ops.into_iter().enumerate() {
                match op {
                    0..=2 => {
                        let key = arena.alloc(step);
                        set.add_entry(&mut arena, key).unwrap();
                        keys.push(key);
                        linked.push(true);
                    }
                    3..=4 => {
                        if let Some(pos) = linked.iter().position(|&l| l) {
                            set.remove_entry(&mut arena, keys[pos]).unwrap();
                            linked[pos] = false;
                        }
                    }
                    5 => {
                        // Double-add must fail and leave the length alone
                        if let Some(pos) = linked.iter().position(|&l| l) {
                            let before = set.len();
                            prop_assert!(set.add_entry(&mut arena, keys[pos]).is_err());
                            prop_assert_eq!(set.len(), before);
                        }
                    }
                    6 => {
                        // Foreign remove must fail and leave the length alone
                        if let Some(pos) = linked.iter().position(|&l| l) {
                            let mut stranger = LinkedSet::new();
                            let before = set.len();
                            prop_assert!(stranger.remove_entry(&mut arena, keys[pos]).is_err());
                            prop_assert_eq!(set.len(), before);
                        }
                    }
                    _ => {
                        // Remove of an unlinked entry must fail
                        if let Some(pos) = linked.iter().position(|&l| !l) {
                            prop_assert!(set.remove_entry(&mut arena, keys[pos]).is_err());
                        }
                    }
                }

                let snapshot = set.copy_entries(&arena).count();
                prop_assert_eq!(snapshot, set.len());
                prop_assert_eq!(set.len(), linked.iter().filter(|&&l| l).count());
            }
        }
    }
}
