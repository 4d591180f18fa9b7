//! Owner-checked doubly linked set over an [`Arena`].
//!
//! Every entry records which set owns it; mutation verifies owner
//! identity and rejects entries linked elsewhere. This backs every
//! waiting-set and pending-job collection in the kernel, so add/remove
//! stay O(1) and allocation-free on the hot path.

use crate::arena::{Arena, LinkError, NodeKey};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SET_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one linked set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetId(u64);

impl SetId {
    fn next() -> Self {
        Self(NEXT_SET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "set#{}", self.0)
    }
}

/// Ordered set of arena nodes, linked oldest-first
pub struct LinkedSet {
    id: SetId,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl LinkedSet {
    /// Create an empty set with a fresh identity
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SetId::next(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// This set's identity
    #[must_use]
    pub const fn id(&self) -> SetId {
        self.id
    }

    /// Number of linked entries
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check whether the set holds no entries
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Key of the oldest entry, if any
    pub fn first<T>(&self, arena: &Arena<T>) -> Option<NodeKey> {
        let index = self.head?;
        let node = &arena.nodes[index as usize];
        Some(NodeKey {
            index,
            generation: node.generation,
        })
    }

    /// Link an entry at the tail
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::AlreadyLinked`] when the entry is owned by any
    /// set (this one included) and [`LinkError::StaleKey`] for a dead key.
    pub fn add_entry<T>(&mut self, arena: &mut Arena<T>, key: NodeKey) -> Result<(), LinkError> {
        arena.check(key)?;
        if let Some(owner) = arena.nodes[key.index as usize].owner {
            return Err(LinkError::AlreadyLinked { owner });
        }

        let index = key.index;
        {
            let node = &mut arena.nodes[index as usize];
            node.owner = Some(self.id);
            node.prev = self.tail;
            node.next = None;
        }
        match self.tail {
            Some(tail) => arena.nodes[tail as usize].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        Ok(())
    }

    /// Unlink an entry owned by this set
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ForeignOwner`] when another set owns the
    /// entry, [`LinkError::NotLinked`] when no set does, and
    /// [`LinkError::StaleKey`] for a dead key.
    pub fn remove_entry<T>(&mut self, arena: &mut Arena<T>, key: NodeKey) -> Result<(), LinkError> {
        arena.check(key)?;
        match arena.nodes[key.index as usize].owner {
            Some(owner) if owner == self.id => {}
            Some(owner) => {
                return Err(LinkError::ForeignOwner {
                    owner,
                    expected: self.id,
                });
            }
            None => return Err(LinkError::NotLinked),
        }

        self.unlink(arena, key.index);
        Ok(())
    }

    /// Detach the whole chain, returning the entry keys oldest-first
    pub fn purge_entries<T>(&mut self, arena: &mut Arena<T>) -> Vec<NodeKey> {
        let mut purged = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let node = &mut arena.nodes[index as usize];
            cursor = node.next;
            node.owner = None;
            node.prev = None;
            node.next = None;
            purged.push(NodeKey {
                index,
                generation: node.generation,
            });
        }
        self.head = None;
        self.tail = None;
        self.len = 0;
        purged
    }

    /// Non-destructive snapshot walk, oldest-first
    ///
    /// The view is built lazily as the iterator advances; the set itself
    /// is untouched.
    pub fn copy_entries<'a, T>(&self, arena: &'a Arena<T>) -> CopiedEntries<'a, T> {
        CopiedEntries {
            arena,
            cursor: self.head,
        }
    }

    fn unlink<T>(&mut self, arena: &mut Arena<T>, index: u32) {
        let (prev, next) = {
            let node = &mut arena.nodes[index as usize];
            let links = (node.prev, node.next);
            node.owner = None;
            node.prev = None;
            node.next = None;
            links
        };

        match prev {
            Some(prev) => arena.nodes[prev as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => arena.nodes[next as usize].prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }
}

impl Default for LinkedSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy oldest-first walk produced by [`LinkedSet::copy_entries`]
pub struct CopiedEntries<'a, T> {
    arena: &'a Arena<T>,
    cursor: Option<u32>,
}

impl<'a, T> Iterator for CopiedEntries<'a, T> {
    type Item = (NodeKey, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = &self.arena.nodes[index as usize];
        self.cursor = node.next;
        let key = NodeKey {
            index,
            generation: node.generation,
        };
        node.value.as_ref().map(|value| (key, value))
    }
}
