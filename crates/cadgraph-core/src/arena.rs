#![forbid(unsafe_code)]

//! Generational arena backing the node tree.
//!
//! The arena is the sole owner of every node. Links between nodes are
//! plain [`NodeId`] values, so structural mutation is index rewiring and a
//! history record can hold ids without keeping anything alive.
//!
//! A freed slot bumps its generation before it is reused, which makes a
//! stale id detectable: `get` on an id whose node was disposed returns
//! `None` forever after.

use std::fmt;
use std::ops::{Index, IndexMut};

/// Handle to a node stored in a document's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index inside the arena.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was handed out.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Slot in a generational arena. Either occupied with data and its
/// generation, or free with the generation to use when the slot is reused.
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Free { next_generation: u32 },
}

/// Arena of values addressed by [`NodeId`].
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match slot {
                Slot::Free { next_generation } => *next_generation,
                Slot::Occupied { .. } => unreachable!("free list points to occupied slot"),
            };
            *slot = Slot::Occupied { generation, value };
            return NodeId { index, generation };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == id.generation => {
                let next = Slot::Free {
                    next_generation: id.generation.wrapping_add(1),
                };
                let Slot::Occupied { value, .. } = std::mem::replace(slot, next) else {
                    return None;
                };
                self.free_list.push(id.index);
                self.len -= 1;
                Some(value)
            }
            _ => None,
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&T> {
        match self.slots.get(id.index as usize)? {
            Slot::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize)? {
            Slot::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn ids(&self) -> Vec<NodeId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, .. } => Some(NodeId {
                    index: index as u32,
                    generation: *generation,
                }),
                Slot::Free { .. } => None,
            })
            .collect()
    }
}

impl<T> Index<NodeId> for Arena<T> {
    type Output = T;

    fn index(&self, id: NodeId) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("stale node id {id:?}"),
        }
    }
}

impl<T> IndexMut<NodeId> for Arena<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut T {
        match self.get_mut(id) {
            Some(value) => value,
            None => panic!("stale node id {id:?}"),
        }
    }
}
