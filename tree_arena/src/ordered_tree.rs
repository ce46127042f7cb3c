// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use hashbrown::HashMap;

use crate::NodeId;

/// The structural links of a single node.
///
/// All links are ids into the same [`TreeArena`]. A node without a parent is a root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Links {
    /// The parent of the node.
    pub parent: Option<NodeId>,
    /// The first child of the node, in child order.
    pub first_child: Option<NodeId>,
    /// The last child of the node, in child order.
    pub last_child: Option<NodeId>,
    /// The sibling immediately before this node.
    pub previous_sibling: Option<NodeId>,
    /// The sibling immediately after this node.
    pub next_sibling: Option<NodeId>,
}

#[derive(Debug)]
struct Slot<T> {
    item: T,
    links: Links,
}

/// A container type for a forest of ordered trees.
///
/// This type is used to store zero, one or many trees of a given item type. It
/// keeps track of parent-child relationships and of the order of siblings, and lets
/// you find an item anywhere in the hierarchy in O(1).
///
/// Unlike a nested-map tree, any two nodes can be reached independently, which makes
/// cross-tree lookups (e.g. "what is the item of my clip ancestor") cheap.
#[derive(Debug)]
pub struct TreeArena<T> {
    slots: HashMap<NodeId, Slot<T>>,
    roots: Vec<NodeId>,
}

impl<T> Default for TreeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

// --- MARK: QUERIES
impl<T> TreeArena<T> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Returns the number of items in the arena.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the arena holds no item.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns `true` if the arena holds an item with the given id.
    pub fn contains(&self, id: impl Into<NodeId>) -> bool {
        self.slots.contains_key(&id.into())
    }

    /// Returns a shared reference to the item with the given id.
    pub fn get(&self, id: impl Into<NodeId>) -> Option<&T> {
        self.slots.get(&id.into()).map(|slot| &slot.item)
    }

    /// Returns a mutable reference to the item with the given id.
    pub fn get_mut(&mut self, id: impl Into<NodeId>) -> Option<&mut T> {
        self.slots.get_mut(&id.into()).map(|slot| &mut slot.item)
    }

    /// Returns the structural links of the item with the given id.
    pub fn links(&self, id: impl Into<NodeId>) -> Option<Links> {
        self.slots.get(&id.into()).map(|slot| slot.links)
    }

    /// The parent of the given item, if any.
    pub fn parent_of(&self, id: impl Into<NodeId>) -> Option<NodeId> {
        self.links(id)?.parent
    }

    /// The first child of the given item, if any.
    pub fn first_child(&self, id: impl Into<NodeId>) -> Option<NodeId> {
        self.links(id)?.first_child
    }

    /// The last child of the given item, if any.
    pub fn last_child(&self, id: impl Into<NodeId>) -> Option<NodeId> {
        self.links(id)?.last_child
    }

    /// The sibling after the given item, if any.
    pub fn next_sibling(&self, id: impl Into<NodeId>) -> Option<NodeId> {
        self.links(id)?.next_sibling
    }

    /// The sibling before the given item, if any.
    pub fn previous_sibling(&self, id: impl Into<NodeId>) -> Option<NodeId> {
        self.links(id)?.previous_sibling
    }

    /// Ids of every root, in insertion order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Iterates over the children of the given item, in order.
    ///
    /// Yields nothing if the id isn't in the arena.
    pub fn children(&self, id: impl Into<NodeId>) -> Children<'_, T> {
        let id = id.into();
        Children {
            arena: self,
            next: self.first_child(id),
        }
    }

    /// Iterates over the ancestors of the given item, from its parent up to its root.
    pub fn ancestors(&self, id: impl Into<NodeId>) -> Ancestors<'_, T> {
        let id = id.into();
        Ancestors {
            arena: self,
            next: self.parent_of(id),
        }
    }

    /// Iterates over the strict descendants of the given item, in pre-order.
    pub fn descendants(&self, id: impl Into<NodeId>) -> Descendants<'_, T> {
        let id = id.into();
        Descendants {
            arena: self,
            root: id,
            next: self.first_child(id),
        }
    }

    /// Returns `true` if `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor_of(&self, ancestor: impl Into<NodeId>, id: impl Into<NodeId>) -> bool {
        let ancestor = ancestor.into();
        self.ancestors(id).any(|candidate| candidate == ancestor)
    }

    /// Construct the path of items from the given item to the root of its tree.
    ///
    /// The path is in order from the bottom to the top, starting at the given item and ending at
    /// the root.
    ///
    /// If the id is not in the tree, returns an empty vector.
    pub fn get_id_path(&self, id: impl Into<NodeId>) -> Vec<NodeId> {
        let id = id.into();
        if !self.contains(id) {
            return Vec::new();
        }
        let mut path = vec![id];
        path.extend(self.ancestors(id));
        path
    }

    #[track_caller]
    fn slot_mut(&mut self, id: NodeId) -> &mut Slot<T> {
        self.slots
            .get_mut(&id)
            .unwrap_or_else(|| panic!("Node {id} not found in arena"))
    }
}

// --- MARK: MUTATION
impl<T> TreeArena<T> {
    /// Insert a new root with the given id.
    ///
    /// # Panics
    ///
    /// If the arena already contains an item with the given id.
    #[track_caller]
    pub fn insert_root(&mut self, id: impl Into<NodeId>, item: T) {
        let id = id.into();
        assert!(!self.slots.contains_key(&id), "Key already present");
        self.slots.insert(
            id,
            Slot {
                item,
                links: Links::default(),
            },
        );
        self.roots.push(id);
    }

    /// Insert a new item as a child of `parent`, before `before` (or last if `None`).
    ///
    /// # Panics
    ///
    /// If the arena already contains an item with the given id, if `parent` is missing,
    /// or if `before` is not a child of `parent`.
    #[track_caller]
    pub fn insert_child(
        &mut self,
        parent: impl Into<NodeId>,
        before: Option<NodeId>,
        id: impl Into<NodeId>,
        item: T,
    ) {
        let id = id.into();
        self.insert_root(id, item);
        self.attach(id, parent, before);
    }

    /// Link a root into the tree as a child of `parent`, before `before` (or last if `None`).
    ///
    /// # Panics
    ///
    /// If `id` isn't a root, if `parent` is missing or is `id` or one of its descendants,
    /// or if `before` is not a child of `parent`.
    #[track_caller]
    pub fn attach(
        &mut self,
        id: impl Into<NodeId>,
        parent: impl Into<NodeId>,
        before: Option<NodeId>,
    ) {
        let id = id.into();
        let parent = parent.into();
        assert!(self.contains(parent), "Parent {parent} not found in arena");
        assert!(
            self.parent_of(id).is_none() && self.contains(id),
            "Node {id} must be a detached root to be attached"
        );
        assert!(
            parent != id && !self.is_ancestor_of(id, parent),
            "Cannot attach node {id} under its own subtree"
        );
        if let Some(before) = before {
            assert_eq!(
                self.parent_of(before),
                Some(parent),
                "Node {before} is not a child of {parent}"
            );
        }
        self.roots.retain(|root| *root != id);

        let previous = match before {
            Some(before) => self.previous_sibling(before),
            None => self.last_child(parent),
        };
        {
            let links = &mut self.slot_mut(id).links;
            links.parent = Some(parent);
            links.previous_sibling = previous;
            links.next_sibling = before;
        }
        match previous {
            Some(previous) => self.slot_mut(previous).links.next_sibling = Some(id),
            None => self.slot_mut(parent).links.first_child = Some(id),
        }
        match before {
            Some(before) => self.slot_mut(before).links.previous_sibling = Some(id),
            None => self.slot_mut(parent).links.last_child = Some(id),
        }
    }

    /// Unlink an item (and its subtree) from its parent, turning it into a root.
    ///
    /// Does nothing if the item is already a root or isn't in the arena.
    pub fn detach(&mut self, id: impl Into<NodeId>) {
        let id = id.into();
        let Some(links) = self.links(id) else {
            return;
        };
        let Some(parent) = links.parent else {
            return;
        };
        match links.previous_sibling {
            Some(previous) => self.slot_mut(previous).links.next_sibling = links.next_sibling,
            None => self.slot_mut(parent).links.first_child = links.next_sibling,
        }
        match links.next_sibling {
            Some(next) => self.slot_mut(next).links.previous_sibling = links.previous_sibling,
            None => self.slot_mut(parent).links.last_child = links.previous_sibling,
        }
        let links = &mut self.slot_mut(id).links;
        links.parent = None;
        links.previous_sibling = None;
        links.next_sibling = None;
        self.roots.push(id);
    }

    /// Remove a single item, splicing its children into its former position.
    ///
    /// If the item was a root, its children become roots.
    ///
    /// Returns the removed item, or `None` if the id isn't in the arena.
    #[must_use]
    pub fn remove(&mut self, id: impl Into<NodeId>) -> Option<T> {
        let id = id.into();
        let links = self.links(id)?;
        let children: Vec<NodeId> = self.children(id).collect();
        for child in &children {
            self.detach(*child);
        }
        if let Some(parent) = links.parent {
            let before = links.next_sibling;
            self.detach(id);
            for child in children {
                self.attach(child, parent, before);
            }
        }
        self.roots.retain(|root| *root != id);
        self.slots.remove(&id).map(|slot| slot.item)
    }

    /// Remove an item and all of its descendants.
    ///
    /// Returns the removed items in pre-order, starting with the given item.
    #[must_use]
    pub fn remove_subtree(&mut self, id: impl Into<NodeId>) -> Vec<(NodeId, T)> {
        let id = id.into();
        if !self.contains(id) {
            return Vec::new();
        }
        self.detach(id);
        let mut ids = vec![id];
        ids.extend(self.descendants(id));
        self.roots.retain(|root| *root != id);
        ids.into_iter()
            .filter_map(|id| self.slots.remove(&id).map(|slot| (id, slot.item)))
            .collect()
    }
}

// --- MARK: ITERATORS

/// Iterator over the children of a node. See [`TreeArena::children`].
#[derive(Debug)]
pub struct Children<'arena, T> {
    arena: &'arena TreeArena<T>,
    next: Option<NodeId>,
}

impl<T> Iterator for Children<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.arena.next_sibling(current);
        Some(current)
    }
}

/// Iterator over the ancestors of a node. See [`TreeArena::ancestors`].
#[derive(Debug)]
pub struct Ancestors<'arena, T> {
    arena: &'arena TreeArena<T>,
    next: Option<NodeId>,
}

impl<T> Iterator for Ancestors<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.arena.parent_of(current);
        Some(current)
    }
}

/// Pre-order iterator over the descendants of a node. See [`TreeArena::descendants`].
#[derive(Debug)]
pub struct Descendants<'arena, T> {
    arena: &'arena TreeArena<T>,
    root: NodeId,
    next: Option<NodeId>,
}

impl<T> Iterator for Descendants<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        // Pre-order successor within the subtree rooted at `self.root`.
        self.next = self.arena.first_child(current).or_else(|| {
            let mut node = current;
            loop {
                if node == self.root {
                    return None;
                }
                if let Some(next) = self.arena.next_sibling(node) {
                    return Some(next);
                }
                node = self.arena.parent_of(node)?;
            }
        });
        Some(current)
    }
}
