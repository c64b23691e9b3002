#![forbid(unsafe_code)]

//! Structural operations on the node tree.
//!
//! Children of a container form a doubly linked list threaded through the
//! arena: `first_child`/`last_child` on the container, `previous`/`next` on
//! each child. Every operation is O(1) in the number of siblings except the
//! ancestry checks, which walk up to the root.
//!
//! # Invariants
//!
//! 1. `count` equals the number of nodes reachable from `first_child` by
//!    following `next`, and following `previous` from `last_child` visits
//!    them in reverse.
//! 2. `first_child.previous` and `last_child.next` are `None`; `count == 0`
//!    exactly when both ends are `None`.
//! 3. A node never becomes its own ancestor.
//!
//! # Failure Modes
//!
//! - Ownership or position violations (not a child, already parented,
//!   cycle) are logged with `warn!` and skipped: no mutation, no record.
//! - A stale id or a leaf where a container is required is an `Err`.

use tracing::warn;

use crate::arena::{Arena, NodeId};
use crate::document::{Document, NodeSlot};
use crate::error::DocumentError;
use crate::node::{NodeAction, NodeRecord};

// ============================================================================
// Raw list surgery
// ============================================================================

/// Append `item` as the last child of `parent`.
pub(crate) fn link_last(nodes: &mut Arena<NodeSlot>, parent: NodeId, item: NodeId) {
    let last = nodes[parent].last_child;
    {
        let slot = &mut nodes[item];
        slot.parent = Some(parent);
        slot.previous = last;
        slot.next = None;
    }
    match last {
        Some(last) => nodes[last].next = Some(item),
        None => nodes[parent].first_child = Some(item),
    }
    let p = &mut nodes[parent];
    p.last_child = Some(item);
    p.count += 1;
}

/// Insert `item` as the first child of `parent`.
pub(crate) fn link_first(nodes: &mut Arena<NodeSlot>, parent: NodeId, item: NodeId) {
    let first = nodes[parent].first_child;
    {
        let slot = &mut nodes[item];
        slot.parent = Some(parent);
        slot.previous = None;
        slot.next = first;
    }
    match first {
        Some(first) => nodes[first].previous = Some(item),
        None => nodes[parent].last_child = Some(item),
    }
    let p = &mut nodes[parent];
    p.first_child = Some(item);
    p.count += 1;
}

/// Insert `item` right after `previous`, a child of `parent`.
pub(crate) fn link_after(nodes: &mut Arena<NodeSlot>, parent: NodeId, previous: NodeId, item: NodeId) {
    let Some(next) = nodes[previous].next else {
        link_last(nodes, parent, item);
        return;
    };
    {
        let slot = &mut nodes[item];
        slot.parent = Some(parent);
        slot.previous = Some(previous);
        slot.next = Some(next);
    }
    nodes[previous].next = Some(item);
    nodes[next].previous = Some(item);
    nodes[parent].count += 1;
}

/// Splice `item` out of its parent's child list. The node keeps no links.
pub(crate) fn unlink(nodes: &mut Arena<NodeSlot>, item: NodeId) {
    let (parent, previous, next) = {
        let slot = &nodes[item];
        (slot.parent, slot.previous, slot.next)
    };
    let Some(parent) = parent else {
        return;
    };

    let first = nodes[parent].first_child;
    let last = nodes[parent].last_child;
    if first == Some(item) {
        // also covers the only-child case
        nodes[parent].first_child = next;
        match next {
            Some(next) => nodes[next].previous = None,
            None => nodes[parent].last_child = None,
        }
    } else if last == Some(item) {
        nodes[parent].last_child = previous;
        if let Some(previous) = previous {
            nodes[previous].next = None;
        }
    } else {
        if let Some(previous) = previous {
            nodes[previous].next = next;
        }
        if let Some(next) = next {
            nodes[next].previous = previous;
        }
    }

    let p = &mut nodes[parent];
    p.count = p.count.saturating_sub(1);
    let slot = &mut nodes[item];
    slot.parent = None;
    slot.previous = None;
    slot.next = None;
}

fn is_ancestor(nodes: &Arena<NodeSlot>, candidate: NodeId, of: NodeId) -> bool {
    let mut cursor = Some(of);
    while let Some(node) = cursor {
        if node == candidate {
            return true;
        }
        cursor = nodes.get(node).and_then(|s| s.parent);
    }
    false
}

fn display_name(nodes: &Arena<NodeSlot>, id: NodeId) -> String {
    nodes
        .get(id)
        .and_then(|s| s.props.get_or(crate::node::keys::NAME, Default::default).as_str().map(str::to_owned))
        .unwrap_or_else(|| id.to_string())
}

/// Why `item` cannot be attached under `parent`, if it cannot.
fn attach_violation(nodes: &Arena<NodeSlot>, parent: NodeId, item: NodeId) -> Option<String> {
    let Some(slot) = nodes.get(item) else {
        return Some(format!("node {item} does not exist"));
    };
    if let Some(current) = slot.parent {
        return Some(format!(
            "{} is already a child node of the {} node",
            display_name(nodes, item),
            display_name(nodes, current)
        ));
    }
    if is_ancestor(nodes, item, parent) {
        return Some(format!(
            "{} can not be added to itself or its descendant {}",
            display_name(nodes, item),
            display_name(nodes, parent)
        ));
    }
    None
}

fn require_container(nodes: &Arena<NodeSlot>, id: NodeId) -> Result<(), DocumentError> {
    match nodes.get(id) {
        None => Err(DocumentError::NodeNotFound(id)),
        Some(slot) if !slot.kind.is_container() => Err(DocumentError::NotAContainer(id)),
        Some(_) => Ok(()),
    }
}

// ============================================================================
// Structural operations
// ============================================================================

impl Document {
    /// Append each item to the end of `parent`'s children.
    ///
    /// Items that are stale, already attached, `parent` itself or an
    /// ancestor of it are skipped with a warning. One `Add` record is
    /// emitted per appended item, delivered as a single batch.
    pub fn add(&self, parent: NodeId, items: &[NodeId]) -> Result<(), DocumentError> {
        let records = {
            let mut nodes = self.inner.nodes.borrow_mut();
            require_container(&nodes, parent)?;
            let mut records = Vec::with_capacity(items.len());
            for &item in items {
                if let Some(reason) = attach_violation(&nodes, parent, item) {
                    warn!("{reason}");
                    continue;
                }
                let previous = nodes[parent].last_child;
                link_last(&mut nodes, parent, item);
                records.push(NodeRecord::new(NodeAction::Add, item).with_new(parent, previous));
            }
            records
        };
        self.finish_attach(parent, records);
        Ok(())
    }

    /// Detach each item from `parent`. Items that are not children of
    /// `parent` are skipped with a warning.
    pub fn remove(&self, parent: NodeId, items: &[NodeId]) -> Result<(), DocumentError> {
        self.detach(parent, items, NodeAction::Remove)
    }

    /// Detach for re-homing elsewhere. Same as [`Document::remove`] but
    /// recorded as `Transfer`, and undo re-appends at the end.
    pub fn transfer(&self, parent: NodeId, items: &[NodeId]) -> Result<(), DocumentError> {
        self.detach(parent, items, NodeAction::Transfer)
    }

    fn detach(&self, parent: NodeId, items: &[NodeId], action: NodeAction) -> Result<(), DocumentError> {
        let records = {
            let mut nodes = self.inner.nodes.borrow_mut();
            require_container(&nodes, parent)?;
            let mut records = Vec::with_capacity(items.len());
            for &item in items {
                let Some(slot) = nodes.get(item) else {
                    warn!("node {item} does not exist");
                    continue;
                };
                if slot.parent != Some(parent) {
                    warn!(
                        "{} is not a child node of the {} node",
                        display_name(&nodes, item),
                        display_name(&nodes, parent)
                    );
                    continue;
                }
                let previous = slot.previous;
                unlink(&mut nodes, item);
                records.push(NodeRecord::new(action, item).with_old(parent, previous));
            }
            records
        };
        for record in &records {
            self.apply_parent_visible(record.node, true);
        }
        self.notify_node_changed(records);
        Ok(())
    }

    /// Insert `node` before `target`, or at the end when `target` is `None`.
    pub fn insert_before(
        &self,
        parent: NodeId,
        target: Option<NodeId>,
        node: NodeId,
    ) -> Result<(), DocumentError> {
        let record = {
            let mut nodes = self.inner.nodes.borrow_mut();
            require_container(&nodes, parent)?;
            if let Some(target) = target
                && nodes.get(target).and_then(|s| s.parent) != Some(parent)
            {
                warn!(
                    "{} is not a child node of the {} node",
                    display_name(&nodes, target),
                    display_name(&nodes, parent)
                );
                return Ok(());
            }
            if let Some(reason) = attach_violation(&nodes, parent, node) {
                warn!("{reason}");
                return Ok(());
            }
            let previous = match target {
                None => {
                    let previous = nodes[parent].last_child;
                    link_last(&mut nodes, parent, node);
                    previous
                }
                Some(target) => match nodes[target].previous {
                    None => {
                        link_first(&mut nodes, parent, node);
                        None
                    }
                    Some(previous) => {
                        link_after(&mut nodes, parent, previous, node);
                        Some(previous)
                    }
                },
            };
            NodeRecord::new(NodeAction::InsertBefore, node).with_new(parent, previous)
        };
        self.finish_attach(parent, vec![record]);
        Ok(())
    }

    /// Insert `node` after `target`, or at the front when `target` is `None`.
    pub fn insert_after(
        &self,
        parent: NodeId,
        target: Option<NodeId>,
        node: NodeId,
    ) -> Result<(), DocumentError> {
        let record = {
            let mut nodes = self.inner.nodes.borrow_mut();
            require_container(&nodes, parent)?;
            if let Some(target) = target
                && nodes.get(target).and_then(|s| s.parent) != Some(parent)
            {
                warn!(
                    "{} is not a child node of the {} node",
                    display_name(&nodes, target),
                    display_name(&nodes, parent)
                );
                return Ok(());
            }
            if let Some(reason) = attach_violation(&nodes, parent, node) {
                warn!("{reason}");
                return Ok(());
            }
            match target {
                None => link_first(&mut nodes, parent, node),
                Some(target) => link_after(&mut nodes, parent, target, node),
            }
            NodeRecord::new(NodeAction::InsertAfter, node).with_new(parent, target)
        };
        self.finish_attach(parent, vec![record]);
        Ok(())
    }

    /// Move an attached `child` under `new_parent`, right after
    /// `new_previous` (first position when `None`).
    ///
    /// Rejected with a warning, leaving the tree untouched, when
    /// `new_previous` is not a child of `new_parent` or is `child` itself,
    /// when `child` is not attached, or when `new_parent` lies in `child`'s
    /// subtree.
    pub fn move_node(
        &self,
        child: NodeId,
        new_parent: NodeId,
        new_previous: Option<NodeId>,
    ) -> Result<(), DocumentError> {
        let record = {
            let mut nodes = self.inner.nodes.borrow_mut();
            if !nodes.contains(child) {
                return Err(DocumentError::NodeNotFound(child));
            }
            require_container(&nodes, new_parent)?;
            if let Some(previous) = new_previous {
                if previous == child {
                    warn!("can not move {} after itself", display_name(&nodes, child));
                    return Ok(());
                }
                if nodes.get(previous).and_then(|s| s.parent) != Some(new_parent) {
                    warn!(
                        "{} is not a child node of the {} node",
                        display_name(&nodes, previous),
                        display_name(&nodes, new_parent)
                    );
                    return Ok(());
                }
            }
            let Some(old_parent) = nodes[child].parent else {
                warn!("{} is not attached to any node", display_name(&nodes, child));
                return Ok(());
            };
            if is_ancestor(&nodes, child, new_parent) {
                warn!(
                    "can not move {} into its own subtree",
                    display_name(&nodes, child)
                );
                return Ok(());
            }

            let old_previous = nodes[child].previous;
            unlink(&mut nodes, child);
            match new_previous {
                None => link_first(&mut nodes, new_parent, child),
                Some(previous) => link_after(&mut nodes, new_parent, previous, child),
            }
            NodeRecord::new(NodeAction::Move, child)
                .with_old(old_parent, old_previous)
                .with_new(new_parent, new_previous)
        };
        self.finish_attach(new_parent, vec![record]);
        Ok(())
    }

    fn finish_attach(&self, parent: NodeId, records: Vec<NodeRecord>) {
        let visible = self.effective_visible(parent);
        for record in &records {
            self.apply_parent_visible(record.node, visible);
        }
        self.notify_node_changed(records);
    }

    /// `parentVisible` (and its push down the subtree) is derived from the
    /// node's position. Replaying the structural record recomputes it, so
    /// it is applied without recording.
    fn apply_parent_visible(&self, node: NodeId, visible: bool) {
        self.history()
            .without_recording(|| self.set_parent_visible(node, visible));
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.inner.nodes.borrow().get(id).and_then(|s| s.parent)
    }

    #[must_use]
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.inner.nodes.borrow().get(id).and_then(|s| s.previous)
    }

    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.inner.nodes.borrow().get(id).and_then(|s| s.next)
    }

    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.inner.nodes.borrow().get(id).and_then(|s| s.first_child)
    }

    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.inner.nodes.borrow().get(id).and_then(|s| s.last_child)
    }

    /// Number of children, `None` for a stale id.
    #[must_use]
    pub fn count(&self, id: NodeId) -> Option<usize> {
        self.inner.nodes.borrow().get(id).map(|s| s.count)
    }

    /// Children in order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let nodes = self.inner.nodes.borrow();
        let mut out = Vec::new();
        let mut cursor = nodes.get(id).and_then(|s| s.first_child);
        while let Some(child) = cursor {
            out.push(child);
            cursor = nodes.get(child).and_then(|s| s.next);
        }
        out
    }

    /// `id`, its parent, and so on up to the topmost ancestor.
    #[must_use]
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let nodes = self.inner.nodes.borrow();
        let mut path = Vec::new();
        let mut cursor = nodes.contains(id).then_some(id);
        while let Some(node) = cursor {
            path.push(node);
            cursor = nodes.get(node).and_then(|s| s.parent);
        }
        path
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        is_ancestor(&self.inner.nodes.borrow(), ancestor, node)
    }

    /// Whether some strict ancestor of `node` is in `set`.
    #[must_use]
    pub fn contains_descendant(&self, set: &[NodeId], node: NodeId) -> bool {
        let nodes = self.inner.nodes.borrow();
        let mut cursor = nodes.get(node).and_then(|s| s.parent);
        while let Some(parent) = cursor {
            if set.contains(&parent) {
                return true;
            }
            cursor = nodes.get(parent).and_then(|s| s.parent);
        }
        false
    }

    /// Members of `set` none of whose ancestors are also in `set`.
    #[must_use]
    pub fn find_top_level_nodes(&self, set: &[NodeId]) -> Vec<NodeId> {
        set.iter()
            .copied()
            .filter(|node| !self.contains_descendant(set, *node))
            .collect()
    }

    /// Nodes from `a` to `b` inclusive, in depth-first document order.
    /// Works in either direction. Fails when the two share no ancestor.
    pub fn nodes_between(&self, a: NodeId, b: NodeId) -> Result<Vec<NodeId>, DocumentError> {
        for id in [a, b] {
            if !self.contains(id) {
                return Err(DocumentError::NodeNotFound(id));
            }
        }
        if a == b {
            return Ok(vec![a]);
        }
        let path_a = self.path_to_root(a);
        let path_b = self.path_to_root(b);
        if path_a.last() != path_b.last() {
            return Err(DocumentError::NoCommonAncestor { a, b });
        }
        let common = path_a
            .iter()
            .rev()
            .zip(path_b.iter().rev())
            .take_while(|(x, y)| x == y)
            .last()
            .map(|(x, _)| *x)
            .ok_or(DocumentError::NoCommonAncestor { a, b })?;

        let order = self.preorder(common);
        let pos_a = order.iter().position(|n| *n == a);
        let pos_b = order.iter().position(|n| *n == b);
        match (pos_a, pos_b) {
            (Some(x), Some(y)) => {
                let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
                Ok(order[lo..=hi].to_vec())
            }
            _ => Err(DocumentError::NoCommonAncestor { a, b }),
        }
    }

    /// `id` followed by its whole subtree in depth-first order.
    #[must_use]
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let nodes = self.inner.nodes.borrow();
        let mut out = Vec::new();
        if !nodes.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            let mut child = nodes[node].last_child;
            while let Some(c) = child {
                stack.push(c);
                child = nodes[c].previous;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::config::DocumentConfig;

    fn doc() -> Document {
        Document::new("tree", DocumentConfig::default())
    }

    /// Walk both directions and compare with `count`.
    fn assert_links(doc: &Document, parent: NodeId) {
        let forward = doc.children(parent);
        assert_eq!(doc.count(parent), Some(forward.len()));
        let mut backward = Vec::new();
        let mut cursor = doc.last_child(parent);
        while let Some(c) = cursor {
            backward.push(c);
            cursor = doc.previous_sibling(c);
        }
        backward.reverse();
        assert_eq!(forward, backward);
        if let Some(first) = forward.first() {
            assert_eq!(doc.previous_sibling(*first), None);
        }
        if let Some(last) = forward.last() {
            assert_eq!(doc.next_sibling(*last), None);
        }
        for child in &forward {
            assert_eq!(doc.parent(*child), Some(parent));
        }
    }

    fn leaves(doc: &Document, n: usize) -> Vec<NodeId> {
        (0..n).map(|i| doc.create_visual(&format!("n{i}"))).collect()
    }

    #[test]
    fn add_appends_with_previous_per_item() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let n = leaves(&doc, 3);
        doc.add(root, &n).unwrap();
        assert_eq!(doc.children(root), n);
        assert_links(&doc, root);
        assert_eq!(doc.history().undo_count(), 1);

        doc.history().undo(&doc).unwrap();
        assert_eq!(doc.count(root), Some(0));
        for node in &n {
            assert_eq!(doc.parent(*node), None);
        }
        doc.history().redo(&doc).unwrap();
        assert_eq!(doc.children(root), n);
    }

    #[test]
    fn add_to_leaf_is_error() {
        let doc = doc();
        let leaf = doc.create_visual("leaf");
        let other = doc.create_visual("other");
        assert_eq!(doc.add(leaf, &[other]), Err(DocumentError::NotAContainer(leaf)));
    }

    #[test]
    #[traced_test]
    fn add_skips_attached_and_cycles() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let a = doc.create_folder("a");
        let b = doc.create_folder("b");
        doc.add(root, &[a]).unwrap();
        doc.add(a, &[b]).unwrap();

        let before = doc.history().undo_count();
        doc.add(b, &[a]).unwrap();
        doc.add(b, &[b]).unwrap();
        doc.add(root, &[b]).unwrap();
        assert_eq!(doc.history().undo_count(), before);
        assert!(logs_contain("is already a child node of the"));
        assert_eq!(doc.parent(b), Some(a));
    }

    #[test]
    fn add_rejects_ancestor_of_detached_parent() {
        let doc = doc();
        let a = doc.create_folder("a");
        let b = doc.create_folder("b");
        doc.add(a, &[b]).unwrap();
        // a is unattached and is b's ancestor
        doc.add(b, &[a]).unwrap();
        assert_eq!(doc.parent(a), None);
        assert_eq!(doc.count(b), Some(0));
    }

    #[test]
    fn remove_first_middle_last_only() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let n = leaves(&doc, 4);
        doc.add(root, &n).unwrap();

        doc.remove(root, &[n[0]]).unwrap();
        assert_links(&doc, root);
        doc.remove(root, &[n[2]]).unwrap();
        assert_links(&doc, root);
        doc.remove(root, &[n[3]]).unwrap();
        assert_links(&doc, root);
        assert_eq!(doc.children(root), vec![n[1]]);
        doc.remove(root, &[n[1]]).unwrap();
        assert_links(&doc, root);
        assert_eq!(doc.first_child(root), None);
        assert_eq!(doc.last_child(root), None);
    }

    #[test]
    fn remove_undo_restores_exact_position() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let n = leaves(&doc, 4);
        doc.add(root, &n).unwrap();
        doc.remove(root, &[n[1], n[2]]).unwrap();
        assert_eq!(doc.children(root), vec![n[0], n[3]]);
        doc.history().undo(&doc).unwrap();
        assert_eq!(doc.children(root), n);
        assert_links(&doc, root);
    }

    #[test]
    #[traced_test]
    fn remove_non_child_is_skipped() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let folder = doc.create_folder("folder");
        let stray = doc.create_visual("stray");
        doc.add(root, &[folder]).unwrap();
        let before = doc.history().undo_count();
        doc.remove(folder, &[stray]).unwrap();
        assert_eq!(doc.history().undo_count(), before);
        assert!(logs_contain("stray is not a child node of the folder node"));
    }

    #[test]
    fn remove_resets_parent_visible() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let folder = doc.create_folder("f");
        let leaf = doc.create_visual("l");
        doc.add(root, &[folder]).unwrap();
        doc.add(folder, &[leaf]).unwrap();
        doc.set_visible(folder, false).unwrap();
        assert_eq!(doc.parent_visible(leaf), Some(false));
        doc.remove(folder, &[leaf]).unwrap();
        assert_eq!(doc.parent_visible(leaf), Some(true));
    }

    #[test]
    fn edits_under_hidden_folder_are_one_history_entry() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let hidden = doc.create_folder("hidden");
        let sub = doc.create_folder("sub");
        let leaves = leaves(&doc, 60);
        let marker = doc.create_visual("marker");
        doc.add(root, &[hidden]).unwrap();
        doc.add(hidden, &[sub]).unwrap();
        doc.add(sub, &leaves).unwrap();
        doc.set_visible(hidden, false).unwrap();
        doc.add(root, &[marker]).unwrap();
        assert!(leaves.iter().all(|l| doc.parent_visible(*l) == Some(false)));

        let before = doc.history().undo_count();
        doc.remove(hidden, &[sub]).unwrap();
        assert_eq!(doc.history().undo_count(), before + 1);
        assert!(leaves.iter().all(|l| doc.parent_visible(*l) == Some(true)));

        doc.add(hidden, &[sub]).unwrap();
        doc.move_node(sub, root, None).unwrap();
        assert_eq!(doc.history().undo_count(), before + 3);

        doc.history().undo(&doc).unwrap();
        doc.history().undo(&doc).unwrap();
        doc.history().undo(&doc).unwrap();
        assert_eq!(doc.parent(sub), Some(hidden));
        assert!(leaves.iter().all(|l| doc.parent_visible(*l) == Some(false)));
        // the marker add is still in history
        doc.history().undo(&doc).unwrap();
        assert_eq!(doc.parent(marker), None);
    }

    /// Transfer undo appends at the end of the old parent instead of
    /// restoring the original slot.
    #[test]
    fn transfer_undo_appends_at_end() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let n = leaves(&doc, 3);
        doc.add(root, &n).unwrap();
        doc.transfer(root, &[n[0]]).unwrap();
        doc.history().undo(&doc).unwrap();
        assert_eq!(doc.children(root), vec![n[1], n[2], n[0]]);
        doc.history().redo(&doc).unwrap();
        assert_eq!(doc.children(root), vec![n[1], n[2]]);
        assert_eq!(doc.parent(n[0]), None);
    }

    #[test]
    fn insert_before_and_after() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let n = leaves(&doc, 5);
        doc.add(root, &[n[0], n[1]]).unwrap();

        doc.insert_before(root, Some(n[0]), n[2]).unwrap();
        assert_eq!(doc.children(root), vec![n[2], n[0], n[1]]);
        doc.insert_before(root, Some(n[1]), n[3]).unwrap();
        assert_eq!(doc.children(root), vec![n[2], n[0], n[3], n[1]]);
        doc.insert_after(root, Some(n[1]), n[4]).unwrap();
        assert_eq!(doc.children(root), vec![n[2], n[0], n[3], n[1], n[4]]);
        assert_links(&doc, root);
    }

    #[test]
    fn insert_with_no_target_uses_ends() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let n = leaves(&doc, 3);
        doc.add(root, &[n[0]]).unwrap();
        doc.insert_before(root, None, n[1]).unwrap();
        doc.insert_after(root, None, n[2]).unwrap();
        assert_eq!(doc.children(root), vec![n[2], n[0], n[1]]);
        assert_links(&doc, root);
    }

    #[test]
    fn insert_before_redo_lands_in_same_slot() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let n = leaves(&doc, 3);
        doc.add(root, &[n[0], n[1]]).unwrap();
        doc.insert_before(root, Some(n[1]), n[2]).unwrap();
        let expected = doc.children(root);
        doc.history().undo(&doc).unwrap();
        assert_eq!(doc.children(root), vec![n[0], n[1]]);
        doc.history().redo(&doc).unwrap();
        assert_eq!(doc.children(root), expected);

        let m = doc.create_visual("m");
        doc.insert_before(root, Some(n[0]), m).unwrap();
        doc.history().undo(&doc).unwrap();
        doc.history().redo(&doc).unwrap();
        assert_eq!(doc.first_child(root), Some(m));
    }

    #[test]
    #[traced_test]
    fn insert_with_foreign_target_is_skipped() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let folder = doc.create_folder("folder");
        let inner = doc.create_visual("inner");
        let node = doc.create_visual("node");
        doc.add(root, &[folder]).unwrap();
        doc.add(folder, &[inner]).unwrap();
        let before = doc.history().undo_count();
        doc.insert_after(root, Some(inner), node).unwrap();
        doc.insert_before(root, Some(inner), node).unwrap();
        assert_eq!(doc.parent(node), None);
        assert_eq!(doc.history().undo_count(), before);
        assert!(logs_contain("inner is not a child node of the"));
    }

    #[test]
    fn move_between_parents_updates_counts() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let a = doc.create_folder("a");
        let b = doc.create_folder("b");
        let n = leaves(&doc, 3);
        doc.add(root, &[a, b]).unwrap();
        doc.add(a, &[n[0], n[1]]).unwrap();
        doc.add(b, &[n[2]]).unwrap();

        doc.move_node(n[0], b, Some(n[2])).unwrap();
        assert_eq!(doc.children(a), vec![n[1]]);
        assert_eq!(doc.children(b), vec![n[2], n[0]]);
        assert_links(&doc, a);
        assert_links(&doc, b);

        doc.history().undo(&doc).unwrap();
        assert_eq!(doc.children(a), vec![n[0], n[1]]);
        assert_eq!(doc.children(b), vec![n[2]]);
        doc.history().redo(&doc).unwrap();
        assert_eq!(doc.children(b), vec![n[2], n[0]]);
    }

    #[test]
    fn move_within_parent_to_front() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let n = leaves(&doc, 3);
        doc.add(root, &n).unwrap();
        doc.move_node(n[2], root, None).unwrap();
        assert_eq!(doc.children(root), vec![n[2], n[0], n[1]]);
        assert_links(&doc, root);
        doc.history().undo(&doc).unwrap();
        assert_eq!(doc.children(root), n);
    }

    #[test]
    #[traced_test]
    fn move_rejections_leave_tree_alone() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let a = doc.create_folder("a");
        let b = doc.create_folder("b");
        let x = doc.create_visual("x");
        let y = doc.create_visual("y");
        let loose = doc.create_visual("loose");
        doc.add(root, &[a, b]).unwrap();
        doc.add(a, &[x]).unwrap();
        doc.add(b, &[y]).unwrap();
        let before = doc.history().undo_count();

        doc.move_node(x, root, Some(y)).unwrap();
        doc.move_node(x, a, Some(x)).unwrap();
        doc.move_node(loose, a, None).unwrap();
        doc.move_node(a, a, None).unwrap();
        doc.move_node(root, a, None).unwrap();

        assert_eq!(doc.history().undo_count(), before);
        assert_eq!(doc.parent(x), Some(a));
        assert_eq!(doc.children(root), vec![a, b]);
        assert!(logs_contain("is not attached to any node"));
        assert!(logs_contain("into its own subtree"));
    }

    #[test]
    fn stale_ids_are_errors() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let gone = doc.create_folder("gone");
        doc.dispose_node(gone);
        assert_eq!(doc.add(gone, &[]), Err(DocumentError::NodeNotFound(gone)));
        assert_eq!(
            doc.move_node(gone, root, None),
            Err(DocumentError::NodeNotFound(gone))
        );
    }

    #[test]
    fn nodes_between_preorder_slice() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let a = doc.create_folder("a");
        let a1 = doc.create_visual("a1");
        let a2 = doc.create_visual("a2");
        let b = doc.create_visual("b");
        doc.add(root, &[a, b]).unwrap();
        doc.add(a, &[a1, a2]).unwrap();

        assert_eq!(doc.nodes_between(a1, b).unwrap(), vec![a1, a2, b]);
        assert_eq!(doc.nodes_between(b, a1).unwrap(), vec![a1, a2, b]);
        assert_eq!(doc.nodes_between(a, a2).unwrap(), vec![a, a1, a2]);
        assert_eq!(doc.nodes_between(b, b).unwrap(), vec![b]);
    }

    #[test]
    fn nodes_between_different_trees_fails() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let inside = doc.create_visual("in");
        let outside = doc.create_visual("out");
        doc.add(root, &[inside]).unwrap();
        assert_eq!(
            doc.nodes_between(inside, outside),
            Err(DocumentError::NoCommonAncestor {
                a: inside,
                b: outside
            })
        );
    }

    #[test]
    fn top_level_nodes() {
        let doc = doc();
        let root = doc.root_node().unwrap();
        let a = doc.create_folder("a");
        let a1 = doc.create_visual("a1");
        let b = doc.create_visual("b");
        doc.add(root, &[a, b]).unwrap();
        doc.add(a, &[a1]).unwrap();
        assert_eq!(doc.find_top_level_nodes(&[a1, a, b]), vec![a, b]);
        assert!(doc.contains_descendant(&[a], a1));
        assert!(!doc.contains_descendant(&[b], a1));
        assert_eq!(doc.path_to_root(a1), vec![a1, a, root]);
    }
}
