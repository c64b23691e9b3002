#![forbid(unsafe_code)]

//! Node kinds, structural records and the node property table.

use std::fmt;

use tracing::debug;

use crate::arena::NodeId;
use crate::document::Document;
use crate::error::DocumentError;
use crate::history::Record;

/// Property keys stored in every node's property bag.
pub mod keys {
    pub const NAME: &str = "name";
    pub const VISIBLE: &str = "visible";
    pub const PARENT_VISIBLE: &str = "parentVisible";
    pub const CUSTOM_PROPERTIES: &str = "customProperties";
    pub const CUSTOM_PROPERTY_TYPES: &str = "customPropertyTypes";
    pub const TRANSFORM: &str = "transform";
}

/// What a node is, and therefore whether it can hold children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// Plain container.
    Folder,
    /// Container with a transform.
    Group,
    /// Leaf carrying geometry.
    Visual,
}

impl NodeKind {
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Folder | Self::Group)
    }

    /// Class key used in serialized form.
    #[must_use]
    pub const fn class_key(self) -> &'static str {
        match self {
            Self::Folder => "FolderNode",
            Self::Group => "GroupNode",
            Self::Visual => "VisualNode",
        }
    }

    #[must_use]
    pub fn from_class_key(key: &str) -> Option<Self> {
        match key {
            "FolderNode" => Some(Self::Folder),
            "GroupNode" => Some(Self::Group),
            "VisualNode" => Some(Self::Visual),
            _ => None,
        }
    }
}

/// Display metadata for one node property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyMeta {
    pub key: &'static str,
    /// Translation key for the property grid.
    pub display: &'static str,
    /// Editor hint, if the property wants a specific one.
    pub type_hint: Option<&'static str>,
    /// Kinds carrying the property; empty means every kind.
    pub kinds: &'static [NodeKind],
    /// Whether the serializer writes it.
    pub serialized: bool,
}

static NODE_PROPERTIES: [PropertyMeta; 6] = [
    PropertyMeta {
        key: keys::NAME,
        display: "common.name",
        type_hint: None,
        kinds: &[],
        serialized: true,
    },
    PropertyMeta {
        key: keys::VISIBLE,
        display: "common.visible",
        type_hint: Some("boolean"),
        kinds: &[],
        serialized: true,
    },
    PropertyMeta {
        key: keys::PARENT_VISIBLE,
        display: "common.parentVisible",
        type_hint: Some("boolean"),
        kinds: &[],
        serialized: false,
    },
    PropertyMeta {
        key: keys::CUSTOM_PROPERTIES,
        display: "common.customProperties",
        type_hint: Some("json"),
        kinds: &[],
        serialized: true,
    },
    PropertyMeta {
        key: keys::CUSTOM_PROPERTY_TYPES,
        display: "common.customPropertyTypes",
        type_hint: Some("json"),
        kinds: &[],
        serialized: true,
    },
    PropertyMeta {
        key: keys::TRANSFORM,
        display: "common.matrix",
        type_hint: Some("matrix"),
        kinds: &[NodeKind::Group],
        serialized: true,
    },
];

/// Properties carried by nodes of `kind`, in display order.
pub fn properties_of(kind: NodeKind) -> impl Iterator<Item = &'static PropertyMeta> {
    NODE_PROPERTIES
        .iter()
        .filter(move |meta| meta.kinds.is_empty() || meta.kinds.contains(&kind))
}

/// Metadata for `key`, if it is a known node property.
#[must_use]
pub fn property_meta(key: &str) -> Option<&'static PropertyMeta> {
    NODE_PROPERTIES.iter().find(|meta| meta.key == key)
}

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum NodeAction {
    Add,
    Remove,
    Move,
    Transfer,
    InsertAfter,
    InsertBefore,
}

impl NodeAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Move => "move",
            Self::Transfer => "transfer",
            Self::InsertAfter => "insertAfter",
            Self::InsertBefore => "insertBefore",
        }
    }
}

impl fmt::Display for NodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structural change with the positions needed to invert it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub action: NodeAction,
    pub node: NodeId,
    pub old_parent: Option<NodeId>,
    pub old_previous: Option<NodeId>,
    pub new_parent: Option<NodeId>,
    pub new_previous: Option<NodeId>,
}

impl NodeRecord {
    #[must_use]
    pub const fn new(action: NodeAction, node: NodeId) -> Self {
        Self {
            action,
            node,
            old_parent: None,
            old_previous: None,
            new_parent: None,
            new_previous: None,
        }
    }

    #[must_use]
    pub const fn with_old(mut self, parent: NodeId, previous: Option<NodeId>) -> Self {
        self.old_parent = Some(parent);
        self.old_previous = previous;
        self
    }

    #[must_use]
    pub const fn with_new(mut self, parent: NodeId, previous: Option<NodeId>) -> Self {
        self.new_parent = Some(parent);
        self.new_previous = previous;
        self
    }
}

/// Receives every batch of structural changes made to a document.
pub trait NodeChangedObserver {
    fn handle_node_changed(&self, doc: &Document, records: &[NodeRecord]);

    /// Called after `ids` were freed. The ids are already stale.
    fn handle_nodes_disposed(&self, _doc: &Document, _ids: &[NodeId]) {}
}

/// History record for one batch of [`NodeRecord`]s.
///
/// Undo replays the batch in reverse, redo forward. Only the ids stored in
/// each record are used.
#[derive(Debug, Clone)]
pub struct NodeLinkedListRecord {
    records: Vec<NodeRecord>,
}

impl NodeLinkedListRecord {
    #[must_use]
    pub fn new(records: Vec<NodeRecord>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn records(&self) -> &[NodeRecord] {
        &self.records
    }

    fn undo_one(doc: &Document, record: &NodeRecord) -> Result<(), DocumentError> {
        match record.action {
            NodeAction::Add | NodeAction::InsertAfter | NodeAction::InsertBefore => {
                if let Some(parent) = record.new_parent {
                    doc.remove(parent, &[record.node])?;
                }
            }
            NodeAction::Remove => {
                if let Some(parent) = record.old_parent {
                    doc.insert_after(parent, record.old_previous, record.node)?;
                }
            }
            // Transfer only promises membership, so the node comes back at
            // the end of its old parent.
            NodeAction::Transfer => {
                if let Some(parent) = record.old_parent {
                    doc.add(parent, &[record.node])?;
                }
            }
            NodeAction::Move => {
                if let Some(parent) = record.old_parent {
                    doc.move_node(record.node, parent, record.old_previous)?;
                }
            }
        }
        Ok(())
    }

    fn redo_one(doc: &Document, record: &NodeRecord) -> Result<(), DocumentError> {
        match record.action {
            NodeAction::Add => {
                if let Some(parent) = record.new_parent {
                    doc.add(parent, &[record.node])?;
                }
            }
            NodeAction::Remove => {
                if let Some(parent) = record.old_parent {
                    doc.remove(parent, &[record.node])?;
                }
            }
            NodeAction::Transfer => {
                if let Some(parent) = record.old_parent {
                    doc.transfer(parent, &[record.node])?;
                }
            }
            NodeAction::Move => {
                if let Some(parent) = record.new_parent {
                    doc.move_node(record.node, parent, record.new_previous)?;
                }
            }
            NodeAction::InsertAfter => {
                if let Some(parent) = record.new_parent {
                    doc.insert_after(parent, record.new_previous, record.node)?;
                }
            }
            NodeAction::InsertBefore => {
                if let Some(parent) = record.new_parent {
                    match record.new_previous {
                        Some(previous) => {
                            let target = doc.next_sibling(previous);
                            doc.insert_before(parent, target, record.node)?;
                        }
                        None => doc.insert_after(parent, None, record.node)?,
                    }
                }
            }
        }
        Ok(())
    }
}

impl Record for NodeLinkedListRecord {
    fn name(&self) -> &str {
        "change node"
    }

    fn undo(&mut self, doc: &Document) -> Result<(), DocumentError> {
        for record in self.records.iter().rev() {
            Self::undo_one(doc, record)?;
        }
        Ok(())
    }

    fn redo(&mut self, doc: &Document) -> Result<(), DocumentError> {
        for record in &self.records {
            Self::redo_one(doc, record)?;
        }
        Ok(())
    }

    /// Removed nodes that are still detached can never come back once this
    /// record is gone, so they are disposed with it.
    fn dispose(&mut self, doc: &Document) {
        for record in &self.records {
            if record.action == NodeAction::Remove
                && doc.contains(record.node)
                && doc.parent(record.node).is_none()
            {
                debug!(node = %record.node, "disposing permanently removed node");
                doc.dispose_node(record.node);
            }
        }
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containers() {
        assert!(NodeKind::Folder.is_container());
        assert!(NodeKind::Group.is_container());
        assert!(!NodeKind::Visual.is_container());
    }

    #[test]
    fn class_keys_round_trip() {
        for kind in [NodeKind::Folder, NodeKind::Group, NodeKind::Visual] {
            assert_eq!(NodeKind::from_class_key(kind.class_key()), Some(kind));
        }
        assert_eq!(NodeKind::from_class_key("MeshNode"), None);
    }

    #[test]
    fn transform_is_group_only() {
        let group: Vec<_> = properties_of(NodeKind::Group).map(|m| m.key).collect();
        let folder: Vec<_> = properties_of(NodeKind::Folder).map(|m| m.key).collect();
        assert!(group.contains(&keys::TRANSFORM));
        assert!(!folder.contains(&keys::TRANSFORM));
        assert_eq!(property_meta(keys::NAME).map(|m| m.display), Some("common.name"));
    }

    #[test]
    fn action_names() {
        assert_eq!(NodeAction::InsertBefore.to_string(), "insertBefore");
        assert_eq!(NodeAction::Add.as_str(), "add");
    }
}
