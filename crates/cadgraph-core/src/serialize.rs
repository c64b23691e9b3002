#![forbid(unsafe_code)]

//! Node serialization and cloning.
//!
//! A [`Serialized`] node is its class key, the properties the node table
//! marks as serialized (plus `id`), and, for containers, its children.

use std::collections::HashMap;

use serde_json::{Map, json};
use tracing::debug;

use crate::arena::NodeId;
use crate::document::{Document, generate_id};
use crate::error::{DocumentError, SerializeError};
use crate::node::{NodeKind, keys, properties_of};
use crate::value::Value;

const ID_KEY: &str = "id";

/// Serialized form of one node and its subtree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Serialized {
    pub class_key: String,
    pub properties: Map<String, serde_json::Value>,
    pub children: Vec<Serialized>,
}

impl Serialized {
    /// `{"classKey", "properties", "children"}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "classKey": self.class_key,
            "properties": self.properties,
            "children": self.children.iter().map(Self::to_json).collect::<Vec<_>>(),
        })
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self, SerializeError> {
        let class_key = json
            .get("classKey")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| SerializeError::InvalidProperty {
                property: "classKey".into(),
            })?
            .to_owned();
        let properties = match json.get("properties") {
            Some(serde_json::Value::Object(map)) => map.clone(),
            None => Map::new(),
            Some(_) => {
                return Err(SerializeError::InvalidProperty {
                    property: "properties".into(),
                });
            }
        };
        let children = match json.get("children") {
            Some(serde_json::Value::Array(items)) => {
                items.iter().map(Self::from_json).collect::<Result<_, _>>()?
            }
            None => Vec::new(),
            Some(_) => {
                return Err(SerializeError::InvalidProperty {
                    property: "children".into(),
                });
            }
        };
        Ok(Self {
            class_key,
            properties,
            children,
        })
    }

    /// Give this node and every descendant a fresh id.
    pub fn regenerate_ids(&mut self) {
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            node.properties.insert(ID_KEY.into(), generate_id().into());
            pending.extend(node.children.iter_mut());
        }
    }
}

// Deep chains drop without recursing.
impl Drop for Serialized {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Turns nodes into [`Serialized`] values and back.
pub trait NodeSerializer {
    fn serialize_node(&self, doc: &Document, id: NodeId) -> Result<Serialized, DocumentError>;

    /// Build a new, unattached node (with its subtree) in `doc`.
    fn deserialize_node(&self, doc: &Document, serialized: &Serialized) -> Result<NodeId, DocumentError>;
}

/// Serializer writing property values as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonNodeSerializer;

impl JsonNodeSerializer {
    /// Pretty JSON text for a node.
    pub fn to_json_string(&self, doc: &Document, id: NodeId) -> Result<String, DocumentError> {
        let serialized = self.serialize_node(doc, id)?;
        serde_json::to_string_pretty(&serialized.to_json())
            .map_err(|err| SerializeError::from(err).into())
    }

    pub fn from_json_string(&self, doc: &Document, text: &str) -> Result<NodeId, DocumentError> {
        let json: serde_json::Value = serde_json::from_str(text).map_err(SerializeError::from)?;
        let serialized = Serialized::from_json(&json)?;
        self.deserialize_node(doc, &serialized)
    }
}

impl NodeSerializer for JsonNodeSerializer {
    fn serialize_node(&self, doc: &Document, id: NodeId) -> Result<Serialized, DocumentError> {
        let order = doc.preorder(id);
        if order.is_empty() {
            return Err(DocumentError::NodeNotFound(id));
        }
        let index: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(i, node)| (*node, i)).collect();
        let mut items = Vec::with_capacity(order.len());
        for (i, node) in order.iter().enumerate() {
            let parent = if i == 0 {
                None
            } else {
                doc.parent(*node).and_then(|p| index.get(&p).copied())
            };
            items.push((parent, serialize_one(doc, *node)?));
        }

        // Pre-order puts every descendant after its parent: folding from the
        // back completes each node before it is handed to its parent.
        while items.len() > 1 {
            let Some((parent, mut node)) = items.pop() else {
                break;
            };
            node.children.reverse();
            if let Some(p) = parent {
                items[p].1.children.push(node);
            }
        }
        let (_, mut root) = items.pop().ok_or(DocumentError::NodeNotFound(id))?;
        root.children.reverse();
        Ok(root)
    }

    /// Either the whole subtree is built or nothing is left behind. The
    /// result is a new unattached node, so nothing is recorded.
    fn deserialize_node(&self, doc: &Document, serialized: &Serialized) -> Result<NodeId, DocumentError> {
        let mut created = Vec::new();
        let result = doc
            .history()
            .without_recording(|| build_subtree(doc, serialized, &mut created));
        if let Err(err) = &result {
            debug!(error = %err, created = created.len(), "deserialize failed, rolling back");
            doc.history().without_recording(|| {
                for id in &created {
                    doc.dispose_node(*id);
                }
            });
        }
        result
    }
}

fn serialize_one(doc: &Document, id: NodeId) -> Result<Serialized, DocumentError> {
    let kind = doc.kind(id).ok_or(DocumentError::NodeNotFound(id))?;
    let props = doc.properties(id).ok_or(DocumentError::NodeNotFound(id))?;
    let mut properties = Map::new();
    properties.insert(ID_KEY.into(), doc.uid(id).unwrap_or_default().into());
    for meta in properties_of(kind).filter(|meta| meta.serialized) {
        if props.contains(meta.key) {
            let value = props.get(meta.key).unwrap_or_default();
            properties.insert(meta.key.to_owned(), value.to_json());
        }
    }
    Ok(Serialized {
        class_key: kind.class_key().to_owned(),
        properties,
        children: Vec::new(),
    })
}

/// Every node is pushed to `created` as soon as it exists. Links are made
/// once all nodes are built.
fn build_subtree(
    doc: &Document,
    serialized: &Serialized,
    created: &mut Vec<NodeId>,
) -> Result<NodeId, DocumentError> {
    let mut families: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
    let mut pending: Vec<(&Serialized, Option<usize>)> = vec![(serialized, None)];
    while let Some((item, family)) = pending.pop() {
        let (id, kind) = create_one(doc, item, created)?;
        if let Some(f) = family {
            families[f].1.push(id);
        }
        if item.children.is_empty() {
            continue;
        }
        if !kind.is_container() {
            return Err(DocumentError::NotAContainer(id));
        }
        families.push((id, Vec::with_capacity(item.children.len())));
        let slot = families.len() - 1;
        pending.extend(item.children.iter().rev().map(|child| (child, Some(slot))));
    }
    for (parent, children) in &families {
        doc.add(*parent, children)?;
    }
    created
        .first()
        .copied()
        .ok_or_else(|| SerializeError::UnknownClass(serialized.class_key.clone()).into())
}

fn create_one(
    doc: &Document,
    serialized: &Serialized,
    created: &mut Vec<NodeId>,
) -> Result<(NodeId, NodeKind), DocumentError> {
    let kind = NodeKind::from_class_key(&serialized.class_key)
        .ok_or_else(|| SerializeError::UnknownClass(serialized.class_key.clone()))?;
    let uid = serialized
        .properties
        .get(ID_KEY)
        .and_then(serde_json::Value::as_str)
        .map_or_else(generate_id, str::to_owned);
    let name = serialized
        .properties
        .get(keys::NAME)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let id = doc.create_node_with_id(kind, name, uid);
    created.push(id);
    let props = doc.properties(id).ok_or(DocumentError::NodeNotFound(id))?;

    for meta in properties_of(kind).filter(|meta| meta.serialized && meta.key != keys::NAME) {
        let Some(json) = serialized.properties.get(meta.key) else {
            continue;
        };
        let value = Value::from_json(json);
        if meta.key == keys::TRANSFORM && value.as_matrix().is_none() {
            return Err(SerializeError::InvalidProperty {
                property: meta.key.to_owned(),
            }
            .into());
        }
        props.set_private(meta.key, value);
    }
    Ok((id, kind))
}

impl Document {
    /// Copy `id` and its subtree as a new unattached node named
    /// `"<name>_copy"`. Nothing is recorded in the history.
    pub fn clone_node(&self, id: NodeId) -> Result<NodeId, DocumentError> {
        let serializer = JsonNodeSerializer;
        self.history().without_recording(|| {
            let mut serialized = serializer.serialize_node(self, id)?;
            serialized.regenerate_ids();
            let name = self.name_of(id).unwrap_or_default();
            serialized
                .properties
                .insert(keys::NAME.into(), format!("{name}_copy").into());
            let copy = serializer.deserialize_node(self, &serialized)?;
            debug!(source = %id, copy = %copy, "node cloned");
            Ok(copy)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::DocumentConfig;
    use crate::value::Matrix4;

    fn sample(doc: &Document) -> NodeId {
        let group = doc.create_group("frame");
        let leaf = doc.create_visual("bolt");
        doc.add(group, &[leaf]).unwrap();
        doc.set_transform(group, Matrix4::translation(0.0, 5.0, 0.0)).unwrap();
        doc.set_custom_property(leaf, "size", json!(8)).unwrap();
        doc.set_visible(leaf, false).unwrap();
        group
    }

    #[test]
    fn serialize_writes_table_properties_and_children() {
        let doc = Document::new("d", DocumentConfig::default());
        let group = sample(&doc);
        let serialized = JsonNodeSerializer.serialize_node(&doc, group).unwrap();
        assert_eq!(serialized.class_key, "GroupNode");
        assert_eq!(serialized.properties["name"], json!("frame"));
        assert!(serialized.properties.contains_key("transform"));
        assert!(!serialized.properties.contains_key("parentVisible"));
        assert_eq!(serialized.children.len(), 1);
        assert_eq!(serialized.children[0].properties["visible"], json!(false));
    }

    #[test]
    fn json_text_round_trip_rebuilds_subtree() {
        let doc = Document::new("d", DocumentConfig::default());
        let group = sample(&doc);
        let text = JsonNodeSerializer.to_json_string(&doc, group).unwrap();

        let other = Document::new("other", DocumentConfig::default());
        let copy = JsonNodeSerializer.from_json_string(&other, &text).unwrap();
        assert_eq!(other.uid(copy), doc.uid(group));
        assert_eq!(other.transform(copy), doc.transform(group));
        let leaf = other.first_child(copy).unwrap();
        assert_eq!(other.name_of(leaf).as_deref(), Some("bolt"));
        assert_eq!(other.visible(leaf), Some(false));
        assert_eq!(other.get_custom_property(leaf, "size").unwrap(), Some(json!(8)));
    }

    #[test]
    fn clone_node_is_fresh_and_unrecorded() {
        let doc = Document::new("d", DocumentConfig::default());
        let group = sample(&doc);
        let before = doc.history().undo_count();

        let copy = doc.clone_node(group).unwrap();
        assert_eq!(doc.history().undo_count(), before);
        assert!(!doc.history().is_disabled());
        assert_eq!(doc.name_of(copy).as_deref(), Some("frame_copy"));
        assert_ne!(doc.uid(copy), doc.uid(group));
        assert_eq!(doc.parent(copy), None);
        let original_leaf = doc.first_child(group).unwrap();
        let copied_leaf = doc.first_child(copy).unwrap();
        assert_ne!(doc.uid(copied_leaf), doc.uid(original_leaf));
        assert_eq!(doc.name_of(copied_leaf).as_deref(), Some("bolt"));
    }

    #[test]
    fn unknown_class_is_rejected() {
        let doc = Document::new("d", DocumentConfig::default());
        let serialized = Serialized {
            class_key: "Sketch".into(),
            properties: Map::new(),
            children: Vec::new(),
        };
        assert_eq!(
            JsonNodeSerializer.deserialize_node(&doc, &serialized),
            Err(DocumentError::Serialize(SerializeError::UnknownClass("Sketch".into())))
        );
    }

    #[test]
    fn children_on_leaf_are_rejected() {
        let doc = Document::new("d", DocumentConfig::default());
        let json = json!({
            "classKey": "VisualNode",
            "properties": { "name": "leaf" },
            "children": [ { "classKey": "VisualNode" } ]
        });
        let serialized = Serialized::from_json(&json).unwrap();
        assert!(matches!(
            JsonNodeSerializer.deserialize_node(&doc, &serialized),
            Err(DocumentError::NotAContainer(_))
        ));
    }

    #[test]
    fn failed_deserialize_leaves_no_nodes() {
        let doc = Document::new("d", DocumentConfig::default());
        let before = doc.node_count();
        let undo_before = doc.history().undo_count();
        let bad_transform = json!({
            "classKey": "GroupNode",
            "properties": { "name": "frame" },
            "children": [
                { "classKey": "VisualNode", "properties": { "name": "ok" } },
                { "classKey": "GroupNode", "properties": { "transform": "sideways" } }
            ]
        });
        let serialized = Serialized::from_json(&bad_transform).unwrap();
        assert!(matches!(
            JsonNodeSerializer.deserialize_node(&doc, &serialized),
            Err(DocumentError::Serialize(SerializeError::InvalidProperty { .. }))
        ));
        assert_eq!(doc.node_count(), before);

        let unknown_child = json!({
            "classKey": "FolderNode",
            "children": [
                { "classKey": "GroupNode", "children": [ { "classKey": "VisualNode" } ] },
                { "classKey": "Sketch" }
            ]
        });
        let serialized = Serialized::from_json(&unknown_child).unwrap();
        assert_eq!(
            JsonNodeSerializer.deserialize_node(&doc, &serialized),
            Err(DocumentError::Serialize(SerializeError::UnknownClass("Sketch".into())))
        );
        assert_eq!(doc.node_count(), before);
        assert_eq!(doc.history().undo_count(), undo_before);
    }

    #[test]
    fn from_json_string_records_nothing() {
        let doc = Document::new("d", DocumentConfig::default());
        let group = sample(&doc);
        let text = JsonNodeSerializer.to_json_string(&doc, group).unwrap();
        let before = doc.history().undo_count();

        let copy = JsonNodeSerializer.from_json_string(&doc, &text).unwrap();
        assert_eq!(doc.history().undo_count(), before);
        assert!(!doc.history().is_disabled());
        assert_eq!(doc.children(copy).len(), 1);
    }

    #[test]
    fn deserialize_keeps_sibling_order() {
        let doc = Document::new("d", DocumentConfig::default());
        let json = json!({
            "classKey": "FolderNode",
            "children": [
                { "classKey": "VisualNode", "properties": { "name": "a" } },
                { "classKey": "GroupNode", "properties": { "name": "b" },
                  "children": [ { "classKey": "VisualNode", "properties": { "name": "b1" } } ] },
                { "classKey": "VisualNode", "properties": { "name": "c" } }
            ]
        });
        let folder = JsonNodeSerializer
            .deserialize_node(&doc, &Serialized::from_json(&json).unwrap())
            .unwrap();
        let names: Vec<_> = doc
            .preorder(folder)
            .into_iter()
            .filter_map(|n| doc.name_of(n))
            .collect();
        assert_eq!(names, ["untitled", "a", "b", "b1", "c"]);

        let serialized = JsonNodeSerializer.serialize_node(&doc, folder).unwrap();
        let child_names: Vec<_> = serialized
            .children
            .iter()
            .map(|c| c.properties["name"].clone())
            .collect();
        assert_eq!(child_names, [json!("a"), json!("b"), json!("c")]);
        assert_eq!(serialized.children[1].children.len(), 1);
    }

    #[test]
    fn clone_deep_chain() {
        let doc = Document::new("d", DocumentConfig::default());
        let top = doc.create_folder("top");
        let mut parent = top;
        doc.history().without_recording(|| {
            for i in 0..5_000 {
                let child = doc.create_folder(&format!("f{i}"));
                doc.add(parent, &[child]).unwrap();
                parent = child;
            }
        });
        let before = doc.node_count();

        let undo_before = doc.history().undo_count();

        let copy = doc.clone_node(top).unwrap();
        assert_eq!(doc.node_count(), before * 2 - 1);
        assert_eq!(doc.preorder(copy).len(), 5_001);
        assert_eq!(doc.history().undo_count(), undo_before);
    }
}
