#![forbid(unsafe_code)]

//! Typed accessors for node properties.
//!
//! Every setter goes through the node's history-aware property bag, so the
//! change is recorded and can be undone. Side effects (visibility pushed to
//! children and to the visual context, redraws on transform changes) hang
//! off the bag's change handler, which means undo and redo replay them too.

use serde_json::Map;

use crate::arena::NodeId;
use crate::document::Document;
use crate::error::{DocumentError, SerializeError};
use crate::node::{NodeKind, keys};
use crate::observable::Observable;
use crate::transaction::Transaction;
use crate::value::{Matrix4, Value};

/// Transform entries closer than this compare equal.
const TRANSFORM_TOLERANCE: f64 = 1e-9;

/// Type name stored for a custom property value.
#[must_use]
pub fn infer_custom_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        _ => "object",
    }
}

fn read_json_map(props: &Observable, key: &str) -> Result<Map<String, serde_json::Value>, DocumentError> {
    let text = if props.contains(key) {
        props.get(key).unwrap_or_default()
    } else {
        Value::Null
    };
    let Some(text) = text.as_str().filter(|t| !t.trim().is_empty()) else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<serde_json::Value>(text).map_err(SerializeError::from)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(SerializeError::InvalidProperty {
            property: key.to_owned(),
        }
        .into()),
    }
}

fn write_json_map(
    props: &Observable,
    key: &str,
    map: Map<String, serde_json::Value>,
) -> Result<bool, DocumentError> {
    let text = serde_json::to_string_pretty(&serde_json::Value::Object(map)).map_err(SerializeError::from)?;
    Ok(props.set(key, text.into()))
}

impl Document {
    fn require_props(&self, id: NodeId) -> Result<Observable, DocumentError> {
        self.properties(id).ok_or(DocumentError::NodeNotFound(id))
    }

    /// Run `f` as one history entry named `name`, unless a transaction is
    /// already collecting records or nothing is being recorded.
    fn grouped<T>(
        &self,
        name: &str,
        f: impl FnOnce() -> Result<T, DocumentError>,
    ) -> Result<T, DocumentError> {
        if self.has_active_transaction() || self.history().is_disabled() {
            return f();
        }
        Transaction::execute(self, name, |_| f())
    }

    fn bool_property(&self, id: NodeId, key: &str) -> Option<bool> {
        self.properties(id)
            .map(|props| props.get_or(key, || true.into()).as_bool().unwrap_or(true))
    }

    // ========================================================================
    // Name
    // ========================================================================

    #[must_use]
    pub fn name_of(&self, id: NodeId) -> Option<String> {
        let props = self.properties(id)?;
        props.get(keys::NAME)?.as_str().map(str::to_owned)
    }

    pub fn set_name_of(&self, id: NodeId, name: &str) -> Result<bool, DocumentError> {
        Ok(self.require_props(id)?.set(keys::NAME, name.into()))
    }

    // ========================================================================
    // Visibility
    // ========================================================================

    /// The node's own visibility flag.
    #[must_use]
    pub fn visible(&self, id: NodeId) -> Option<bool> {
        self.bool_property(id, keys::VISIBLE)
    }

    /// Show or hide a node. Descendants pick up the change through their
    /// `parentVisible` flag; all of it is one history entry.
    pub fn set_visible(&self, id: NodeId, visible: bool) -> Result<bool, DocumentError> {
        let props = self.require_props(id)?;
        self.grouped("change visible", || Ok(props.set(keys::VISIBLE, visible.into())))
    }

    /// Effective visibility of the parent chain, as pushed down by parents.
    #[must_use]
    pub fn parent_visible(&self, id: NodeId) -> Option<bool> {
        self.bool_property(id, keys::PARENT_VISIBLE)
    }

    /// Returns `false` for a stale id or an unchanged value.
    pub fn set_parent_visible(&self, id: NodeId, visible: bool) -> bool {
        self.properties(id)
            .is_some_and(|props| props.set(keys::PARENT_VISIBLE, visible.into()))
    }

    /// `visible && parentVisible`; `false` for a stale id.
    #[must_use]
    pub fn effective_visible(&self, id: NodeId) -> bool {
        self.visible(id).unwrap_or(false) && self.parent_visible(id).unwrap_or(false)
    }

    pub(crate) fn on_visibility_changed(&self, id: NodeId) {
        let visible = self.effective_visible(id);
        self.visual().set_visible(id, visible);
        for child in self.children(id) {
            self.set_parent_visible(child, visible);
        }
    }

    // ========================================================================
    // Transform
    // ========================================================================

    /// Local transform of a group node.
    #[must_use]
    pub fn transform(&self, id: NodeId) -> Option<Matrix4> {
        if self.kind(id)? != NodeKind::Group {
            return None;
        }
        let props = self.properties(id)?;
        props
            .get_or(keys::TRANSFORM, || Matrix4::identity().into())
            .as_matrix()
            .copied()
    }

    /// Set a group's transform. Nearly equal matrices are not a change.
    pub fn set_transform(&self, id: NodeId, transform: Matrix4) -> Result<bool, DocumentError> {
        let props = self.require_props(id)?;
        if self.kind(id) != Some(NodeKind::Group) {
            return Err(DocumentError::UnsupportedProperty {
                node: id,
                property: keys::TRANSFORM.to_owned(),
            });
        }
        let same = |a: &Value, b: &Value| match (a.as_matrix(), b.as_matrix()) {
            (Some(a), Some(b)) => a.approx_eq(b, TRANSFORM_TOLERANCE),
            _ => false,
        };
        Ok(props.set_with(keys::TRANSFORM, transform.into(), None, Some(&same)))
    }

    // ========================================================================
    // Custom properties
    // ========================================================================

    /// User-defined properties, stored on the node as JSON text.
    pub fn custom_properties(&self, id: NodeId) -> Result<Map<String, serde_json::Value>, DocumentError> {
        read_json_map(&self.require_props(id)?, keys::CUSTOM_PROPERTIES)
    }

    pub fn get_custom_property(
        &self,
        id: NodeId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DocumentError> {
        Ok(self.custom_properties(id)?.remove(key))
    }

    /// Set a custom property and record its inferred type. One history entry.
    pub fn set_custom_property(
        &self,
        id: NodeId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<bool, DocumentError> {
        let props = self.require_props(id)?;
        let mut values = read_json_map(&props, keys::CUSTOM_PROPERTIES)?;
        let mut types = read_json_map(&props, keys::CUSTOM_PROPERTY_TYPES)?;
        let kind = infer_custom_type(&value);
        values.insert(key.to_owned(), value);
        types.insert(key.to_owned(), kind.into());
        self.grouped("change custom property", || {
            let changed = write_json_map(&props, keys::CUSTOM_PROPERTIES, values)?;
            let typed = write_json_map(&props, keys::CUSTOM_PROPERTY_TYPES, types)?;
            Ok(changed || typed)
        })
    }

    /// Remove a custom property and its type. `false` when it was not set.
    pub fn remove_custom_property(&self, id: NodeId, key: &str) -> Result<bool, DocumentError> {
        let props = self.require_props(id)?;
        let mut values = read_json_map(&props, keys::CUSTOM_PROPERTIES)?;
        let mut types = read_json_map(&props, keys::CUSTOM_PROPERTY_TYPES)?;
        let had_value = values.remove(key).is_some();
        let had_type = types.remove(key).is_some();
        if !had_value && !had_type {
            return Ok(false);
        }
        self.grouped("remove custom property", || {
            write_json_map(&props, keys::CUSTOM_PROPERTIES, values)?;
            write_json_map(&props, keys::CUSTOM_PROPERTY_TYPES, types)?;
            Ok(true)
        })
    }

    pub fn custom_property_type(&self, id: NodeId, key: &str) -> Result<Option<String>, DocumentError> {
        let types = read_json_map(&self.require_props(id)?, keys::CUSTOM_PROPERTY_TYPES)?;
        Ok(types.get(key).and_then(|t| t.as_str()).map(str::to_owned))
    }

    /// Override the type recorded for a custom property.
    pub fn set_custom_property_type(&self, id: NodeId, key: &str, kind: &str) -> Result<bool, DocumentError> {
        let props = self.require_props(id)?;
        let mut types = read_json_map(&props, keys::CUSTOM_PROPERTY_TYPES)?;
        types.insert(key.to_owned(), kind.into());
        write_json_map(&props, keys::CUSTOM_PROPERTY_TYPES, types)
    }

    pub fn remove_custom_property_type(&self, id: NodeId, key: &str) -> Result<bool, DocumentError> {
        let props = self.require_props(id)?;
        let mut types = read_json_map(&props, keys::CUSTOM_PROPERTY_TYPES)?;
        if types.remove(key).is_none() {
            return Ok(false);
        }
        write_json_map(&props, keys::CUSTOM_PROPERTY_TYPES, types)
    }
}
