#![forbid(unsafe_code)]

//! Document layers.

use std::fmt;
use std::rc::Weak;

use crate::document::Document;
use crate::error::DocumentError;
use crate::history::Record;
use crate::observable::Observable;
use crate::tracked::RecordSink;
use crate::value::Value;

pub const DEFAULT_LAYER_NAME: &str = "Layer 1";
pub const DEFAULT_LAYER_COLOR: &str = "#333333";

/// A named, colored visibility group. Clones share state.
#[derive(Clone)]
pub struct Layer {
    id: String,
    props: Observable,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("visible", &self.visible())
            .finish()
    }
}

impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.props.ptr_eq(&other.props)
    }
}

fn normalized_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        "unnamed".to_owned()
    } else {
        trimmed.to_owned()
    }
}

impl Layer {
    pub(crate) fn new(sink: Weak<dyn RecordSink>, id: String, name: &str, color: &str) -> Self {
        let props = Observable::with_history(sink);
        props.set_private("name", normalized_name(name).into());
        props.set_private("color", color.into());
        props.set_private("visible", true.into());
        props.set_private("locked", false.into());
        Self { id, props }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The layer's property bag.
    #[must_use]
    pub fn properties(&self) -> &Observable {
        &self.props
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.text("name")
    }

    /// Blank names become `unnamed`.
    pub fn set_name(&self, name: &str) -> bool {
        self.props.set("name", normalized_name(name).into())
    }

    #[must_use]
    pub fn color(&self) -> String {
        self.text("color")
    }

    pub fn set_color(&self, color: &str) -> bool {
        self.props.set("color", color.into())
    }

    #[must_use]
    pub fn visible(&self) -> bool {
        self.props
            .get_or("visible", || true.into())
            .as_bool()
            .unwrap_or(true)
    }

    pub fn set_visible(&self, visible: bool) -> bool {
        self.props.set("visible", visible.into())
    }

    #[must_use]
    pub fn locked(&self) -> bool {
        self.props
            .get_or("locked", || false.into())
            .as_bool()
            .unwrap_or(false)
    }

    pub fn set_locked(&self, locked: bool) -> bool {
        self.props.set("locked", locked.into())
    }

    fn text(&self, key: &str) -> String {
        self.props
            .get_or(key, || Value::Text(String::new()))
            .as_str()
            .unwrap_or_default()
            .to_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LayerChange {
    Added,
    Removed,
}

/// Inverse of adding or removing a layer.
pub(crate) struct LayerRecord {
    pub(crate) change: LayerChange,
    pub(crate) layer: Layer,
    pub(crate) index: usize,
}

impl Record for LayerRecord {
    fn name(&self) -> &str {
        "LayerChanged"
    }

    fn undo(&mut self, doc: &Document) -> Result<(), DocumentError> {
        match self.change {
            LayerChange::Added => {
                doc.remove_layer(self.layer.id());
            }
            LayerChange::Removed => doc.insert_layer(self.index, self.layer.clone()),
        }
        Ok(())
    }

    fn redo(&mut self, doc: &Document) -> Result<(), DocumentError> {
        match self.change {
            LayerChange::Added => doc.insert_layer(self.index, self.layer.clone()),
            LayerChange::Removed => {
                doc.remove_layer(self.layer.id());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentConfig;

    #[test]
    fn document_starts_with_default_layer() {
        let doc = Document::new("layers", DocumentConfig::default());
        let layers = doc.layers();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].name(), DEFAULT_LAYER_NAME);
        assert_eq!(layers[0].color(), DEFAULT_LAYER_COLOR);
        assert_eq!(doc.current_layer_id().as_deref(), Some(layers[0].id()));
    }

    #[test]
    fn add_and_remove_are_undoable() {
        let doc = Document::new("layers", DocumentConfig::default());
        let layer = doc.add_layer("walls", "#ff0000");
        assert_eq!(doc.layers().len(), 2);

        doc.history().undo(&doc).unwrap();
        assert_eq!(doc.layers().len(), 1);
        doc.history().redo(&doc).unwrap();
        assert_eq!(doc.layers()[1], layer);

        assert!(doc.remove_layer(layer.id()).is_some());
        assert_eq!(doc.layers().len(), 1);
        doc.history().undo(&doc).unwrap();
        assert_eq!(doc.layers().len(), 2);
    }

    #[test]
    fn removing_current_layer_falls_back_to_first() {
        let doc = Document::new("layers", DocumentConfig::default());
        let walls = doc.add_layer("walls", "#ff0000");
        doc.set_current_layer_id(Some(walls.id()));
        doc.remove_layer(walls.id());
        let first = doc.layers()[0].id().to_owned();
        assert_eq!(doc.current_layer_id(), Some(first));
    }

    #[test]
    fn layer_property_changes_are_recorded() {
        let doc = Document::new("layers", DocumentConfig::default());
        let layer = doc.layers()[0].clone();
        layer.set_name("  ");
        assert_eq!(layer.name(), "unnamed");
        doc.history().undo(&doc).unwrap();
        assert_eq!(layer.name(), DEFAULT_LAYER_NAME);
    }

    #[test]
    fn isolate_and_restore_without_history() {
        let doc = Document::new("layers", DocumentConfig::default());
        let first = doc.layers()[0].clone();
        let walls = doc.add_layer("walls", "#ff0000");
        walls.set_visible(false);
        let before = doc.history().undo_count();

        doc.isolate_layer(first.id());
        assert!(doc.is_layer_isolated());
        assert!(first.visible());
        assert!(!walls.visible());
        doc.isolate_layer(walls.id());
        assert!(walls.visible());
        assert!(!first.visible());

        doc.unisolate_layer();
        assert!(!doc.is_layer_isolated());
        assert!(first.visible());
        assert!(!walls.visible());
        assert_eq!(doc.history().undo_count(), before);
    }
}
