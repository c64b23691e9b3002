#![forbid(unsafe_code)]

//! Hooks into whatever renders the document.

use crate::arena::NodeId;

/// Receives display-relevant node changes.
///
/// All methods default to doing nothing.
pub trait VisualContext {
    /// The node's geometry or transform changed.
    fn redraw_node(&self, _node: NodeId) {}

    /// The nodes are gone for good.
    fn remove_node(&self, _nodes: &[NodeId]) {}

    /// Effective visibility (`visible && parentVisible`) changed.
    fn set_visible(&self, _node: NodeId, _visible: bool) {}
}

/// Context that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullVisualContext;

impl VisualContext for NullVisualContext {}
