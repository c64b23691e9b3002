#![forbid(unsafe_code)]

//! The document: node arena, history, transaction slot and observers.
//!
//! # Design
//!
//! [`Document`] is a cheap `Rc` handle; every method takes `&self`. The
//! arena behind it owns every node. Structural operations live in
//! [`crate::tree`], node property accessors in [`crate::properties`].
//!
//! # Invariants
//!
//! 1. No arena borrow is held while user code runs (observers, property
//!    handlers, records). Operations copy what they need out of the arena
//!    first.
//! 2. At most one transaction is active; the slot is owned here.
//! 3. The document's `name` mirrors the root node's `name`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, info};

use crate::arena::{Arena, NodeId};
use crate::config::{DocumentConfig, DocumentMode};
use crate::error::DocumentError;
use crate::history::{ArrayRecord, History, Record};
use crate::layer::{DEFAULT_LAYER_COLOR, DEFAULT_LAYER_NAME, Layer, LayerChange, LayerRecord};
use crate::node::{NodeAction, NodeChangedObserver, NodeKind, NodeLinkedListRecord, NodeRecord, keys};
use crate::observable::Observable;
use crate::tracked::RecordSink;
use crate::transaction::Transaction;
use crate::value::Value;
use crate::visual::{NullVisualContext, VisualContext};

/// New random identifier, as used for documents, nodes and layers.
#[must_use]
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Arena slot for one node.
pub(crate) struct NodeSlot {
    pub(crate) uid: String,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) previous: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) count: usize,
    pub(crate) props: Observable,
}

/// Snapshot of a node's identity and links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub uid: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub previous_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub count: usize,
}

pub(crate) struct DocumentInner {
    id: String,
    mode: DocumentMode,
    this: Weak<DocumentInner>,
    props: Observable,
    pub(crate) nodes: RefCell<Arena<NodeSlot>>,
    root: Cell<Option<NodeId>>,
    history: History,
    transaction: RefCell<Option<ArrayRecord>>,
    node_observers: RefCell<Vec<Rc<dyn NodeChangedObserver>>>,
    layers: RefCell<Vec<Layer>>,
    layer_snapshot: RefCell<Option<Vec<(String, bool)>>>,
    pub(crate) visual: Rc<dyn VisualContext>,
    disposed: Cell<bool>,
}

impl RecordSink for DocumentInner {
    fn add_record(&self, record: Box<dyn Record>) {
        if let Some(inner) = self.this.upgrade() {
            Transaction::add(&Document { inner }, record);
        }
    }
}

/// A scene graph with undo history. See the module docs.
#[derive(Clone)]
pub struct Document {
    pub(crate) inner: Rc<DocumentInner>,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .field("nodes", &self.inner.nodes.borrow().len())
            .field("history", &self.inner.history)
            .finish()
    }
}

/// Non-owning document handle.
#[derive(Clone)]
pub struct WeakDocument(Weak<DocumentInner>);

impl WeakDocument {
    #[must_use]
    pub fn upgrade(&self) -> Option<Document> {
        self.0.upgrade().map(|inner| Document { inner })
    }
}

impl Document {
    /// New document whose root folder is named `name`.
    #[must_use]
    pub fn new(name: &str, config: DocumentConfig) -> Self {
        Self::with_visual(name, config, Rc::new(NullVisualContext))
    }

    #[must_use]
    pub fn with_visual(name: &str, config: DocumentConfig, visual: Rc<dyn VisualContext>) -> Self {
        Self::with_id(generate_id(), name, config, visual)
    }

    #[must_use]
    pub fn with_id(
        id: String,
        name: &str,
        config: DocumentConfig,
        visual: Rc<dyn VisualContext>,
    ) -> Self {
        let config = config.validated();
        let inner = Rc::new_cyclic(|this| DocumentInner {
            id,
            mode: config.mode,
            this: this.clone(),
            props: Observable::new(),
            nodes: RefCell::new(Arena::new()),
            root: Cell::new(None),
            history: History::new(config.history_capacity),
            transaction: RefCell::new(None),
            node_observers: RefCell::new(Vec::new()),
            layers: RefCell::new(Vec::new()),
            layer_snapshot: RefCell::new(None),
            visual,
            disposed: Cell::new(false),
        });
        let doc = Self { inner };
        doc.inner.props.set_private("name", name.into());
        doc.inner.props.set_private("mode", config.mode.as_str().into());

        let layer = Layer::new(doc.record_sink(), generate_id(), DEFAULT_LAYER_NAME, DEFAULT_LAYER_COLOR);
        doc.inner
            .props
            .set_private("currentLayerId", layer.id().into());
        doc.inner.layers.borrow_mut().push(layer);

        let root = doc.create_node(NodeKind::Folder, name);
        doc.set_root(root);
        info!(document = %doc.inner.id, name, "new document");
        doc
    }

    fn set_root(&self, root: NodeId) {
        self.inner.root.set(Some(root));
        let Some(props) = self.properties(root) else {
            return;
        };
        let weak = self.downgrade();
        props.on_property_changed(move |e| {
            if e.property != keys::NAME {
                return;
            }
            if let Some(doc) = weak.upgrade()
                && let Some(name) = e.source.get(keys::NAME)
            {
                doc.inner.props.set("name", name);
            }
        });
    }

    /// Stable identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn mode(&self) -> DocumentMode {
        self.inner.mode
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakDocument {
        WeakDocument(Rc::downgrade(&self.inner))
    }

    /// Sink that routes records into this document's transaction or history.
    #[must_use]
    pub fn record_sink(&self) -> Weak<dyn RecordSink> {
        let weak: Weak<DocumentInner> = Rc::downgrade(&self.inner);
        weak
    }

    /// Document-level properties (`name`, `mode`, `currentLayerId`).
    #[must_use]
    pub fn properties_bag(&self) -> &Observable {
        &self.inner.props
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.inner
            .props
            .get("name")
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default()
    }

    /// Rename the document. The root node follows (recorded in history).
    pub fn set_name(&self, name: &str) -> bool {
        if !self.inner.props.set("name", name.into()) {
            return false;
        }
        if let Some(root) = self.root_node()
            && let Some(props) = self.properties(root)
        {
            props.set(keys::NAME, name.into());
        }
        true
    }

    #[must_use]
    pub fn root_node(&self) -> Option<NodeId> {
        self.inner.root.get()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.inner.history
    }

    pub(crate) fn transaction_slot(&self) -> &RefCell<Option<ArrayRecord>> {
        &self.inner.transaction
    }

    #[must_use]
    pub fn has_active_transaction(&self) -> bool {
        self.inner.transaction.borrow().is_some()
    }

    /// Name of the active transaction, if any.
    #[must_use]
    pub fn active_transaction(&self) -> Option<String> {
        self.inner
            .transaction
            .borrow()
            .as_ref()
            .map(|group| group.name().to_owned())
    }

    #[must_use]
    pub fn visual(&self) -> &Rc<dyn VisualContext> {
        &self.inner.visual
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn add_node_observer(&self, observer: Rc<dyn NodeChangedObserver>) {
        let mut observers = self.inner.node_observers.borrow_mut();
        if !observers.iter().any(|o| Rc::ptr_eq(o, &observer)) {
            observers.push(observer);
        }
    }

    pub fn remove_node_observer(&self, observer: &Rc<dyn NodeChangedObserver>) -> bool {
        let mut observers = self.inner.node_observers.borrow_mut();
        let before = observers.len();
        observers.retain(|o| !Rc::ptr_eq(o, observer));
        observers.len() != before
    }

    #[must_use]
    pub fn node_observer_count(&self) -> usize {
        self.inner.node_observers.borrow().len()
    }

    /// Record a structural batch and tell every node observer about it.
    /// Empty batches are ignored.
    pub fn notify_node_changed(&self, records: Vec<NodeRecord>) {
        if records.is_empty() {
            return;
        }
        Transaction::add(self, Box::new(NodeLinkedListRecord::new(records.clone())));
        for observer in self.node_observer_snapshot() {
            observer.handle_node_changed(self, &records);
        }
    }

    fn node_observer_snapshot(&self) -> Vec<Rc<dyn NodeChangedObserver>> {
        self.inner.node_observers.borrow().iter().cloned().collect()
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Create an unattached node. Empty names become `untitled`.
    pub fn create_node(&self, kind: NodeKind, name: &str) -> NodeId {
        self.create_node_with_id(kind, name, generate_id())
    }

    pub fn create_node_with_id(&self, kind: NodeKind, name: &str, uid: String) -> NodeId {
        let props = Observable::with_history(self.record_sink());
        let name = if name.is_empty() { "untitled" } else { name };
        props.set_private(keys::NAME, name.into());
        props.set_private(keys::VISIBLE, true.into());
        props.set_private(keys::PARENT_VISIBLE, true.into());
        if kind == NodeKind::Group {
            props.set_private(keys::TRANSFORM, crate::value::Matrix4::identity().into());
        }

        let id = self.inner.nodes.borrow_mut().insert(NodeSlot {
            uid,
            kind,
            parent: None,
            previous: None,
            next: None,
            first_child: None,
            last_child: None,
            count: 0,
            props: props.clone(),
        });
        self.install_node_handler(id, &props);
        debug!(node = %id, ?kind, name, "node created");
        id
    }

    pub fn create_folder(&self, name: &str) -> NodeId {
        self.create_node(NodeKind::Folder, name)
    }

    pub fn create_group(&self, name: &str) -> NodeId {
        self.create_node(NodeKind::Group, name)
    }

    pub fn create_visual(&self, name: &str) -> NodeId {
        self.create_node(NodeKind::Visual, name)
    }

    fn install_node_handler(&self, id: NodeId, props: &Observable) {
        let weak = self.downgrade();
        props.on_property_changed(move |e| {
            let Some(doc) = weak.upgrade() else {
                return;
            };
            match e.property {
                keys::VISIBLE | keys::PARENT_VISIBLE => doc.on_visibility_changed(id),
                keys::TRANSFORM => doc.inner.visual.redraw_node(id),
                _ => {}
            }
        });
    }

    /// Append unattached nodes to the root.
    pub fn add_node(&self, nodes: &[NodeId]) -> Result<(), DocumentError> {
        let root = self
            .root_node()
            .ok_or_else(|| DocumentError::Disposed(self.inner.id.clone()))?;
        self.add(root, nodes)
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.nodes.borrow().contains(id)
    }

    /// Snapshot of the node's links.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<NodeInfo> {
        let nodes = self.inner.nodes.borrow();
        let slot = nodes.get(id)?;
        Some(NodeInfo {
            id,
            uid: slot.uid.clone(),
            kind: slot.kind,
            parent: slot.parent,
            previous_sibling: slot.previous,
            next_sibling: slot.next,
            first_child: slot.first_child,
            last_child: slot.last_child,
            count: slot.count,
        })
    }

    /// The node's stable string id.
    #[must_use]
    pub fn uid(&self, id: NodeId) -> Option<String> {
        self.inner.nodes.borrow().get(id).map(|s| s.uid.clone())
    }

    /// Resolve a stable string id. Linear in the number of nodes.
    #[must_use]
    pub fn find_by_uid(&self, uid: &str) -> Option<NodeId> {
        let nodes = self.inner.nodes.borrow();
        nodes
            .ids()
            .into_iter()
            .find(|id| nodes.get(*id).is_some_and(|s| s.uid == uid))
    }

    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.inner.nodes.borrow().get(id).map(|s| s.kind)
    }

    #[must_use]
    pub fn is_container(&self, id: NodeId) -> bool {
        self.kind(id).is_some_and(NodeKind::is_container)
    }

    /// The node's property bag.
    #[must_use]
    pub fn properties(&self, id: NodeId) -> Option<Observable> {
        self.inner.nodes.borrow().get(id).map(|s| s.props.clone())
    }

    /// Number of live nodes, attached or not.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.nodes.borrow().len()
    }

    /// Dispose `id` and its whole subtree.
    ///
    /// An attached node is unlinked from its parent first. Observers see
    /// that as a `Remove` batch which is not recorded. Children are disposed
    /// before their parent, and observers then get the freed ids. Returns
    /// `false` for a stale id.
    pub fn dispose_node(&self, id: NodeId) -> bool {
        let detached = {
            let mut nodes = self.inner.nodes.borrow_mut();
            if !nodes.contains(id) {
                return false;
            }
            let (parent, previous) = (nodes[id].parent, nodes[id].previous);
            parent.map(|parent| {
                crate::tree::unlink(&mut nodes, id);
                NodeRecord::new(NodeAction::Remove, id).with_old(parent, previous)
            })
        };
        if let Some(record) = detached {
            let records = [record];
            for observer in self.node_observer_snapshot() {
                observer.handle_node_changed(self, &records);
            }
        }

        let disposed = {
            let mut nodes = self.inner.nodes.borrow_mut();
            if !nodes.contains(id) {
                return true;
            }
            // an observer may have linked it again
            if nodes[id].parent.is_some() {
                crate::tree::unlink(&mut nodes, id);
            }

            // post-order: a node is freed only after all of its children
            let mut stack = vec![(id, false)];
            let mut disposed = Vec::new();
            while let Some((node, expanded)) = stack.pop() {
                if expanded {
                    if let Some(slot) = nodes.remove(node) {
                        disposed.push((node, slot));
                    }
                    continue;
                }
                stack.push((node, true));
                let mut child = nodes[node].last_child;
                while let Some(c) = child {
                    child = nodes[c].previous;
                    stack.push((c, false));
                }
            }
            disposed
        };

        let ids: Vec<NodeId> = disposed.iter().map(|(node, _)| *node).collect();
        for (node, slot) in disposed {
            debug!(node = %node, uid = %slot.uid, "node disposed");
            slot.props.dispose();
        }
        if self.inner.root.get() == Some(id) {
            self.inner.root.set(None);
        }
        self.inner.visual.remove_node(&ids);
        for observer in self.node_observer_snapshot() {
            observer.handle_nodes_disposed(self, &ids);
        }
        true
    }

    // ========================================================================
    // Layers
    // ========================================================================

    #[must_use]
    pub fn layers(&self) -> Vec<Layer> {
        self.inner.layers.borrow().clone()
    }

    #[must_use]
    pub fn layer(&self, id: &str) -> Option<Layer> {
        self.inner
            .layers
            .borrow()
            .iter()
            .find(|l| l.id() == id)
            .cloned()
    }

    /// Append a layer (recorded).
    pub fn add_layer(&self, name: &str, color: &str) -> Layer {
        let layer = Layer::new(self.record_sink(), generate_id(), name, color);
        let index = self.inner.layers.borrow().len();
        self.insert_layer(index, layer.clone());
        Transaction::add(
            self,
            Box::new(LayerRecord {
                change: LayerChange::Added,
                layer: layer.clone(),
                index,
            }),
        );
        layer
    }

    /// Remove a layer (recorded). The current layer falls back to the first
    /// remaining one when it was removed.
    pub fn remove_layer(&self, id: &str) -> Option<Layer> {
        let (index, layer) = {
            let mut layers = self.inner.layers.borrow_mut();
            let index = layers.iter().position(|l| l.id() == id)?;
            (index, layers.remove(index))
        };
        Transaction::add(
            self,
            Box::new(LayerRecord {
                change: LayerChange::Removed,
                layer: layer.clone(),
                index,
            }),
        );
        if self.stored_current_layer_id().as_deref() == Some(id) {
            let first = self.inner.layers.borrow().first().map(|l| l.id().to_owned());
            self.set_current_layer_id(first.as_deref());
        }
        Some(layer)
    }

    pub(crate) fn insert_layer(&self, index: usize, layer: Layer) {
        {
            let mut layers = self.inner.layers.borrow_mut();
            let index = index.min(layers.len());
            layers.insert(index, layer);
        }
        if self.stored_current_layer_id().is_none() {
            let first = self.inner.layers.borrow().first().map(|l| l.id().to_owned());
            self.set_current_layer_id(first.as_deref());
        }
    }

    fn stored_current_layer_id(&self) -> Option<String> {
        self.inner
            .props
            .get_or("currentLayerId", || Value::Null)
            .as_str()
            .map(str::to_owned)
    }

    /// Current layer id, falling back to the first layer.
    #[must_use]
    pub fn current_layer_id(&self) -> Option<String> {
        match self.stored_current_layer_id() {
            Some(id) if self.layer(&id).is_some() => Some(id),
            _ => self.inner.layers.borrow().first().map(|l| l.id().to_owned()),
        }
    }

    pub fn set_current_layer_id(&self, id: Option<&str>) -> bool {
        self.inner
            .props
            .set("currentLayerId", id.map(str::to_owned).into())
    }

    #[must_use]
    pub fn is_layer_isolated(&self) -> bool {
        self.inner.layer_snapshot.borrow().is_some()
    }

    /// Show only `layer_id`. The visibility before the first isolation is
    /// kept for [`Document::unisolate_layer`]. Not recorded.
    pub fn isolate_layer(&self, layer_id: &str) {
        let layers = self.layers();
        {
            let mut snapshot = self.inner.layer_snapshot.borrow_mut();
            if snapshot.is_none() {
                *snapshot = Some(
                    layers
                        .iter()
                        .map(|l| (l.id().to_owned(), l.visible()))
                        .collect(),
                );
            }
        }
        self.history().without_recording(|| {
            for layer in &layers {
                layer.set_visible(layer.id() == layer_id);
            }
        });
    }

    /// Restore the visibility saved by [`Document::isolate_layer`].
    pub fn unisolate_layer(&self) {
        let Some(snapshot) = self.inner.layer_snapshot.borrow_mut().take() else {
            return;
        };
        let layers = self.layers();
        self.history().without_recording(|| {
            for layer in &layers {
                if let Some((_, visible)) = snapshot.iter().find(|(id, _)| id == layer.id()) {
                    layer.set_visible(*visible);
                }
            }
        });
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Dispose history records, every node and all observers. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        info!(document = %self.inner.id, "disposing document");
        self.inner.transaction.borrow_mut().take();
        self.inner.history.dispose(self);
        self.inner.node_observers.borrow_mut().clear();

        let ids = self.inner.nodes.borrow().ids();
        for id in ids {
            self.dispose_node(id);
        }
        for layer in self.inner.layers.borrow_mut().drain(..) {
            layer.properties().dispose();
        }
        self.inner.props.dispose();
    }
}
