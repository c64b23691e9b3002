#![forbid(unsafe_code)]

//! Turns document activity into notification messages.
//!
//! # Design
//!
//! [`NotificationService`] listens in three places:
//!
//! - as a [`NodeChangedObserver`] on the document, for structural changes;
//! - as a property handler on every node reachable from the root, for
//!   property changes;
//! - on an [`EventBus`], for selection changes of its document.
//!
//! Each change becomes a [`NotificationEvent`] in a pending queue. The
//! [`FlushScheduler`] decides when the queue goes out: a single event is
//! sent as-is, several are wrapped in a `batch`.
//!
//! # Invariants
//!
//! - A node has at most one property handler from this service, and has one
//!   exactly while it is reachable from the root.
//! - No internal borrow is held while the transport runs.
//!
//! # Failure Modes
//!
//! A transport error drops the flushed events, attempts to send an `error`
//! message in their place and is returned to the caller. Flushes triggered
//! from inside a document callback can only log it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use cadgraph_core::{
    Document, DocumentEvent, EventBus, HandlerId, NodeChangedObserver, NodeId, NodeRecord,
    Observable, PropertyChanged, SubscriptionId, WeakDocument,
};
use tracing::{debug, info, trace, warn};
use web_time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::NotificationConfig;
use crate::error::NotifyError;
use crate::message::{NotificationEvent, NotificationMessage};
use crate::schedule::FlushScheduler;
use crate::transport::NotificationTransport;

struct ServiceInner {
    document: WeakDocument,
    document_id: String,
    config: NotificationConfig,
    transport: Rc<dyn NotificationTransport>,
    clock: Rc<dyn Clock>,
    scheduler: RefCell<FlushScheduler>,
    pending: RefCell<Vec<NotificationEvent>>,
    node_handlers: RefCell<HashMap<NodeId, (Observable, HandlerId)>>,
    observer: RefCell<Option<Rc<dyn NodeChangedObserver>>>,
    bus: RefCell<Option<(EventBus, SubscriptionId)>>,
    disposed: Cell<bool>,
}

/// Registered on the document; forwards to the service while it lives.
struct NodeWatcher(Weak<ServiceInner>);

impl NodeChangedObserver for NodeWatcher {
    fn handle_node_changed(&self, doc: &Document, records: &[NodeRecord]) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_node_changed(doc, records);
        }
    }

    fn handle_nodes_disposed(&self, _doc: &Document, ids: &[NodeId]) {
        if let Some(inner) = self.0.upgrade() {
            for id in ids {
                inner.detach(*id);
            }
        }
    }
}

// ============================================================================
// Event intake
// ============================================================================

impl ServiceInner {
    fn on_node_changed(self: &Rc<Self>, doc: &Document, records: &[NodeRecord]) {
        if self.disposed.get() {
            return;
        }
        let mut events = Vec::new();
        for record in records {
            if self.config.emit_node_changed
                && let Some(event) = node_event(doc, record)
            {
                events.push(event);
            }
            if self.config.emit_property_changed {
                self.sync_subtree(doc, record.node);
            }
        }
        self.push(events);
    }

    fn on_property_changed(&self, entity_id: &str, change: &PropertyChanged<'_>) {
        if self.disposed.get() || change.property.starts_with('_') {
            return;
        }
        let new_value = change.source.get(change.property).unwrap_or_default();
        self.push(vec![NotificationEvent::PropertyChanged {
            entity_id: entity_id.to_owned(),
            property_name: change.property.to_owned(),
            old_value: change.old_value.to_json(),
            new_value: new_value.to_json(),
        }]);
    }

    fn on_document_event(&self, event: &DocumentEvent) {
        if self.disposed.get() || !self.config.emit_selection_changed {
            return;
        }
        if let DocumentEvent::SelectionChanged { document_id, ids } = event
            && *document_id == self.document_id
        {
            self.push(vec![NotificationEvent::SelectionChanged { ids: ids.clone() }]);
        }
    }

    fn push(&self, events: Vec<NotificationEvent>) {
        if events.is_empty() {
            return;
        }
        self.pending.borrow_mut().extend(events);
        let flush_now = self.scheduler.borrow_mut().on_event(self.clock.now());
        if flush_now && let Err(err) = self.flush() {
            warn!(document = %self.document_id, error = %err, "immediate notification flush failed");
        }
    }

    // ========================================================================
    // Property handlers
    // ========================================================================

    /// Attach handlers below `node` if it is reachable from the root,
    /// detach them otherwise.
    fn sync_subtree(self: &Rc<Self>, doc: &Document, node: NodeId) {
        let attached = doc
            .root_node()
            .is_some_and(|root| root == node || doc.is_ancestor_of(root, node));
        for id in doc.preorder(node) {
            if attached {
                self.attach(doc, id);
            } else {
                self.detach(id);
            }
        }
    }

    fn attach(self: &Rc<Self>, doc: &Document, id: NodeId) {
        if self.node_handlers.borrow().contains_key(&id) {
            return;
        }
        let (Some(props), Some(entity_id)) = (doc.properties(id), doc.uid(id)) else {
            return;
        };
        let weak = Rc::downgrade(self);
        let handler = props.on_property_changed(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.on_property_changed(&entity_id, change);
            }
        });
        self.node_handlers.borrow_mut().insert(id, (props, handler));
    }

    fn detach(&self, id: NodeId) {
        let entry = self.node_handlers.borrow_mut().remove(&id);
        if let Some((props, handler)) = entry {
            props.remove_property_changed(handler);
        }
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    fn flush(&self) -> Result<usize, NotifyError> {
        let events = std::mem::take(&mut *self.pending.borrow_mut());
        self.scheduler.borrow_mut().clear_deadline();
        let timestamp = self.clock.timestamp_ms();
        let Some(message) = NotificationMessage::from_events(&self.document_id, timestamp, events)
        else {
            return Ok(0);
        };
        let count = message.event.flatten().len();
        match self.transport.send(&message) {
            Ok(()) => {
                trace!(
                    document = %self.document_id,
                    event = message.event.event_type(),
                    count,
                    "notification sent"
                );
                Ok(count)
            }
            Err(err) => {
                warn!(document = %self.document_id, error = %err, count, "failed to send notification");
                let report = NotificationMessage::new(
                    &self.document_id,
                    timestamp,
                    NotificationEvent::Error {
                        message: "failed to send notification".into(),
                        detail: Some(err.to_string()),
                    },
                );
                if let Err(second) = self.transport.send(&report) {
                    debug!(error = %second, "error report was not delivered either");
                }
                Err(err.into())
            }
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(observer) = self.observer.borrow_mut().take()
            && let Some(doc) = self.document.upgrade()
        {
            doc.remove_node_observer(&observer);
        }
        if let Some((bus, id)) = self.bus.borrow_mut().take() {
            bus.unsubscribe(id);
        }
        let handlers: Vec<_> = self.node_handlers.borrow_mut().drain().collect();
        let released = handlers.len();
        for (_, (props, handler)) in handlers {
            props.remove_property_changed(handler);
        }
        self.pending.borrow_mut().clear();
        self.scheduler.borrow_mut().reset();
        info!(document = %self.document_id, released, "notification service disposed");
    }
}

fn node_event(doc: &Document, record: &NodeRecord) -> Option<NotificationEvent> {
    let uid = |id: Option<NodeId>| id.and_then(|id| doc.uid(id));
    Some(NotificationEvent::NodeChanged {
        action: record.action,
        entity_id: doc.uid(record.node)?,
        old_parent_id: uid(record.old_parent),
        old_previous_id: uid(record.old_previous),
        new_parent_id: uid(record.new_parent),
        new_previous_id: uid(record.new_previous),
    })
}

// ============================================================================
// Public handle
// ============================================================================

/// Batches the changes of one document into messages on a transport.
///
/// Dropping the service disposes it.
pub struct NotificationService {
    inner: Rc<ServiceInner>,
}

impl fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationService")
            .field("document_id", &self.inner.document_id)
            .field("pending", &self.pending_count())
            .field("tracked_nodes", &self.tracked_node_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl NotificationService {
    pub fn new(
        doc: &Document,
        transport: Rc<dyn NotificationTransport>,
        config: NotificationConfig,
    ) -> Self {
        Self::with_clock(doc, transport, Rc::new(SystemClock), config)
    }

    pub fn with_clock(
        doc: &Document,
        transport: Rc<dyn NotificationTransport>,
        clock: Rc<dyn Clock>,
        config: NotificationConfig,
    ) -> Self {
        let config = config.validated();
        let inner = Rc::new(ServiceInner {
            document: doc.downgrade(),
            document_id: doc.id().to_owned(),
            scheduler: RefCell::new(FlushScheduler::new(config.schedule_mode, config.schedule_window)),
            config,
            transport,
            clock,
            pending: RefCell::new(Vec::new()),
            node_handlers: RefCell::new(HashMap::new()),
            observer: RefCell::new(None),
            bus: RefCell::new(None),
            disposed: Cell::new(false),
        });

        let observer: Rc<dyn NodeChangedObserver> = Rc::new(NodeWatcher(Rc::downgrade(&inner)));
        doc.add_node_observer(Rc::clone(&observer));
        *inner.observer.borrow_mut() = Some(observer);

        if inner.config.emit_property_changed
            && let Some(root) = doc.root_node()
        {
            inner.sync_subtree(doc, root);
        }
        info!(
            document = %inner.document_id,
            mode = inner.config.schedule_mode.as_str(),
            window_ms = inner.config.schedule_window.as_millis() as u64,
            tracked = inner.node_handlers.borrow().len(),
            "notification service started"
        );
        Self { inner }
    }

    /// Listen for selection changes of this document on `bus`, replacing
    /// any earlier bus.
    pub fn attach_event_bus(&self, bus: &EventBus) {
        if self.inner.disposed.get() {
            return;
        }
        self.detach_event_bus();
        let weak = Rc::downgrade(&self.inner);
        let id = bus.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_document_event(event);
            }
        });
        *self.inner.bus.borrow_mut() = Some((bus.clone(), id));
    }

    /// Returns `false` when no bus was attached.
    pub fn detach_event_bus(&self) -> bool {
        let previous = self.inner.bus.borrow_mut().take();
        previous.is_some_and(|(bus, id)| bus.unsubscribe(id))
    }

    /// Flush if the scheduled deadline has passed at `now`. Returns the
    /// number of events sent.
    pub fn poll(&self, now: Instant) -> Result<usize, NotifyError> {
        self.ensure_active()?;
        if self.inner.scheduler.borrow_mut().check_deadline(now) {
            self.inner.flush()
        } else {
            Ok(0)
        }
    }

    /// Send everything pending now, regardless of the schedule.
    pub fn flush(&self) -> Result<usize, NotifyError> {
        self.ensure_active()?;
        self.inner.flush()
    }

    /// Detach from the document, the bus and every node. Pending events
    /// are discarded. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    fn ensure_active(&self) -> Result<(), NotifyError> {
        if self.inner.disposed.get() || self.inner.document.upgrade().is_none() {
            return Err(NotifyError::Inactive(self.inner.document_id.clone()));
        }
        Ok(())
    }

    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.inner.document_id
    }

    #[must_use]
    pub fn config(&self) -> &NotificationConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// When the pending events fall due, if scheduled.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.scheduler.borrow().deadline()
    }

    /// Nodes currently carrying a property handler.
    #[must_use]
    pub fn tracked_node_count(&self) -> usize {
        self.inner.node_handlers.borrow().len()
    }

    #[must_use]
    pub fn is_tracking(&self, id: NodeId) -> bool {
        self.inner.node_handlers.borrow().contains_key(&id)
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl Drop for NotificationService {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}
