#![forbid(unsafe_code)]

//! Typed publish/subscribe for application-level document events.
//!
//! Cloning an [`EventBus`] shares the subscriber list. Publishing works on a
//! snapshot, so subscribers may subscribe or unsubscribe while handling an
//! event.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

/// Event published on an [`EventBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// Selected node ids of a document changed.
    SelectionChanged { document_id: String, ids: Vec<String> },
    CommandContextOpened { command: String },
    CommandContextClosed,
}

impl DocumentEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SelectionChanged { .. } => "selectionChanged",
            Self::CommandContextOpened { .. } => "openCommandContext",
            Self::CommandContextClosed => "closeCommandContext",
        }
    }
}

/// Identifies a subscription on an [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Rc<dyn Fn(&DocumentEvent)>;

#[derive(Default)]
struct BusInner {
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber)>>,
    next_id: Cell<u64>,
}

/// Shared event bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: impl Fn(&DocumentEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::new(handler)));
        id
    }

    /// Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(s, _)| *s != id);
        subscribers.len() != before
    }

    pub fn publish(&self, event: &DocumentEvent) {
        let snapshot: Vec<Subscriber> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, s)| Rc::clone(s))
            .collect();
        trace!(event = event.name(), subscribers = snapshot.len(), "publish");
        for subscriber in snapshot {
            subscriber(event);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reaches_subscribers_until_unsubscribed() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let id = bus.subscribe(move |e| s.borrow_mut().push(e.name()));

        bus.publish(&DocumentEvent::CommandContextClosed);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&DocumentEvent::CommandContextClosed);

        assert_eq!(*seen.borrow(), vec!["closeCommandContext"]);
    }

    #[test]
    fn subscriber_may_unsubscribe_during_publish() {
        let bus = EventBus::new();
        let slot = Rc::new(Cell::new(None));
        let (b, s) = (bus.clone(), Rc::clone(&slot));
        let id = bus.subscribe(move |_| {
            if let Some(id) = s.get() {
                b.unsubscribe(id);
            }
        });
        slot.set(Some(id));
        bus.publish(&DocumentEvent::CommandContextOpened {
            command: "line".into(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
