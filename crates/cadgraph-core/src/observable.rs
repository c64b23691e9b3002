#![forbid(unsafe_code)]

//! Observable property store with change notification.
//!
//! # Design
//!
//! [`Observable`] is a shared, reference-counted bag of named [`Value`]s.
//! Cloning the handle shares the store: both handles see the same values
//! and the same handlers. A successful [`Observable::set`] stores the value,
//! runs the caller's `on_changed` callback, forwards a history record when
//! the store is history-aware (see [`crate::tracked`]), and finally emits a
//! [`PropertyChanged`] to every handler in registration order.
//!
//! # Invariants
//!
//! 1. `set` returning `false` means nothing was stored, no callback ran and
//!    no handler was invoked.
//! 2. Handlers are notified in registration order.
//! 3. Emission works on a snapshot of the handler list, so a handler may
//!    set properties, add handlers or remove handlers re-entrantly.
//!
//! # Failure Modes
//!
//! - **Missing key**: [`Observable::get`] logs a warning and returns `None`.
//! - **Use after dispose**: values can still be read and written, but no
//!   handler is registered any more and no history is recorded.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::tracked::RecordSink;
use crate::value::Value;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a handler registered with [`Observable::on_property_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Payload delivered to property handlers.
pub struct PropertyChanged<'a> {
    pub property: &'a str,
    pub source: &'a Observable,
    pub old_value: &'a Value,
}

/// A registered property handler.
pub type PropertyChangedHandler = Rc<dyn Fn(&PropertyChanged<'_>)>;

/// Caller callback run between storing a value and emitting the change.
pub type OnChanged<'a> = &'a dyn Fn(&str, &Value);

/// Custom equality used to decide whether a set is a no-op.
pub type Equality<'a> = &'a dyn Fn(&Value, &Value) -> bool;

pub(crate) struct ObservableInner {
    id: u64,
    values: RefCell<Vec<(String, Value)>>,
    handlers: RefCell<SmallVec<[(HandlerId, PropertyChangedHandler); 4]>>,
    next_handler: Cell<u64>,
    disposed: Cell<bool>,
    pub(crate) sink: RefCell<Option<Weak<dyn RecordSink>>>,
}

/// Shared property store. See the module docs.
pub struct Observable {
    pub(crate) inner: Rc<ObservableInner>,
}

impl Clone for Observable {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Default for Observable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("properties", &self.inner.values.borrow().len())
            .field("handler_count", &self.handler_count())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

impl Observable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
                values: RefCell::new(Vec::new()),
                handlers: RefCell::new(SmallVec::new()),
                next_handler: Cell::new(0),
                disposed: Cell::new(false),
                sink: RefCell::new(None),
            }),
        }
    }

    /// Process-unique identity of the shared store.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether two handles share the same store.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn raw(&self, key: &str) -> Option<Value> {
        self.inner
            .values
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn store(&self, key: &str, value: Value) {
        let mut values = self.inner.values.borrow_mut();
        if let Some(slot) = values.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            values.push((key.to_owned(), value));
        }
    }

    /// Stored value for `key`. Logs a warning when the key was never set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = self.raw(key);
        if value.is_none() {
            warn!(object = self.inner.id, property = key, "property has not been set");
        }
        value
    }

    /// Stored value for `key`, storing `default` first when absent.
    pub fn get_or(&self, key: &str, default: impl FnOnce() -> Value) -> Value {
        if let Some(value) = self.raw(key) {
            return value;
        }
        let value = default();
        self.store(key, value.clone());
        value
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.values.borrow().iter().any(|(k, _)| k == key)
    }

    /// Property names in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .values
            .borrow()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Snapshot of every stored property in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner.values.borrow().clone()
    }

    /// Store `value` without emitting or recording anything.
    pub fn set_private(&self, key: &str, value: Value) {
        self.store(key, value);
    }

    /// Set with default equality and no callback. Returns whether the value
    /// changed.
    pub fn set(&self, key: &str, value: Value) -> bool {
        self.set_with(key, value, None, None)
    }

    /// Set `key` to `value`.
    ///
    /// `equality` defaults to `==`. When the values differ the new value is
    /// stored, `on_changed(key, old)` runs, the change is recorded (history
    /// aware stores only) and handlers are notified.
    pub fn set_with(
        &self,
        key: &str,
        value: Value,
        on_changed: Option<OnChanged<'_>>,
        equality: Option<Equality<'_>>,
    ) -> bool {
        let old = self.raw(key).unwrap_or_default();
        let same = match equality {
            Some(eq) => eq(&old, &value),
            None => old == value,
        };
        if same {
            return false;
        }

        self.store(key, value.clone());
        if let Some(callback) = on_changed {
            callback(key, &old);
        }
        self.record_change(key, &old, &value);
        self.emit(key, &old);
        true
    }

    /// Notify every handler that `key` changed from `old_value`.
    pub fn emit(&self, key: &str, old_value: &Value) {
        let snapshot: SmallVec<[PropertyChangedHandler; 4]> = self
            .inner
            .handlers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        trace!(
            object = self.inner.id,
            property = key,
            handlers = snapshot.len(),
            "property changed"
        );
        let event = PropertyChanged {
            property: key,
            source: self,
            old_value,
        };
        for handler in snapshot {
            handler(&event);
        }
    }

    /// Register a handler. Handlers run in registration order.
    pub fn on_property_changed(&self, handler: impl Fn(&PropertyChanged<'_>) + 'static) -> HandlerId {
        let id = HandlerId(self.inner.next_handler.get());
        self.inner.next_handler.set(id.0 + 1);
        self.inner.handlers.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` when it was not registered.
    pub fn remove_property_changed(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    pub fn clear_property_changed(&self) {
        self.inner.handlers.borrow_mut().clear();
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.borrow().len()
    }

    /// Drop every handler, the history back-reference and the stored
    /// values. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.clear_property_changed();
        self.detach_history();
        // values may hold observables that point back here
        let values = std::mem::take(&mut *self.inner.values.borrow_mut());
        drop(values);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}
