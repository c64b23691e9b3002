#![forbid(unsafe_code)]

//! Transitive property observation.
//!
//! # Design
//!
//! A deep registration follows every [`Value::Object`] reachable from a root
//! [`Observable`] through public properties (keys not starting with `_`) and
//! reports each change with a dot-joined path such as `"frame.origin.x"`.
//! The set of tracked `(source, prefix)` pairs is updated as the object
//! graph changes shape:
//!
//! 1. A property set to `Null` drops every subscription under its path and
//!    the handler is not called.
//! 2. A property set to a new observable subscribes the new subtree first,
//!    then prunes the old one.
//! 3. Any other value prunes the old subtree and reports the change.
//!
//! Handlers registered on sources hold the registration weakly, so dropping
//! a [`DeepSubscription`] (or removing it from a [`DeepObserver`]) is all it
//! takes to stop delivery.
//!
//! # Invariants
//!
//! 1. A source is tracked at most once per registration.
//! 2. Path matching is per segment: pruning `"a"` leaves `"ab"` alone.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::error::ObserveError;
use crate::observable::{HandlerId, Observable};
use crate::value::Value;

/// A change seen by a deep handler.
pub struct DeepChange<'a> {
    /// Dot-joined path from the root to the changed property.
    pub path: &'a str,
    /// The observed root.
    pub root: &'a Observable,
    pub old_value: &'a Value,
}

/// Handler for [`DeepChange`]s. Identity (`Rc::ptr_eq`) is what
/// [`DeepObserver::remove_deep_property_changed_handler`] matches on.
pub type DeepHandler = Rc<dyn Fn(&DeepChange<'_>)>;

struct Tracked {
    source: Observable,
    prefix: String,
    handler: HandlerId,
}

struct DeepState {
    root: Observable,
    handler: DeepHandler,
    tracked: RefCell<Vec<Tracked>>,
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

fn is_within(candidate: &str, prefix: &str) -> bool {
    candidate
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

fn current_value(source: &Observable, key: &str) -> Value {
    if source.contains(key) {
        source.get(key).unwrap_or_default()
    } else {
        Value::Null
    }
}

impl DeepState {
    fn is_tracking(&self, source: &Observable) -> bool {
        self.tracked.borrow().iter().any(|t| t.source.ptr_eq(source))
    }

    /// Subscribe `source` under `prefix` and everything observable below it.
    fn subscribe(self: &Rc<Self>, source: &Observable, prefix: String) {
        let mut pending = vec![(source.clone(), prefix)];
        while let Some((source, prefix)) = pending.pop() {
            if self.is_tracking(&source) {
                continue;
            }
            let weak = Rc::downgrade(self);
            let captured = prefix.clone();
            let handler = source.on_property_changed(move |e| {
                if let Some(state) = weak.upgrade() {
                    state.dispatch(e.source, &captured, e.property, e.old_value);
                }
            });
            for (key, value) in source.entries() {
                if key.starts_with('_') {
                    continue;
                }
                if let Value::Object(child) = value {
                    pending.push((child, join(&prefix, &key)));
                }
            }
            self.tracked.borrow_mut().push(Tracked {
                source,
                prefix,
                handler,
            });
        }
    }

    /// Handler ids of every tracked source at or below `prefix`.
    fn subtree(&self, prefix: &str) -> Vec<(Observable, HandlerId)> {
        self.tracked
            .borrow()
            .iter()
            .filter(|t| is_within(&t.prefix, prefix))
            .map(|t| (t.source.clone(), t.handler))
            .collect()
    }

    fn prune(&self, entries: &[(Observable, HandlerId)]) {
        for (source, handler) in entries {
            source.remove_property_changed(*handler);
        }
        self.tracked
            .borrow_mut()
            .retain(|t| !entries.iter().any(|(s, h)| s.ptr_eq(&t.source) && *h == t.handler));
    }

    fn dispatch(self: &Rc<Self>, source: &Observable, source_prefix: &str, property: &str, old_value: &Value) {
        if property.starts_with('_') {
            return;
        }
        let prefix = join(source_prefix, property);
        let old_subtree = self.subtree(&prefix);
        let value = current_value(source, property);
        trace!(path = %prefix, pruned = old_subtree.len(), "deep property changed");

        match value {
            Value::Null => {
                self.prune(&old_subtree);
                return;
            }
            Value::Object(child) => {
                // the new object may already be tracked as part of the old subtree
                let keep: Vec<(Observable, HandlerId)> = old_subtree
                    .into_iter()
                    .filter(|(s, _)| !s.ptr_eq(&child))
                    .collect();
                self.prune(&keep);
                self.subscribe(&child, prefix.clone());
            }
            _ => self.prune(&old_subtree),
        }

        let handler = Rc::clone(&self.handler);
        handler(&DeepChange {
            path: &prefix,
            root: &self.root,
            old_value,
        });
    }

    fn teardown(&self) {
        let tracked = std::mem::take(&mut *self.tracked.borrow_mut());
        for t in tracked {
            t.source.remove_property_changed(t.handler);
        }
    }
}

// ============================================================================
// Owned registration
// ============================================================================

/// An owned deep registration. Dropping it unsubscribes.
pub struct DeepSubscription {
    state: Option<Rc<DeepState>>,
}

impl fmt::Debug for DeepSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepSubscription")
            .field("tracked", &self.tracked_paths().len())
            .finish()
    }
}

impl DeepSubscription {
    fn new(root: &Observable, handler: DeepHandler) -> Self {
        let state = Rc::new(DeepState {
            root: root.clone(),
            handler,
            tracked: RefCell::new(Vec::new()),
        });
        state.subscribe(root, String::new());
        Self { state: Some(state) }
    }

    /// Prefixes currently tracked; the root is `""`.
    #[must_use]
    pub fn tracked_paths(&self) -> Vec<String> {
        self.state.as_ref().map_or_else(Vec::new, |state| {
            state.tracked.borrow().iter().map(|t| t.prefix.clone()).collect()
        })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(state) = self.state.take() {
            state.teardown();
        }
    }
}

impl Drop for DeepSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ============================================================================
// Registry
// ============================================================================

struct Registration {
    instance: Observable,
    handler: DeepHandler,
    subscription: DeepSubscription,
}

/// Registry of deep handlers keyed by `(instance, handler)`.
///
/// Several independent handlers may watch the same instance.
#[derive(Default)]
pub struct DeepObserver {
    registrations: RefCell<Vec<Registration>>,
}

impl fmt::Debug for DeepObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepObserver")
            .field("registrations", &self.registrations.borrow().len())
            .finish()
    }
}

impl DeepObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Owned registration outside any registry.
    pub fn observe(instance: &Observable, handler: impl Fn(&DeepChange<'_>) + 'static) -> DeepSubscription {
        DeepSubscription::new(instance, Rc::new(handler))
    }

    /// Watch `instance` and everything below it. Registering the same pair
    /// twice is a no-op.
    pub fn add_deep_property_changed_handler(&self, instance: &Observable, handler: DeepHandler) {
        if self.position(instance, &handler).is_some() {
            return;
        }
        let subscription = DeepSubscription::new(instance, Rc::clone(&handler));
        self.registrations.borrow_mut().push(Registration {
            instance: instance.clone(),
            handler,
            subscription,
        });
    }

    /// Tear down every subscription of the pair. `false` when not registered.
    pub fn remove_deep_property_changed_handler(&self, instance: &Observable, handler: &DeepHandler) -> bool {
        let Some(index) = self.position(instance, handler) else {
            return false;
        };
        let registration = self.registrations.borrow_mut().remove(index);
        drop(registration);
        true
    }

    /// Number of deep handlers on `instance`.
    #[must_use]
    pub fn handler_count(&self, instance: &Observable) -> usize {
        self.registrations
            .borrow()
            .iter()
            .filter(|r| r.instance.ptr_eq(instance))
            .count()
    }

    /// Prefixes tracked for the pair, empty when not registered.
    #[must_use]
    pub fn tracked_sources(&self, instance: &Observable, handler: &DeepHandler) -> Vec<String> {
        self.position(instance, handler)
            .map(|index| self.registrations.borrow()[index].subscription.tracked_paths())
            .unwrap_or_default()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let registrations = std::mem::take(&mut *self.registrations.borrow_mut());
        drop(registrations);
    }

    fn position(&self, instance: &Observable, handler: &DeepHandler) -> Option<usize> {
        self.registrations
            .borrow()
            .iter()
            .position(|r| r.instance.ptr_eq(instance) && Rc::ptr_eq(&r.handler, handler))
    }
}

/// Resolve a dotted path below `instance`.
///
/// Every segment but the last must hold an observable; the last may hold
/// anything, and a missing last segment resolves to `Null`. The empty path
/// is the instance itself.
pub fn get_path_value(instance: &Observable, path: &str) -> Result<Value, ObserveError> {
    if path.is_empty() {
        return Ok(Value::Object(instance.clone()));
    }
    let mut current = instance.clone();
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let value = current_value(&current, segment);
        if segments.peek().is_none() {
            return Ok(value);
        }
        match value {
            Value::Object(next) => current = next,
            _ => {
                return Err(ObserveError::InvalidPath {
                    path: path.to_owned(),
                    segment: segment.to_owned(),
                });
            }
        }
    }
    Ok(Value::Null)
}
