#![forbid(unsafe_code)]

//! History-aware observables.
//!
//! An [`Observable`] attached to a [`RecordSink`] turns every successful
//! set into a [`PropertyRecord`] after the caller's `on_changed` callback
//! has run and before handlers are notified. The sink is held weakly: a
//! property bag never keeps its document alive.

use std::rc::Weak;

use tracing::trace;

use crate::document::Document;
use crate::error::DocumentError;
use crate::history::Record;
use crate::observable::Observable;
use crate::value::Value;

/// Destination for records produced by history-aware observables.
///
/// [`Document`] implements this by routing through
/// [`crate::transaction::Transaction::add`].
pub trait RecordSink {
    fn add_record(&self, record: Box<dyn Record>);
}

impl Observable {
    /// New store that records its changes into `sink`.
    #[must_use]
    pub fn with_history(sink: Weak<dyn RecordSink>) -> Self {
        let obs = Self::new();
        obs.attach_history(sink);
        obs
    }

    /// Start recording changes into `sink`. Ignored once disposed.
    pub fn attach_history(&self, sink: Weak<dyn RecordSink>) {
        if self.is_disposed() {
            return;
        }
        *self.inner.sink.borrow_mut() = Some(sink);
    }

    pub fn detach_history(&self) {
        self.inner.sink.borrow_mut().take();
    }

    #[must_use]
    pub fn has_history(&self) -> bool {
        self.inner
            .sink
            .borrow()
            .as_ref()
            .is_some_and(|sink| sink.strong_count() > 0)
    }

    pub(crate) fn record_change(&self, key: &str, old: &Value, new: &Value) {
        let sink = self.inner.sink.borrow().as_ref().and_then(Weak::upgrade);
        if let Some(sink) = sink {
            trace!(object = self.id(), property = key, "recording property change");
            sink.add_record(Box::new(PropertyRecord::new(
                self.clone(),
                key,
                old.clone(),
                new.clone(),
            )));
        }
    }
}

/// Inverse of a single property change.
pub struct PropertyRecord {
    name: String,
    owner: Observable,
    property: String,
    old_value: Value,
    new_value: Value,
}

impl PropertyRecord {
    #[must_use]
    pub fn new(owner: Observable, property: &str, old_value: Value, new_value: Value) -> Self {
        Self {
            name: format!("change {property} property"),
            owner,
            property: property.to_owned(),
            old_value,
            new_value,
        }
    }

    #[must_use]
    pub fn owner(&self) -> &Observable {
        &self.owner
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    #[must_use]
    pub fn old_value(&self) -> &Value {
        &self.old_value
    }

    #[must_use]
    pub fn new_value(&self) -> &Value {
        &self.new_value
    }
}

impl Record for PropertyRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn undo(&mut self, _doc: &Document) -> Result<(), DocumentError> {
        self.owner.set(&self.property, self.old_value.clone());
        Ok(())
    }

    fn redo(&mut self, _doc: &Document) -> Result<(), DocumentError> {
        self.owner.set(&self.property, self.new_value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Default)]
    struct Collect(RefCell<Vec<String>>);

    impl RecordSink for Collect {
        fn add_record(&self, record: Box<dyn Record>) {
            self.0.borrow_mut().push(record.name().to_owned());
        }
    }

    fn sink() -> (Rc<Collect>, Weak<dyn RecordSink>) {
        let collect = Rc::new(Collect::default());
        let as_dyn: Rc<dyn RecordSink> = collect.clone();
        (collect, Rc::downgrade(&as_dyn))
    }

    #[test]
    fn changes_become_records() {
        let (collect, weak) = sink();
        let obs = Observable::with_history(weak);
        assert!(obs.has_history());
        obs.set("name", "a".into());
        obs.set("name", "a".into());
        obs.set("visible", false.into());
        assert_eq!(
            *collect.0.borrow(),
            vec!["change name property", "change visible property"]
        );
    }

    #[test]
    fn private_sets_are_not_recorded() {
        let (collect, weak) = sink();
        let obs = Observable::with_history(weak);
        obs.set_private("name", "a".into());
        let _ = obs.get_or("visible", || true.into());
        assert!(collect.0.borrow().is_empty());
    }

    #[test]
    fn record_lands_between_callback_and_handlers() {
        let (collect, weak) = sink();
        let obs = Observable::with_history(weak);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (c, s) = (Rc::clone(&collect), Rc::clone(&seen));
        obs.on_property_changed(move |_| s.borrow_mut().push(c.0.borrow().len()));
        let on_changed = |_: &str, _: &Value| seen.borrow_mut().push(collect.0.borrow().len());
        obs.set_with("k", 1.into(), Some(&on_changed), None);
        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    #[test]
    fn dropped_sink_or_dispose_stops_recording() {
        let (collect, weak) = sink();
        let obs = Observable::with_history(weak);
        obs.dispose();
        assert!(!obs.has_history());
        obs.set("k", 1.into());
        assert!(collect.0.borrow().is_empty());

        let (collect, weak) = sink();
        let obs = Observable::with_history(weak);
        drop(collect);
        assert!(!obs.has_history());
        assert!(obs.set("k", 1.into()));
    }
}
