#![forbid(unsafe_code)]

//! Bounded undo/redo history.
//!
//! # Design
//!
//! Two `VecDeque` stacks of boxed [`Record`]s. Adding a record clears the
//! redo stack; exceeding the capacity evicts and disposes the oldest undo
//! record. Undo and redo pop a record, replay it against the document with
//! recording disabled, and push it onto the opposite stack.
//!
//! # Invariants
//!
//! 1. `undo_count() <= capacity()` after every `add`.
//! 2. While a record replays, `is_disabled()` is `true`, so nothing the
//!    replay does is recorded. The previous `disabled` value and the
//!    `is_undoing`/`is_redoing` flags are restored by a drop guard, also
//!    when the replay fails or panics.
//! 3. A record whose replay fails goes back onto the stack it came from.
//!
//! # Failure Modes
//!
//! - **Record calls `add` during replay**: ignored, because the history is
//!   disabled for the duration.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, info_span, warn};

use crate::document::Document;
use crate::error::DocumentError;

/// Default number of undo records kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// A reversible mutation.
///
/// `undo` and `redo` mutate the document through its public operations.
/// They must not add records to the history themselves.
pub trait Record {
    /// Human-readable label shown in undo/redo menus.
    fn name(&self) -> &str;

    fn undo(&mut self, doc: &Document) -> Result<(), DocumentError>;

    fn redo(&mut self, doc: &Document) -> Result<(), DocumentError>;

    /// Release whatever this record alone keeps alive. Called when the
    /// record is evicted or the history is disposed.
    fn dispose(&mut self, _doc: &Document) {}
}

/// Ordered group of records replayed as one unit.
pub struct ArrayRecord {
    name: String,
    records: Vec<Box<dyn Record>>,
}

impl fmt::Debug for ArrayRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayRecord")
            .field("name", &self.name)
            .field("len", &self.records.len())
            .finish()
    }
}

impl ArrayRecord {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Box<dyn Record>) {
        self.records.push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Names of the sub-records in insertion order.
    #[must_use]
    pub fn record_names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name().to_owned()).collect()
    }
}

impl Record for ArrayRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn undo(&mut self, doc: &Document) -> Result<(), DocumentError> {
        let mut first_error = None;
        for record in self.records.iter_mut().rev() {
            if let Err(err) = record.undo(doc) {
                warn!(record = record.name(), error = %err, "sub-record undo failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn redo(&mut self, doc: &Document) -> Result<(), DocumentError> {
        let mut first_error = None;
        for record in &mut self.records {
            if let Err(err) = record.redo(doc) {
                warn!(record = record.name(), error = %err, "sub-record redo failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn dispose(&mut self, doc: &Document) {
        for record in &mut self.records {
            record.dispose(doc);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

/// Sets the replay flags for its lifetime.
struct ReplayGuard<'a> {
    history: &'a History,
    direction: Direction,
    was_disabled: bool,
}

impl<'a> ReplayGuard<'a> {
    fn new(history: &'a History, direction: Direction) -> Self {
        let was_disabled = history.disabled.replace(true);
        match direction {
            Direction::Undo => history.undoing.set(true),
            Direction::Redo => history.redoing.set(true),
        }
        Self {
            history,
            direction,
            was_disabled,
        }
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.history.disabled.set(self.was_disabled);
        match self.direction {
            Direction::Undo => self.history.undoing.set(false),
            Direction::Redo => self.history.redoing.set(false),
        }
    }
}

/// Bounded undo/redo stacks. See the module docs.
pub struct History {
    undo_stack: RefCell<VecDeque<Box<dyn Record>>>,
    redo_stack: RefCell<VecDeque<Box<dyn Record>>>,
    capacity: Cell<usize>,
    disabled: Cell<bool>,
    undoing: Cell<bool>,
    redoing: Cell<bool>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("undo_count", &self.undo_count())
            .field("redo_count", &self.redo_count())
            .field("capacity", &self.capacity.get())
            .field("disabled", &self.disabled.get())
            .finish()
    }
}

impl History {
    /// Empty history keeping at most `capacity` undo records (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            undo_stack: RefCell::new(VecDeque::new()),
            redo_stack: RefCell::new(VecDeque::new()),
            capacity: Cell::new(capacity.max(1)),
            disabled: Cell::new(false),
            undoing: Cell::new(false),
            redoing: Cell::new(false),
        }
    }

    /// Push a record. No-op while disabled. Clears the redo stack and
    /// evicts the oldest records beyond capacity.
    pub fn add(&self, doc: &Document, record: Box<dyn Record>) {
        if self.disabled.get() {
            return;
        }
        self.redo_stack.borrow_mut().clear();
        self.undo_stack.borrow_mut().push_back(record);
        self.enforce_capacity(doc);
    }

    fn enforce_capacity(&self, doc: &Document) {
        let evicted: Vec<Box<dyn Record>> = {
            let mut undo = self.undo_stack.borrow_mut();
            let excess = undo.len().saturating_sub(self.capacity.get());
            undo.drain(..excess).collect()
        };
        for mut record in evicted {
            debug!(record = record.name(), "evicting history record");
            record.dispose(doc);
        }
    }

    /// Undo the most recent record. `Ok(None)` when there is nothing to undo.
    pub fn undo(&self, doc: &Document) -> Result<Option<String>, DocumentError> {
        self.replay(doc, Direction::Undo)
    }

    /// Redo the most recently undone record. `Ok(None)` when there is
    /// nothing to redo.
    pub fn redo(&self, doc: &Document) -> Result<Option<String>, DocumentError> {
        self.replay(doc, Direction::Redo)
    }

    fn replay(&self, doc: &Document, direction: Direction) -> Result<Option<String>, DocumentError> {
        let (from, to, label) = match direction {
            Direction::Undo => (&self.undo_stack, &self.redo_stack, "undo"),
            Direction::Redo => (&self.redo_stack, &self.undo_stack, "redo"),
        };
        let Some(mut record) = from.borrow_mut().pop_back() else {
            return Ok(None);
        };
        let _span = info_span!("history.replay", direction = label, record = record.name()).entered();

        let result = {
            let _guard = ReplayGuard::new(self, direction);
            match direction {
                Direction::Undo => record.undo(doc),
                Direction::Redo => record.redo(doc),
            }
        };

        match result {
            Ok(()) => {
                let name = record.name().to_owned();
                debug!(record = %name, "{label} done");
                to.borrow_mut().push_back(record);
                Ok(Some(name))
            }
            Err(err) => {
                warn!(record = record.name(), error = %err, "{label} failed");
                from.borrow_mut().push_back(record);
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn undo_count(&self) -> usize {
        self.undo_stack.borrow().len()
    }

    #[must_use]
    pub fn redo_count(&self) -> usize {
        self.redo_stack.borrow().len()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.undo_count() > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.redo_count() > 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Change the capacity (at least one), evicting old records at once.
    pub fn set_capacity(&self, doc: &Document, capacity: usize) {
        self.capacity.set(capacity.max(1));
        self.enforce_capacity(doc);
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.get()
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.set(disabled);
    }

    /// Run `f` with recording disabled, restoring the previous state after.
    pub fn without_recording<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Restore<'a>(&'a Cell<bool>, bool);
        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                self.0.set(self.1);
            }
        }
        let _restore = Restore(&self.disabled, self.disabled.replace(true));
        f()
    }

    #[must_use]
    pub fn is_undoing(&self) -> bool {
        self.undoing.get()
    }

    #[must_use]
    pub fn is_redoing(&self) -> bool {
        self.redoing.get()
    }

    /// Drop every record without disposing it.
    pub fn clear(&self) {
        self.undo_stack.borrow_mut().clear();
        self.redo_stack.borrow_mut().clear();
    }

    /// Dispose every record, then clear.
    pub fn dispose(&self, doc: &Document) {
        let mut records: Vec<Box<dyn Record>> = self.redo_stack.borrow_mut().drain(..).collect();
        records.extend(self.undo_stack.borrow_mut().drain(..));
        for record in &mut records {
            record.dispose(doc);
        }
    }

    /// Names of up to `limit` undo records, most recent first.
    #[must_use]
    pub fn undo_names(&self, limit: usize) -> Vec<String> {
        Self::names(&self.undo_stack.borrow(), limit)
    }

    /// Names of up to `limit` redo records, most recent first.
    #[must_use]
    pub fn redo_names(&self, limit: usize) -> Vec<String> {
        Self::names(&self.redo_stack.borrow(), limit)
    }

    #[must_use]
    pub fn next_undo_name(&self) -> Option<String> {
        self.undo_names(1).pop()
    }

    #[must_use]
    pub fn next_redo_name(&self) -> Option<String> {
        self.redo_names(1).pop()
    }

    fn names(stack: &VecDeque<Box<dyn Record>>, limit: usize) -> Vec<String> {
        stack
            .iter()
            .rev()
            .take(limit)
            .map(|r| r.name().to_owned())
            .collect()
    }
}
