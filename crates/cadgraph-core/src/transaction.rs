#![forbid(unsafe_code)]

//! Grouping records into one undoable unit.
//!
//! A document has at most one active transaction. While it is active,
//! [`Transaction::add`] appends records to its [`ArrayRecord`] instead of
//! pushing them onto the history; `commit` pushes the group as a single
//! entry and `rollback` undoes it.

use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

use tracing::{info, info_span, warn};

use crate::document::Document;
use crate::error::{DocumentError, TransactionError};
use crate::history::{ArrayRecord, Record};

/// Handle naming a transaction on a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    name: String,
}

impl Transaction {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Route `record` to the active transaction, or to the history when
    /// none is active. Dropped while the history is disabled.
    pub fn add(doc: &Document, record: Box<dyn Record>) {
        if doc.history().is_disabled() {
            return;
        }
        let record = {
            let mut slot = doc.transaction_slot().borrow_mut();
            match slot.as_mut() {
                Some(group) => {
                    group.push(record);
                    return;
                }
                None => record,
            }
        };
        Self::add_to_history(doc, record);
    }

    fn add_to_history(doc: &Document, record: Box<dyn Record>) {
        let name = record.name().to_owned();
        doc.history().add(doc, record);
        info!("history added {name}");
    }

    /// Open this transaction on `doc`.
    pub fn start(&self, doc: &Document) -> Result<(), TransactionError> {
        let mut slot = doc.transaction_slot().borrow_mut();
        if let Some(active) = slot.as_ref() {
            return Err(TransactionError::AlreadyActive {
                document: doc.id().to_owned(),
                active: active.name().to_owned(),
            });
        }
        *slot = Some(ArrayRecord::new(self.name.clone()));
        Ok(())
    }

    /// Close the transaction, pushing its records as one history entry
    /// unless it is empty.
    pub fn commit(&self, doc: &Document) -> Result<(), TransactionError> {
        let group = doc.transaction_slot().borrow_mut().take();
        let Some(group) = group else {
            return Err(self.not_started(doc));
        };
        if !group.is_empty() {
            Self::add_to_history(doc, Box::new(group));
        }
        Ok(())
    }

    /// Close the transaction and revert everything it recorded.
    pub fn rollback(&self, doc: &Document) -> Result<(), DocumentError> {
        let group = doc.transaction_slot().borrow_mut().take();
        let Some(mut group) = group else {
            return Err(self.not_started(doc).into());
        };
        info!(transaction = %self.name, records = group.len(), "rolling back transaction");
        doc.history().without_recording(|| group.undo(doc))
    }

    /// Run `f` inside a transaction named `name`.
    ///
    /// `Ok` commits, `Err` rolls back and returns the error. A panic in `f`
    /// rolls back before the unwind continues.
    pub fn execute<T, E>(
        doc: &Document,
        name: &str,
        f: impl FnOnce(&Document) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DocumentError>,
    {
        let _span = info_span!("transaction.execute", name).entered();
        let transaction = Self::new(name);
        transaction.start(doc).map_err(DocumentError::from)?;

        match catch_unwind(AssertUnwindSafe(|| f(doc))) {
            Ok(Ok(value)) => {
                transaction.commit(doc).map_err(DocumentError::from)?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(rollback_err) = transaction.rollback(doc) {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
            Err(payload) => {
                if let Err(rollback_err) = transaction.rollback(doc) {
                    warn!(error = %rollback_err, "rollback after panic failed");
                }
                resume_unwind(payload)
            }
        }
    }

    fn not_started(&self, doc: &Document) -> TransactionError {
        TransactionError::NotStarted {
            document: doc.id().to_owned(),
            name: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentConfig;
    use crate::observable::Observable;
    use crate::value::Value;

    fn doc() -> Document {
        Document::new("tx", DocumentConfig::default())
    }

    fn tracked(doc: &Document) -> Observable {
        Observable::with_history(doc.record_sink())
    }

    #[test]
    fn execute_groups_changes_into_one_entry() {
        let doc = doc();
        let obs = tracked(&doc);
        let result: Result<(), DocumentError> = Transaction::execute(&doc, "edit", |_| {
            obs.set("a", 1.into());
            obs.set("b", 2.into());
            obs.set("c", 3.into());
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(doc.history().undo_count(), 1);
        assert_eq!(doc.history().next_undo_name().as_deref(), Some("edit"));

        doc.history().undo(&doc).unwrap();
        for key in ["a", "b", "c"] {
            assert_eq!(obs.get(key), Some(Value::Null));
        }
        doc.history().redo(&doc).unwrap();
        assert_eq!(obs.get("c"), Some(Value::Int(3)));
    }

    #[test]
    fn execute_error_rolls_back() {
        let doc = doc();
        let obs = tracked(&doc);
        obs.set("a", 1.into());
        let result: Result<(), DocumentError> = Transaction::execute(&doc, "edit", |d| {
            obs.set("a", 2.into());
            Err(DocumentError::Disposed(d.id().to_owned()))
        });
        assert!(result.is_err());
        assert_eq!(obs.get("a"), Some(Value::Int(1)));
        assert_eq!(doc.history().undo_count(), 1, "only the earlier change");
        assert!(!doc.has_active_transaction());
    }

    #[test]
    fn execute_panic_rolls_back() {
        let doc = doc();
        let obs = tracked(&doc);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), DocumentError> = Transaction::execute(&doc, "boom", |_| {
                obs.set("a", 9.into());
                panic!("boom");
            });
        }));
        assert!(outcome.is_err());
        assert_eq!(obs.get("a"), Some(Value::Null));
        assert!(!doc.has_active_transaction());
        assert!(!doc.history().is_disabled());
    }

    #[test]
    fn nested_start_fails() {
        let doc = doc();
        let outer = Transaction::new("outer");
        outer.start(&doc).unwrap();
        let err = Transaction::new("inner").start(&doc).unwrap_err();
        assert_eq!(
            err,
            TransactionError::AlreadyActive {
                document: doc.id().to_owned(),
                active: "outer".to_owned()
            }
        );
        outer.commit(&doc).unwrap();
    }

    #[test]
    fn commit_without_start_fails() {
        let doc = doc();
        let err = Transaction::new("x").commit(&doc).unwrap_err();
        assert!(matches!(err, TransactionError::NotStarted { .. }));
        assert!(Transaction::new("x").rollback(&doc).is_err());
    }

    #[test]
    fn empty_commit_adds_nothing() {
        let doc = doc();
        let tx = Transaction::new("noop");
        tx.start(&doc).unwrap();
        tx.commit(&doc).unwrap();
        assert_eq!(doc.history().undo_count(), 0);
    }

    #[test]
    fn disabled_history_drops_records() {
        let doc = doc();
        let obs = tracked(&doc);
        doc.history().set_disabled(true);
        obs.set("a", 1.into());
        doc.history().set_disabled(false);
        assert_eq!(doc.history().undo_count(), 0);
    }

    #[test]
    fn manual_start_commit_across_calls() {
        let doc = doc();
        let obs = tracked(&doc);
        let tx = Transaction::new("drag");
        tx.start(&doc).unwrap();
        obs.set("x", 1.into());
        obs.set("x", 2.into());
        assert_eq!(doc.history().undo_count(), 0);
        tx.commit(&doc).unwrap();
        assert_eq!(doc.history().undo_count(), 1);
    }
}
