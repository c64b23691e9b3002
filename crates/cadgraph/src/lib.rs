#![forbid(unsafe_code)]

//! cadgraph public facade crate.
//!
//! Re-exports the document engine from `cadgraph-core` and, with the
//! default `notify` feature, the notification layer from `cadgraph-notify`.
//! Most callers only need the [`prelude`].

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use cadgraph_core::{
    ArrayRecord, DeepChange, DeepObserver, DeepSubscription, Document, DocumentConfig,
    DocumentError, DocumentEvent, DocumentMode, EventBus, History, JsonNodeSerializer, Layer,
    Matrix4, NodeAction, NodeChangedObserver, NodeId, NodeInfo, NodeKind, NodeRecord,
    NodeSerializer, NullVisualContext, ObserveError, Observable, PropertyChanged, Record,
    SerializeError, Serialized, Transaction, TransactionError, Value, VisualContext, WeakDocument,
    XYZ, get_path_value,
};

#[cfg(feature = "tracing-json")]
pub use cadgraph_core::logging::init_json as init_logging;

// --- Notify re-exports -----------------------------------------------------

#[cfg(feature = "notify")]
pub use cadgraph_notify::{
    ChannelTransport, Clock, CollectingTransport, ManualClock, NotificationConfig,
    NotificationEvent, NotificationMessage, NotificationService, NotificationTransport, NotifyError,
    ScheduleMode, SystemClock, TransportError,
};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for cadgraph callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Document(DocumentError),
    Observe(ObserveError),
    #[cfg(feature = "notify")]
    Notify(NotifyError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(err) => write!(f, "{err}"),
            Self::Observe(err) => write!(f, "{err}"),
            #[cfg(feature = "notify")]
            Self::Notify(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<DocumentError> for Error {
    fn from(err: DocumentError) -> Self {
        Self::Document(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Self::Document(err.into())
    }
}

impl From<SerializeError> for Error {
    fn from(err: SerializeError) -> Self {
        Self::Document(err.into())
    }
}

impl From<ObserveError> for Error {
    fn from(err: ObserveError) -> Self {
        Self::Observe(err)
    }
}

#[cfg(feature = "notify")]
impl From<NotifyError> for Error {
    fn from(err: NotifyError) -> Self {
        Self::Notify(err)
    }
}

/// Standard result type for cadgraph APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        DeepObserver, Document, DocumentConfig, Error, History, NodeId, NodeKind, NodeRecord,
        Observable, Record, Result, Transaction, Value,
    };

    #[cfg(feature = "notify")]
    pub use crate::{NotificationConfig, NotificationService};

    pub use crate::core;
    #[cfg(feature = "notify")]
    pub use crate::notify;
}

pub use cadgraph_core as core;
#[cfg(feature = "notify")]
pub use cadgraph_notify as notify;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    fn rename_root(doc: &Document, name: &str) -> Result<bool> {
        let root = doc.root_node().ok_or_else(|| {
            crate::DocumentError::Disposed(doc.id().to_owned())
        })?;
        Ok(doc.set_name_of(root, name)?)
    }

    #[test]
    fn facade_errors_convert_with_question_mark() {
        let doc = Document::new("facade", DocumentConfig::default());
        assert_eq!(rename_root(&doc, "renamed"), Ok(true));
        assert_eq!(doc.name(), "renamed");

        let err: Error = crate::get_path_value(&Observable::new(), "a.b").unwrap_err().into();
        assert!(err.to_string().contains("a.b"));
    }
}
