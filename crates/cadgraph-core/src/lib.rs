#![forbid(unsafe_code)]

//! cadgraph core
//!
//! A CAD document engine: a mutable scene graph in which every structural
//! and property mutation is applied to live state, recorded as an invertible
//! record and broadcast to observers.
//!
//! # Key Components
//!
//! - [`Document`] - node arena, history, transaction slot, node observers
//! - [`Observable`] - property store with change notification
//! - [`History`] - bounded undo/redo stacks of [`Record`]s
//! - [`Transaction`] - groups records into one undoable unit
//! - [`DeepObserver`] - follows nested observables and reports dotted paths
//! - [`EventBus`] - application-level events such as selection changes
//!
//! # How it fits in the system
//! `cadgraph-notify` consumes the document through [`NodeChangedObserver`],
//! property handlers and the [`EventBus`] and turns changes into wire
//! messages. Rendering plugs in through [`VisualContext`].

pub mod arena;
pub mod config;
pub mod deep_observer;
pub mod document;
pub mod error;
pub mod event_bus;
pub mod history;
pub mod layer;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod node;
pub mod observable;
pub mod properties;
pub mod serialize;
pub mod tracked;
pub mod transaction;
pub mod tree;
pub mod value;
pub mod visual;

pub use arena::NodeId;
pub use config::{DocumentConfig, DocumentMode, MAX_HISTORY_CAPACITY, MIN_HISTORY_CAPACITY};
pub use deep_observer::{DeepChange, DeepHandler, DeepObserver, DeepSubscription, get_path_value};
pub use document::{Document, NodeInfo, WeakDocument, generate_id};
pub use error::{DocumentError, ObserveError, SerializeError, TransactionError};
pub use event_bus::{DocumentEvent, EventBus, SubscriptionId};
pub use history::{ArrayRecord, DEFAULT_HISTORY_CAPACITY, History, Record};
pub use layer::{DEFAULT_LAYER_COLOR, DEFAULT_LAYER_NAME, Layer};
pub use node::{
    NodeAction, NodeChangedObserver, NodeKind, NodeLinkedListRecord, NodeRecord, PropertyMeta, keys,
    properties_of, property_meta,
};
pub use observable::{HandlerId, Observable, PropertyChanged, PropertyChangedHandler};
pub use properties::infer_custom_type;
pub use serialize::{JsonNodeSerializer, NodeSerializer, Serialized};
pub use tracked::{PropertyRecord, RecordSink};
pub use transaction::Transaction;
pub use value::{Matrix4, Value, XYZ};
pub use visual::{NullVisualContext, VisualContext};

/// Everyday imports.
pub mod prelude {
    pub use crate::{
        DeepObserver, Document, DocumentConfig, DocumentError, History, NodeId, NodeKind,
        NodeRecord, Observable, Record, Transaction, Value,
    };
}
