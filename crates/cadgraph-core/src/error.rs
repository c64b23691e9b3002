#![forbid(unsafe_code)]

//! Error types for the document core.
//!
//! Soft failures (a node that is not a child of the container it was
//! handed to, a move into one's own subtree) are logged and skipped by the
//! structural operations and never surface here. These enums cover the
//! failures a caller has to handle.

use thiserror::Error;

use crate::arena::NodeId;

/// Failure of a document-level operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// The id does not resolve to a live node (never created or disposed).
    #[error("node {0} does not exist or has been disposed")]
    NodeNotFound(NodeId),

    /// A structural operation that needs children was given a leaf node.
    #[error("node {0} cannot hold children")]
    NotAContainer(NodeId),

    /// Two nodes live in different trees.
    #[error("can not find a common parent of {a} and {b}")]
    NoCommonAncestor { a: NodeId, b: NodeId },

    /// The node's kind does not carry this property.
    #[error("node {node} has no \"{property}\" property")]
    UnsupportedProperty { node: NodeId, property: String },

    /// The document was disposed.
    #[error("document {0} has been disposed")]
    Disposed(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

/// Misuse of the transaction protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("document {document} already has an active transaction \"{active}\"")]
    AlreadyActive { document: String, active: String },

    #[error("transaction \"{name}\" has not started on document {document}")]
    NotStarted { document: String, name: String },
}

/// Failure while resolving a dotted property path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserveError {
    /// `segment` of `path` is missing or does not hold an observable.
    #[error("invalid property path \"{path}\": \"{segment}\" is not an observable object")]
    InvalidPath { path: String, segment: String },
}

/// Failure while turning a node into its serialized form or back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    #[error("unknown class key \"{0}\"")]
    UnknownClass(String),

    #[error("property \"{property}\" is missing or malformed")]
    InvalidProperty { property: String },

    #[error("custom property text is not valid JSON: {0}")]
    Json(String),
}

impl From<serde_json::Error> for SerializeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_error_converts_into_document_error() {
        let err: DocumentError = TransactionError::NotStarted {
            document: "doc".into(),
            name: "move".into(),
        }
        .into();
        assert!(matches!(err, DocumentError::Transaction(_)));
        assert_eq!(
            err.to_string(),
            "transaction \"move\" has not started on document doc"
        );
    }

    #[test]
    fn invalid_path_message_names_segment() {
        let err = ObserveError::InvalidPath {
            path: "a.b.c".into(),
            segment: "b".into(),
        };
        assert!(err.to_string().contains("\"b\""));
    }

    #[test]
    fn json_error_converts() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err = SerializeError::from(parse.unwrap_err());
        assert!(matches!(err, SerializeError::Json(_)));
    }
}
