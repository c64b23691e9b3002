#![forbid(unsafe_code)]

//! Wire format for change notifications.
//!
//! Every message is one JSON object carrying the envelope fields and an
//! `eventType` tag:
//!
//! ```json
//! {
//!   "protocol": "cadgraph",
//!   "version": 1,
//!   "timestamp": 1712345678901,
//!   "documentId": "3f0c...",
//!   "eventType": "propertyChanged",
//!   "entityId": "a91e...",
//!   "propertyName": "name",
//!   "oldValue": "Box",
//!   "newValue": "Crate"
//! }
//! ```
//!
//! Events nested in a `batch` carry only their own fields and tag.

use cadgraph_core::NodeAction;
use serde::{Deserialize, Serialize};

/// Value of the `protocol` field.
pub const PROTOCOL: &str = "cadgraph";

/// Value of the `version` field.
pub const PROTOCOL_VERSION: u32 = 1;

/// One notification event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NotificationEvent {
    SelectionChanged {
        ids: Vec<String>,
    },
    PropertyChanged {
        entity_id: String,
        property_name: String,
        old_value: serde_json::Value,
        new_value: serde_json::Value,
    },
    NodeChanged {
        action: NodeAction,
        entity_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_parent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_previous_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_parent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_previous_id: Option<String>,
    },
    Batch {
        events: Vec<NotificationEvent>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl NotificationEvent {
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::SelectionChanged { .. } => "selectionChanged",
            Self::PropertyChanged { .. } => "propertyChanged",
            Self::NodeChanged { .. } => "nodeChanged",
            Self::Batch { .. } => "batch",
            Self::Error { .. } => "error",
        }
    }

    /// Events carried by this one: the batch contents, or just itself.
    #[must_use]
    pub fn flatten(&self) -> Vec<&NotificationEvent> {
        match self {
            Self::Batch { events } => events.iter().collect(),
            other => vec![other],
        }
    }
}

/// An event wrapped in the protocol envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub protocol: String,
    pub version: u32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub document_id: String,
    #[serde(flatten)]
    pub event: NotificationEvent,
}

impl NotificationMessage {
    #[must_use]
    pub fn new(document_id: &str, timestamp: u64, event: NotificationEvent) -> Self {
        Self {
            protocol: PROTOCOL.to_owned(),
            version: PROTOCOL_VERSION,
            timestamp,
            document_id: document_id.to_owned(),
            event,
        }
    }

    /// One event as-is, several inside a `batch`. `None` when empty.
    #[must_use]
    pub fn from_events(
        document_id: &str,
        timestamp: u64,
        mut events: Vec<NotificationEvent>,
    ) -> Option<Self> {
        let event = match events.len() {
            0 => return None,
            1 => events.pop()?,
            _ => NotificationEvent::Batch { events },
        };
        Some(Self::new(document_id, timestamp, event))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn property_change_has_flat_camel_case_shape() {
        let message = NotificationMessage::new(
            "doc",
            42,
            NotificationEvent::PropertyChanged {
                entity_id: "n1".into(),
                property_name: "name".into(),
                old_value: json!("Box"),
                new_value: json!("Crate"),
            },
        );
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "protocol": "cadgraph",
                "version": 1,
                "timestamp": 42,
                "documentId": "doc",
                "eventType": "propertyChanged",
                "entityId": "n1",
                "propertyName": "name",
                "oldValue": "Box",
                "newValue": "Crate",
            })
        );
    }

    #[test]
    fn node_change_omits_missing_positions() {
        let event = NotificationEvent::NodeChanged {
            action: NodeAction::InsertAfter,
            entity_id: "n1".into(),
            old_parent_id: None,
            old_previous_id: None,
            new_parent_id: Some("root".into()),
            new_previous_id: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({ "eventType": "nodeChanged", "action": "insertAfter", "entityId": "n1", "newParentId": "root" })
        );
    }

    #[test]
    fn batch_round_trips_through_text() {
        let events = vec![
            NotificationEvent::SelectionChanged { ids: vec!["a".into()] },
            NotificationEvent::Error {
                message: "boom".into(),
                detail: None,
            },
        ];
        let message = NotificationMessage::from_events("doc", 7, events.clone()).unwrap();
        assert_eq!(message.event.event_type(), "batch");
        let parsed = NotificationMessage::from_json(&message.to_json().unwrap()).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(parsed.event.flatten(), events.iter().collect::<Vec<_>>());
    }

    #[test]
    fn single_event_is_not_wrapped() {
        let event = NotificationEvent::SelectionChanged { ids: Vec::new() };
        let message = NotificationMessage::from_events("doc", 0, vec![event.clone()]).unwrap();
        assert_eq!(message.event, event);
        assert!(NotificationMessage::from_events("doc", 0, Vec::new()).is_none());
    }
}
