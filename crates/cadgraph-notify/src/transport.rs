#![forbid(unsafe_code)]

//! Delivery of encoded notifications.

use std::cell::{Cell, RefCell};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::error::TransportError;
use crate::message::NotificationMessage;

/// Where the service hands finished messages.
pub trait NotificationTransport {
    fn send(&self, message: &NotificationMessage) -> Result<(), TransportError>;
}

/// Sends each message as JSON text over a std channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: Sender<String>,
}

impl ChannelTransport {
    /// A transport together with the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, Receiver<String>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }

    #[must_use]
    pub fn from_sender(sender: Sender<String>) -> Self {
        Self { sender }
    }
}

impl NotificationTransport for ChannelTransport {
    fn send(&self, message: &NotificationMessage) -> Result<(), TransportError> {
        let text = message.to_json()?;
        self.sender.send(text).map_err(|_| TransportError::Closed)
    }
}

/// Keeps messages in memory. Can be told to fail.
#[derive(Debug, Default)]
pub struct CollectingTransport {
    messages: RefCell<Vec<NotificationMessage>>,
    fail_next: Cell<usize>,
}

impl CollectingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` sends.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.set(count);
    }

    #[must_use]
    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.messages.borrow().clone()
    }

    pub fn take(&self) -> Vec<NotificationMessage> {
        std::mem::take(&mut *self.messages.borrow_mut())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }
}

impl NotificationTransport for CollectingTransport {
    fn send(&self, message: &NotificationMessage) -> Result<(), TransportError> {
        let failures = self.fail_next.get();
        if failures > 0 {
            self.fail_next.set(failures - 1);
            return Err(TransportError::Other("rejected".into()));
        }
        self.messages.borrow_mut().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::NotificationEvent;

    fn message() -> NotificationMessage {
        NotificationMessage::new("doc", 1, NotificationEvent::SelectionChanged { ids: vec!["a".into()] })
    }

    #[test]
    fn channel_delivers_json_text() {
        let (transport, receiver) = ChannelTransport::new();
        transport.send(&message()).unwrap();
        let text = receiver.recv().unwrap();
        assert_eq!(NotificationMessage::from_json(&text).unwrap(), message());
    }

    #[test]
    fn channel_reports_closed_receiver() {
        let (transport, receiver) = ChannelTransport::new();
        drop(receiver);
        assert_eq!(transport.send(&message()), Err(TransportError::Closed));
    }

    #[test]
    fn collecting_transport_fails_on_request() {
        let transport = CollectingTransport::new();
        transport.fail_next(1);
        assert!(transport.send(&message()).is_err());
        transport.send(&message()).unwrap();
        assert_eq!(transport.len(), 1);
        assert_eq!(transport.take(), vec![message()]);
        assert!(transport.is_empty());
    }
}
