#![forbid(unsafe_code)]

//! Batched change notifications for cadgraph documents.
//!
//! [`NotificationService`] watches a [`cadgraph_core::Document`] and an
//! optional [`cadgraph_core::EventBus`], queues what changed as
//! [`NotificationEvent`]s and hands them to a [`NotificationTransport`] on
//! the schedule chosen in [`NotificationConfig`].
//!
//! ```ignore
//! let (transport, receiver) = ChannelTransport::new();
//! let service = NotificationService::new(&doc, Rc::new(transport), NotificationConfig::from_env());
//! // on every tick
//! service.poll(Instant::now())?;
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod message;
pub mod schedule;
pub mod service;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DEFAULT_SCHEDULE_WINDOW_MS, MAX_SCHEDULE_WINDOW_MS, MIN_SCHEDULE_WINDOW_MS, NotificationConfig,
};
pub use error::{NotifyError, TransportError};
pub use message::{NotificationEvent, NotificationMessage, PROTOCOL, PROTOCOL_VERSION};
pub use schedule::{FlushScheduler, ScheduleMode};
pub use service::NotificationService;
pub use transport::{ChannelTransport, CollectingTransport, NotificationTransport};
