//! Durable publish/subscribe for Nobel prize events.
//!
//! Upstream code publishes a [`Prize`](nobel_types::Prize) or
//! [`Laureate`](nobel_types::Laureate) after persisting it; the event is
//! appended to a durable, subject-partitioned log and fanned out
//! asynchronously to every live subscription. Operator tooling can read the
//! newest retained event per subject without subscribing.
//!
//! # Architecture
//!
//! ```text
//! Publisher --> EventLog (MemoryLog | JetStreamLog) --> Subscriber (async, per subscription)
//!                    |
//!                    +--> LastMessageQuery (sync pull)
//! ```
//!
//! Delivery is at-least-once: a handler error negatively acknowledges the
//! event and the log redelivers it, so handlers must be idempotent.
//!
//! # Modules
//!
//! - [`subject`] -- Subject names and the payload-to-subject binding
//! - [`log`] -- The [`EventLog`] trait and its two backends
//! - [`publisher`] -- Encodes domain events and appends them to the log
//! - [`subscriber`] -- Typed handler registration, decode, ack/nak, close
//! - [`query`] -- Last-message reads decoded into domain types
//! - [`config`] -- Environment-driven configuration
//! - [`error`] -- The shared error taxonomy

pub mod config;
pub mod error;
pub mod log;
pub mod publisher;
pub mod query;
pub mod subject;
pub mod subscriber;

pub use config::{DeliverFrom, EventsConfig};
pub use error::EventError;
pub use log::{
    Delivery, Disposition, EventLog, JetStreamLog, JetStreamSubscription, LogMessage,
    LogSubscription, MemoryLog, MemorySubscription, MessageHandler,
};
pub use publisher::Publisher;
pub use query::LastMessageQuery;
pub use subject::{DomainEvent, STREAM_NAME, Subject};
pub use subscriber::{EventHandler, Subscriber};
