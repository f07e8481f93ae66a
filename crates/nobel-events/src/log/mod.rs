//! The durable, subject-partitioned event log.
//!
//! [`EventLog`] is the seam between the typed publisher/subscriber layer and
//! the storage that actually retains events. Two backends implement it:
//!
//! - [`MemoryLog`] -- in-process, optionally journaled to disk
//! - [`JetStreamLog`] -- NATS `JetStream`
//!
//! Each subject carries its own monotonically increasing sequence. "Last"
//! always means highest sequence, never latest wall-clock arrival.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt as _;
use futures::future::BoxFuture;
use tracing::error;

use crate::error::EventError;
use crate::subject::Subject;

mod jetstream;
mod journal;
mod memory;

pub use jetstream::{JetStreamLog, JetStreamSubscription};
pub use memory::{MemoryLog, MemorySubscription};

/// A retained event as stored in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Subject the event was published on.
    pub subject: Subject,
    /// Per-subject sequence number assigned at publish time.
    pub sequence: u64,
    /// Encoded payload.
    pub payload: Bytes,
}

/// One delivery of a message to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The delivered message.
    pub message: LogMessage,
    /// Delivery attempt for this subscription, starting at 1.
    pub attempt: u32,
}

/// What the log should do with a delivered message once the handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; do not deliver again.
    Ack,
    /// Processing failed; redeliver later.
    Nak,
    /// The message can never be processed; drop it without redelivery.
    Term,
}

/// Callback the log invokes once per delivery, serialized per subscription.
pub type MessageHandler = Arc<dyn Fn(Delivery) -> BoxFuture<'static, Disposition> + Send + Sync>;

/// Run `handler` on one delivery. A panic inside the handler counts as [`Disposition::Nak`].
pub(crate) async fn invoke(handler: &MessageHandler, delivery: Delivery) -> Disposition {
    let subject = delivery.message.subject;
    let sequence = delivery.message.sequence;
    let attempt = delivery.attempt;
    match AssertUnwindSafe(async move { handler(delivery).await })
        .catch_unwind()
        .await
    {
        Ok(disposition) => disposition,
        Err(panic) => {
            error!(
                subject = %subject,
                sequence,
                attempt,
                panic = panic_message(panic.as_ref()),
                "handler panicked, redelivering"
            );
            Disposition::Nak
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// A live registration returned by [`EventLog::subscribe`].
pub trait LogSubscription: Send + 'static {
    /// The subject this subscription reads.
    fn subject(&self) -> Subject;

    /// Stop delivery and release the registration.
    ///
    /// Waits for an in-progress handler invocation to finish.
    fn unsubscribe(self) -> impl Future<Output = Result<(), EventError>> + Send;
}

/// An append-only log partitioned by subject.
pub trait EventLog: Clone + Send + Sync + 'static {
    /// Registration handle produced by [`subscribe`](Self::subscribe).
    type Subscription: LogSubscription;

    /// Append `payload` to `subject` and return its sequence number.
    ///
    /// Returns only once the event is durable. Never waits on subscribers.
    fn publish(
        &self,
        subject: Subject,
        payload: Bytes,
    ) -> impl Future<Output = Result<u64, EventError>> + Send;

    /// Register `handler` for `subject`.
    ///
    /// The handler runs off the caller's task, once per event in sequence
    /// order, and never concurrently with itself for this subscription.
    fn subscribe(
        &self,
        subject: Subject,
        handler: MessageHandler,
    ) -> impl Future<Output = Result<Self::Subscription, EventError>> + Send;

    /// Read the highest-sequence event currently retained for `subject`.
    ///
    /// Returns [`EventError::NotFound`] when nothing is retained.
    fn last_message(
        &self,
        subject: Subject,
    ) -> impl Future<Output = Result<LogMessage, EventError>> + Send;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;

    fn delivery() -> Delivery {
        Delivery {
            message: LogMessage {
                subject: Subject::PrizeCreated,
                sequence: 4,
                payload: Bytes::from_static(b"{}"),
            },
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn handler_panic_becomes_nak() {
        let handler: MessageHandler = Arc::new(|delivery: Delivery| {
            async move {
                if delivery.attempt == 1 {
                    panic!("cannot handle {}", delivery.message.sequence);
                }
                Disposition::Ack
            }
            .boxed()
        });
        assert_eq!(invoke(&handler, delivery()).await, Disposition::Nak);
    }

    #[tokio::test]
    async fn handler_result_passes_through() {
        let handler: MessageHandler = Arc::new(|_: Delivery| async { Disposition::Term }.boxed());
        assert_eq!(invoke(&handler, delivery()).await, Disposition::Term);
    }

    #[test]
    fn panic_payloads_render_as_text() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&7_u8), "non-string panic payload");
    }
}
