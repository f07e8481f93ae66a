//! Typed subscriptions over an [`EventLog`].
//!
//! Each registration wraps a user handler in a log-level callback that
//! decodes the payload and maps the outcome onto a [`Disposition`]:
//!
//! | Outcome | Disposition | Effect |
//! |---------|-------------|--------|
//! | handler `Ok` | `Ack` | done |
//! | handler `Err` | `Nak` | redelivered later |
//! | payload does not decode | `Term` | dropped, never retried |
//!
//! Delivery is at-least-once, so handlers must be idempotent (e.g. upsert).

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt as _;
use nobel_types::{Laureate, Prize};
use tracing::{debug, error, info, warn};

use crate::error::EventError;
use crate::log::{Delivery, Disposition, EventLog, LogSubscription, MessageHandler};
use crate::query::{LastMessageQuery, decode};
use crate::subject::DomainEvent;

/// A single-method capability invoked once per delivered event.
pub trait EventHandler<E>: Send + Sync + 'static {
    /// Process one event. An error requests redelivery.
    fn handle(&self, event: E) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl<E, F, Fut> EventHandler<E> for F
where
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn handle(&self, event: E) -> impl Future<Output = anyhow::Result<()>> + Send {
        self(event)
    }
}

/// Owns a set of subscriptions on one log and closes them together.
pub struct Subscriber<L: EventLog> {
    log: L,
    query: LastMessageQuery<L>,
    subscriptions: Vec<L::Subscription>,
}

impl<L: EventLog> Subscriber<L> {
    /// Create a subscriber over a log handle owned by the caller.
    pub fn new(log: L) -> Self {
        Self {
            query: LastMessageQuery::new(log.clone()),
            log,
            subscriptions: Vec::new(),
        }
    }

    /// Register `handler` for events of type `E`.
    ///
    /// Several handlers may subscribe to the same subject; each receives
    /// every event independently.
    ///
    /// # Errors
    ///
    /// [`EventError::Subscription`] if the log rejects the registration.
    /// Nothing is retained in that case.
    pub async fn subscribe<E, H>(&mut self, handler: H) -> Result<(), EventError>
    where
        E: DomainEvent,
        H: EventHandler<E>,
    {
        let handler = Arc::new(handler);
        let callback: MessageHandler = Arc::new(move |delivery: Delivery| {
            let handler = Arc::clone(&handler);
            async move { dispatch::<E, H>(handler.as_ref(), delivery).await }.boxed()
        });
        let subscription = self.log.subscribe(E::SUBJECT, callback).await?;
        info!(subject = %E::SUBJECT, active = self.subscriptions.len().saturating_add(1), "subscribed");
        self.subscriptions.push(subscription);
        Ok(())
    }

    /// Register a handler for `prize.created`.
    pub async fn subscribe_prize_created<H>(&mut self, handler: H) -> Result<(), EventError>
    where
        H: EventHandler<Prize>,
    {
        self.subscribe::<Prize, H>(handler).await
    }

    /// Register a handler for `laureate.created`.
    pub async fn subscribe_laureate_created<H>(&mut self, handler: H) -> Result<(), EventError>
    where
        H: EventHandler<Laureate>,
    {
        self.subscribe::<Laureate, H>(handler).await
    }

    /// Number of live subscriptions.
    pub fn active(&self) -> usize {
        self.subscriptions.len()
    }

    /// Unsubscribe everything.
    ///
    /// Every subscription gets an unsubscribe attempt even if earlier ones
    /// fail; all failures are returned together as [`EventError::Close`].
    /// Waits for in-progress handler invocations to finish.
    pub async fn close(&mut self) -> Result<(), EventError> {
        let mut failures = Vec::new();
        for subscription in self.subscriptions.drain(..) {
            let subject = subscription.subject();
            if let Err(e) = subscription.unsubscribe().await {
                warn!(subject = %subject, error = %e, "failed to unsubscribe");
                failures.push(e);
            }
        }
        if failures.is_empty() {
            info!("all subscriptions closed");
            Ok(())
        } else {
            Err(EventError::Close(failures))
        }
    }

    /// The last `prize.created` event retained by the log.
    pub async fn get_last_prize_message(&self) -> Result<Prize, EventError> {
        self.query.last_prize().await
    }

    /// The last `laureate.created` event retained by the log.
    pub async fn get_last_laureate_message(&self) -> Result<Laureate, EventError> {
        self.query.last_laureate().await
    }
}

impl<L: EventLog + std::fmt::Debug> std::fmt::Debug for Subscriber<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("log", &self.log)
            .field("active", &self.subscriptions.len())
            .finish()
    }
}

/// Decode one delivery and run the handler on it.
async fn dispatch<E, H>(handler: &H, delivery: Delivery) -> Disposition
where
    E: DomainEvent,
    H: EventHandler<E>,
{
    let Delivery { message, attempt } = delivery;
    let event = match decode::<E>(&message) {
        Ok(event) => event,
        Err(e) => {
            error!(
                subject = %message.subject,
                sequence = message.sequence,
                error = %e,
                "failed to decode event, dropping"
            );
            return Disposition::Term;
        }
    };

    match handler.handle(event).await {
        Ok(()) => {
            debug!(subject = %message.subject, sequence = message.sequence, attempt, "event handled");
            Disposition::Ack
        }
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(
                subject = %message.subject,
                sequence = message.sequence,
                attempt,
                error = %reason,
                "failed to handle event, requesting redelivery"
            );
            Disposition::Nak
        }
    }
}
