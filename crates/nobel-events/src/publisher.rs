//! Encodes domain events and appends them to the log.
//!
//! The publisher has no side effects beyond the append and never waits on
//! subscriber processing. Callers that publish after persisting an entity
//! should treat a failure here as non-fatal to that write.

use nobel_types::{Laureate, Prize};
use tracing::debug;

use crate::error::EventError;
use crate::log::EventLog;
use crate::subject::DomainEvent;

/// Publishes prize and laureate events to an [`EventLog`].
#[derive(Debug, Clone)]
pub struct Publisher<L> {
    log: L,
}

impl<L: EventLog> Publisher<L> {
    /// Create a publisher over a log handle owned by the caller.
    pub const fn new(log: L) -> Self {
        Self { log }
    }

    /// Encode `event` as JSON and append it to its subject.
    ///
    /// Returns the sequence number the log assigned.
    ///
    /// # Errors
    ///
    /// [`EventError::Serialization`] if the payload cannot be encoded;
    /// [`EventError::Publish`] or [`EventError::Connection`] if the append fails.
    pub async fn publish<E: DomainEvent>(&self, event: &E) -> Result<u64, EventError> {
        let payload = serde_json::to_vec(event).map_err(|source| EventError::Serialization {
            subject: E::SUBJECT,
            source,
        })?;
        let sequence = self.log.publish(E::SUBJECT, payload.into()).await?;
        debug!(subject = %E::SUBJECT, sequence, "published event");
        Ok(sequence)
    }

    /// Publish a `prize.created` event.
    pub async fn publish_prize_created(&self, prize: &Prize) -> Result<u64, EventError> {
        self.publish(prize).await
    }

    /// Publish a `laureate.created` event.
    pub async fn publish_laureate_created(&self, laureate: &Laureate) -> Result<u64, EventError> {
        self.publish(laureate).await
    }
}
