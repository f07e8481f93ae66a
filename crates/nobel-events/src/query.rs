//! Point reads of the newest retained event per subject.

use nobel_types::{Laureate, Prize};

use crate::error::EventError;
use crate::log::{EventLog, LogMessage};
use crate::subject::DomainEvent;

/// Reads the last message on a subject and decodes it.
///
/// Independent of any subscription. [`EventError::NotFound`] is returned
/// when nothing is retained, distinct from decode and transport failures.
#[derive(Debug, Clone)]
pub struct LastMessageQuery<L> {
    log: L,
}

impl<L: EventLog> LastMessageQuery<L> {
    /// Create a query over a log handle owned by the caller.
    pub const fn new(log: L) -> Self {
        Self { log }
    }

    /// Fetch and decode the highest-sequence retained event of type `E`.
    pub async fn last<E: DomainEvent>(&self) -> Result<E, EventError> {
        let message = self.log.last_message(E::SUBJECT).await?;
        decode(&message)
    }

    /// The last `prize.created` event.
    pub async fn last_prize(&self) -> Result<Prize, EventError> {
        self.last().await
    }

    /// The last `laureate.created` event.
    pub async fn last_laureate(&self) -> Result<Laureate, EventError> {
        self.last().await
    }
}

/// Decode a log message into the payload type bound to its subject.
pub(crate) fn decode<E: DomainEvent>(message: &LogMessage) -> Result<E, EventError> {
    serde_json::from_slice(&message.payload).map_err(|source| EventError::Serialization {
        subject: message.subject,
        source,
    })
}
