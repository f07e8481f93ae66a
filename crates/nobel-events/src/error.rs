//! Error types for the event subsystem.
//!
//! Uses `thiserror` for typed errors that surface through publishing,
//! subscribing and last-message reads. Errors raised while delivering an
//! event asynchronously never reach the publisher; they are logged and turned
//! into a negative acknowledgement (or a drop, for undecodable payloads).

use crate::subject::Subject;

/// Errors that can occur while publishing, subscribing or querying events.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The broker could not be reached at construction or publish time.
    #[error("connection error: {0}")]
    Connection(String),

    /// A payload could not be encoded or decoded. Never retried.
    #[error("failed to encode or decode {subject} payload: {source}")]
    Serialization {
        /// The subject the payload belongs to.
        subject: Subject,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The log append failed after a connection was established.
    #[error("publish error: {0}")]
    Publish(String),

    /// A subscription could not be registered.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// No retained event exists for the subject.
    #[error("no retained message on {subject}")]
    NotFound {
        /// The subject that was queried.
        subject: Subject,
    },

    /// A read from the log failed for a reason other than "not found".
    #[error("transport error: {0}")]
    Transport(String),

    /// A single subscription failed to unsubscribe cleanly.
    #[error("unsubscribe error: {0}")]
    Unsubscribe(String),

    /// The on-disk journal of the in-process log could not be opened or replayed.
    #[error("journal error: {0}")]
    Journal(#[from] std::io::Error),

    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// One or more subscriptions failed to unsubscribe during close.
    #[error("{} subscription(s) failed to unsubscribe: {}", .0.len(), join_messages(.0))]
    Close(Vec<EventError>),
}

impl EventError {
    /// Whether this is the "nothing retained yet" condition.
    ///
    /// Callers render this as an empty state rather than a failure.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether retrying the same operation later may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Publish(_) | Self::Transport(_)
        )
    }
}

fn join_messages(errors: &[EventError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_lists_every_failure() {
        let err = EventError::Close(vec![
            EventError::Unsubscribe("prize.created: task panicked".to_owned()),
            EventError::Unsubscribe("laureate.created: consumer gone".to_owned()),
        ]);
        assert_eq!(
            err.to_string(),
            "2 subscription(s) failed to unsubscribe: \
             unsubscribe error: prize.created: task panicked; \
             unsubscribe error: laureate.created: consumer gone"
        );
    }

    #[test]
    fn not_found_is_distinct_from_transport() {
        let not_found = EventError::NotFound {
            subject: Subject::PrizeCreated,
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_retryable());

        let transport = EventError::Transport("stream unavailable".to_owned());
        assert!(!transport.is_not_found());
        assert!(transport.is_retryable());
    }

    #[test]
    fn serialization_is_not_retryable() {
        let source = serde_json::from_str::<u8>("not json")
            .err()
            .map(|source| EventError::Serialization {
                subject: Subject::LaureateCreated,
                source,
            });
        assert!(source.is_some_and(|err| !err.is_retryable()));
    }
}
