//! Subject names and the binding between payload types and subjects.

use core::fmt;
use core::str::FromStr;

use nobel_types::{Laureate, Prize};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// Name of the stream that groups every subject under one retention policy.
pub const STREAM_NAME: &str = "EVENTS";

/// A named channel events are published to and subscribed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// A prize was created (`prize.created`).
    #[serde(rename = "prize.created")]
    PrizeCreated,
    /// A laureate was created (`laureate.created`).
    #[serde(rename = "laureate.created")]
    LaureateCreated,
}

impl Subject {
    /// Every known subject.
    pub const ALL: [Self; 2] = [Self::PrizeCreated, Self::LaureateCreated];

    /// The subject string on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrizeCreated => "prize.created",
            Self::LaureateCreated => "laureate.created",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|subject| subject.as_str() == s)
            .ok_or_else(|| EventError::Subscription(format!("unknown subject {s:?}")))
    }
}

/// A payload type that travels on exactly one subject.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The subject this payload is published on.
    const SUBJECT: Subject;
}

impl DomainEvent for Prize {
    const SUBJECT: Subject = Subject::PrizeCreated;
}

impl DomainEvent for Laureate {
    const SUBJECT: Subject = Subject::LaureateCreated;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_render_fixed_names() {
        assert_eq!(Subject::PrizeCreated.to_string(), "prize.created");
        assert_eq!(Subject::LaureateCreated.to_string(), "laureate.created");
    }

    #[test]
    fn parse_accepts_known_subjects_only() {
        assert!(matches!("prize.created".parse::<Subject>(), Ok(Subject::PrizeCreated)));
        assert!(matches!(
            "laureate.created".parse::<Subject>(),
            Ok(Subject::LaureateCreated)
        ));
        assert!(matches!(
            "prize.deleted".parse::<Subject>(),
            Err(EventError::Subscription(_))
        ));
    }

    #[test]
    fn payload_types_bind_to_subjects() {
        assert_eq!(<Prize as DomainEvent>::SUBJECT, Subject::PrizeCreated);
        assert_eq!(<Laureate as DomainEvent>::SUBJECT, Subject::LaureateCreated);
    }
}
