//! Configuration for the event subsystem.
//!
//! All configuration is loaded from environment variables. Both log
//! backends read the same struct; the in-process log ignores the broker
//! fields.

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

use crate::error::EventError;
use crate::subject::STREAM_NAME;

/// Default broker URL.
pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

/// Default retention window: 7 days.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(604_800);

/// Where a new subscription starts reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliverFrom {
    /// Only events published after the subscription was registered.
    #[default]
    New,
    /// Every retained event, then new ones.
    All,
}

impl fmt::Display for DeliverFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::All => "all",
        })
    }
}

impl FromStr for DeliverFrom {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(Self::New),
            "all" => Ok(Self::All),
            other => Err(EventError::Config(format!(
                "unknown deliver policy {other:?} (expected new or all)"
            ))),
        }
    }
}

/// Complete event subsystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsConfig {
    /// NATS server URL (e.g. `nats://localhost:4222`).
    pub nats_url: String,
    /// Stream that groups both subjects.
    pub stream_name: String,
    /// Events older than this are eligible for removal.
    pub max_age: Duration,
    /// How long the broker waits for an ack before redelivering.
    pub ack_wait: Duration,
    /// Delay before a negatively acknowledged event is redelivered.
    pub redelivery_delay: Duration,
    /// Maximum delivery attempts per event; `-1` means unlimited.
    pub max_deliver: i64,
    /// Where new subscriptions start reading.
    pub deliver_from: DeliverFrom,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_NATS_URL.to_owned(),
            stream_name: STREAM_NAME.to_owned(),
            max_age: DEFAULT_MAX_AGE,
            ack_wait: Duration::from_secs(30),
            redelivery_delay: Duration::from_secs(1),
            max_deliver: -1,
            deliver_from: DeliverFrom::New,
        }
    }
}

impl EventsConfig {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `NATS_URL` -- broker connection string (default `nats://localhost:4222`)
    /// - `EVENTS_STREAM` -- stream name (default `EVENTS`)
    /// - `EVENTS_MAX_AGE_SECS` -- retention window in seconds (default 604800)
    /// - `EVENTS_ACK_WAIT_SECS` -- broker ack wait in seconds (default 30)
    /// - `EVENTS_REDELIVERY_DELAY_MS` -- nak redelivery delay (default 1000)
    /// - `EVENTS_MAX_DELIVER` -- delivery attempts per event, `-1` unlimited (default -1)
    /// - `EVENTS_DELIVER_FROM` -- `new` or `all` (default `new`)
    pub fn from_env() -> Result<Self, EventError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EventError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_age_secs = parse_var(&lookup, "EVENTS_MAX_AGE_SECS", defaults.max_age.as_secs())?;
        if max_age_secs == 0 {
            return Err(EventError::Config(
                "EVENTS_MAX_AGE_SECS must be greater than zero".to_owned(),
            ));
        }
        let ack_wait_secs = parse_var(&lookup, "EVENTS_ACK_WAIT_SECS", defaults.ack_wait.as_secs())?;
        let redelivery_delay_ms: u64 =
            parse_var(&lookup, "EVENTS_REDELIVERY_DELAY_MS", 1000)?;
        let max_deliver = parse_var(&lookup, "EVENTS_MAX_DELIVER", defaults.max_deliver)?;
        if max_deliver == 0 || max_deliver < -1 {
            return Err(EventError::Config(format!(
                "EVENTS_MAX_DELIVER must be -1 or positive, got {max_deliver}"
            )));
        }
        let deliver_from = parse_var(&lookup, "EVENTS_DELIVER_FROM", defaults.deliver_from)?;

        Ok(Self {
            nats_url: lookup("NATS_URL").unwrap_or(defaults.nats_url),
            stream_name: lookup("EVENTS_STREAM").unwrap_or(defaults.stream_name),
            max_age: Duration::from_secs(max_age_secs),
            ack_wait: Duration::from_secs(ack_wait_secs),
            redelivery_delay: Duration::from_millis(redelivery_delay_ms),
            max_deliver,
            deliver_from,
        })
    }

    /// The delivery bound as a count, or `None` when unlimited.
    pub fn delivery_limit(&self) -> Option<u32> {
        u32::try_from(self.max_deliver).ok().filter(|limit| *limit > 0)
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, EventError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    lookup(name).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e| EventError::Config(format!("invalid {name}: {e}")))
    })
}
