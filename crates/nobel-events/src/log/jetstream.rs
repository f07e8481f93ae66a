//! NATS `JetStream` implementation of [`EventLog`].
//!
//! Both subjects live in one stream (`EVENTS` by default) with a maximum
//! age, so the broker handles retention and durability. Publishing waits for
//! the stream's publish ack. Each subscription is an ephemeral pull consumer
//! filtered to one subject with explicit acks; a [`Disposition::Nak`] maps
//! to a delayed `Nak` so the broker redelivers.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer, pull};
use async_nats::jetstream::context::PublishErrorKind;
use async_nats::jetstream::stream::{self, LastRawMessageErrorKind};
use async_nats::jetstream::{self, AckKind};
use bytes::Bytes;
use futures::StreamExt as _;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    Delivery, Disposition, EventLog, LogMessage, LogSubscription, MessageHandler, invoke,
};
use crate::config::{DeliverFrom, EventsConfig};
use crate::error::EventError;
use crate::subject::Subject;

/// How long the broker keeps an ephemeral consumer whose client went away.
const CONSUMER_INACTIVE_THRESHOLD: Duration = Duration::from_secs(300);

/// `JetStream`-backed event log.
///
/// Holds an explicitly constructed client handle; whoever connects owns it
/// and passes clones down to publishers and subscribers.
#[derive(Clone)]
pub struct JetStreamLog {
    context: jetstream::Context,
    config: Arc<EventsConfig>,
}

impl JetStreamLog {
    /// Connect to the NATS server in `config` and ensure the event stream exists.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Connection`] if the server is unreachable or the
    /// stream cannot be created.
    pub async fn connect(config: &EventsConfig) -> Result<Self, EventError> {
        info!(url = %config.nats_url, "connecting to NATS server");
        let client = async_nats::connect(config.nats_url.as_str())
            .await
            .map_err(|e| {
                EventError::Connection(format!("failed to connect to {}: {e}", config.nats_url))
            })?;
        info!("NATS connection established");
        Self::with_client(client, config).await
    }

    /// Build the log on an already connected client.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Connection`] if the stream cannot be created.
    pub async fn with_client(
        client: async_nats::Client,
        config: &EventsConfig,
    ) -> Result<Self, EventError> {
        let context = jetstream::new(client);
        context
            .get_or_create_stream(stream::Config {
                name: config.stream_name.clone(),
                subjects: Subject::ALL
                    .iter()
                    .map(|subject| subject.as_str().to_owned())
                    .collect(),
                max_age: config.max_age,
                ..Default::default()
            })
            .await
            .map_err(|e| {
                EventError::Connection(format!(
                    "failed to ensure stream {}: {e}",
                    config.stream_name
                ))
            })?;
        info!(
            stream = %config.stream_name,
            max_age_secs = config.max_age.as_secs(),
            "event stream ready"
        );
        Ok(Self {
            context,
            config: Arc::new(config.clone()),
        })
    }

    async fn stream(&self) -> Result<stream::Stream, String> {
        self.context
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| format!("failed to look up stream {}: {e}", self.config.stream_name))
    }
}

impl std::fmt::Debug for JetStreamLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JetStreamLog")
            .field("stream", &self.config.stream_name)
            .finish_non_exhaustive()
    }
}

impl EventLog for JetStreamLog {
    type Subscription = JetStreamSubscription;

    async fn publish(&self, subject: Subject, payload: Bytes) -> Result<u64, EventError> {
        let ack = self
            .context
            .publish(subject.as_str(), payload)
            .await
            .map_err(|e| match e.kind() {
                PublishErrorKind::BrokenPipe => {
                    EventError::Connection(format!("broker unavailable publishing to {subject}: {e}"))
                }
                _ => EventError::Publish(format!("failed to publish to {subject}: {e}")),
            })?;
        let ack = ack
            .await
            .map_err(|e| EventError::Publish(format!("no publish ack for {subject}: {e}")))?;
        debug!(subject = %subject, sequence = ack.sequence, "event stored");
        Ok(ack.sequence)
    }

    async fn subscribe(
        &self,
        subject: Subject,
        handler: MessageHandler,
    ) -> Result<JetStreamSubscription, EventError> {
        let stream = self.stream().await.map_err(EventError::Subscription)?;
        let name = format!("{}-{}", subject.as_str().replace('.', "-"), Uuid::now_v7());
        let consumer: PullConsumer = stream
            .create_consumer(consumer_config(&self.config, subject, &name))
            .await
            .map_err(|e| {
                EventError::Subscription(format!("failed to create consumer for {subject}: {e}"))
            })?;
        let messages = match consumer.messages().await {
            Ok(messages) => messages,
            Err(e) => {
                if let Err(cleanup) = stream.delete_consumer(&name).await {
                    warn!(
                        consumer = %name,
                        error = %cleanup,
                        "failed to delete consumer after subscribe error"
                    );
                }
                return Err(EventError::Subscription(format!(
                    "failed to open message stream for {subject}: {e}"
                )));
            }
        };

        let token = CancellationToken::new();
        let task = tokio::spawn(consume(
            messages,
            subject,
            name.clone(),
            handler,
            self.config.redelivery_delay,
            token.clone(),
        ));

        info!(subject = %subject, consumer = %name, "subscription registered");
        Ok(JetStreamSubscription {
            log: self.clone(),
            subject,
            consumer: name,
            token,
            task: Some(task),
        })
    }

    async fn last_message(&self, subject: Subject) -> Result<LogMessage, EventError> {
        let stream = self.stream().await.map_err(EventError::Transport)?;
        match stream.get_last_raw_message_by_subject(subject.as_str()).await {
            Ok(raw) => Ok(LogMessage {
                subject,
                sequence: raw.sequence,
                payload: raw.payload,
            }),
            Err(e) if matches!(e.kind(), LastRawMessageErrorKind::NoMessageFound) => {
                Err(EventError::NotFound { subject })
            }
            Err(e) => Err(EventError::Transport(format!(
                "failed to read last message on {subject}: {e}"
            ))),
        }
    }
}

/// Ephemeral pull consumer for one subscription.
///
/// One unacknowledged message at a time, so a Nak'd event is redelivered
/// before anything published after it.
fn consumer_config(config: &EventsConfig, subject: Subject, name: &str) -> pull::Config {
    pull::Config {
        name: Some(name.to_owned()),
        filter_subject: subject.as_str().to_owned(),
        deliver_policy: match config.deliver_from {
            DeliverFrom::New => DeliverPolicy::New,
            DeliverFrom::All => DeliverPolicy::All,
        },
        ack_policy: AckPolicy::Explicit,
        ack_wait: config.ack_wait,
        max_deliver: config.max_deliver,
        max_ack_pending: 1,
        inactive_threshold: CONSUMER_INACTIVE_THRESHOLD,
        ..Default::default()
    }
}

/// Pull messages for one consumer and hand each to `handler` in order.
async fn consume(
    mut messages: pull::Stream,
    subject: Subject,
    consumer: String,
    handler: MessageHandler,
    redelivery_delay: Duration,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            () = token.cancelled() => break,
            next = messages.next() => next,
        };
        let Some(next) = next else {
            break;
        };
        let message = match next {
            Ok(message) => message,
            Err(e) => {
                warn!(consumer = %consumer, error = %e, "error receiving message");
                continue;
            }
        };

        let (sequence, attempt) = match message.info() {
            Ok(info) => (
                info.stream_sequence,
                u32::try_from(info.delivered).unwrap_or(u32::MAX),
            ),
            Err(e) => {
                warn!(consumer = %consumer, error = %e, "message carried no delivery info");
                (0, 1)
            }
        };
        let delivery = Delivery {
            message: LogMessage {
                subject,
                sequence,
                payload: message.payload.clone(),
            },
            attempt,
        };

        let disposition = invoke(&handler, delivery).await;
        let acked = match disposition {
            Disposition::Ack => message.ack().await,
            Disposition::Nak => {
                message
                    .ack_with(AckKind::Nak(Some(redelivery_delay)))
                    .await
            }
            Disposition::Term => message.ack_with(AckKind::Term).await,
        };
        if let Err(e) = acked {
            warn!(
                consumer = %consumer,
                sequence,
                disposition = ?disposition,
                error = %e,
                "failed to acknowledge message"
            );
        }
    }
    debug!(consumer = %consumer, "consumer loop stopped");
}

/// Handle for a [`JetStreamLog`] subscription.
///
/// Dropping the handle stops the pull loop; the broker removes the consumer
/// once it has been inactive for five minutes.
/// [`unsubscribe`](LogSubscription::unsubscribe) deletes it immediately.
#[derive(Debug)]
pub struct JetStreamSubscription {
    log: JetStreamLog,
    subject: Subject,
    consumer: String,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LogSubscription for JetStreamSubscription {
    fn subject(&self) -> Subject {
        self.subject
    }

    async fn unsubscribe(mut self) -> Result<(), EventError> {
        self.token.cancel();
        let joined = match self.task.take() {
            Some(task) => task.await.map_err(|e| format!("consumer task failed: {e}")),
            None => Ok(()),
        };

        let deleted = match self.log.stream().await {
            Ok(stream) => stream
                .delete_consumer(&self.consumer)
                .await
                .map(|_| ())
                .map_err(|e| format!("failed to delete consumer: {e}")),
            Err(e) => Err(e),
        };

        match (joined, deleted) {
            (Ok(()), Ok(())) => {
                debug!(subject = %self.subject, consumer = %self.consumer, "unsubscribed");
                Ok(())
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(EventError::Unsubscribe(format!(
                "{} consumer {}: {e}",
                self.subject, self.consumer
            ))),
            (Err(join), Err(delete)) => Err(EventError::Unsubscribe(format!(
                "{} consumer {}: {join}; {delete}",
                self.subject, self.consumer
            ))),
        }
    }
}

impl Drop for JetStreamSubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
