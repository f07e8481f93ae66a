//! In-process implementation of [`EventLog`].
//!
//! Every subject owns its own lock around a sequence counter and a retention
//! buffer, so publishes on different subjects never contend. Subscriptions
//! are tokio tasks that walk the buffer with a cursor, waking on a
//! [`watch`] channel whenever the subject's tail moves.
//!
//! Durability is optional: [`MemoryLog::open`] attaches a journal that is
//! synced before `publish` returns and replayed on the next open. Journal
//! writes run on the blocking pool, one publish per subject at a time.
//! Records that have expired are dropped from the file when it is opened
//! and by [`MemoryLog::compact_journal`].
//!
//! # Retention
//!
//! Entries older than `max_age` are removed by [`MemoryLog::sweep_expired`]
//! (also run on every publish). An entry a live subscription has not yet
//! picked up is pinned until it has been handed to that subscription's
//! handler at least once. Pinned or not, expired entries are never returned
//! from [`EventLog::last_message`].

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::journal::{Journal, JournalRecord};
use super::{
    Delivery, Disposition, EventLog, LogMessage, LogSubscription, MessageHandler, invoke,
};
use crate::config::{DeliverFrom, EventsConfig};
use crate::error::EventError;
use crate::subject::Subject;

/// An event log held in process memory.
///
/// Cloning is cheap; clones share the same log.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    subjects: BTreeMap<Subject, SubjectLog>,
    journal: Option<Arc<Journal>>,
    /// Set when a sweep removed entries the journal still holds.
    journal_stale: AtomicBool,
    max_age: TimeDelta,
    redelivery_delay: Duration,
    delivery_limit: Option<u32>,
    deliver_from: DeliverFrom,
    next_subscription: AtomicU64,
}

#[derive(Debug)]
struct SubjectLog {
    /// Held by a publish from sequence allocation until the entry is visible.
    publish_gate: AsyncMutex<()>,
    state: Mutex<SubjectState>,
    tail: watch::Sender<u64>,
}

#[derive(Debug, Default)]
struct SubjectState {
    /// Highest sequence handed to a publisher, including failed publishes.
    allocated: u64,
    /// Highest sequence visible in `entries`.
    last_sequence: u64,
    entries: VecDeque<Entry>,
    /// Next sequence each live subscription has yet to pick up.
    cursors: BTreeMap<u64, u64>,
}

#[derive(Debug, Clone)]
struct Entry {
    sequence: u64,
    published_at: DateTime<Utc>,
    payload: Bytes,
}

impl MemoryLog {
    /// Create an empty, non-journaled log.
    pub fn new(config: &EventsConfig) -> Self {
        Self {
            inner: Arc::new(Inner::new(config, None)),
        }
    }

    /// Open a journaled log at `path`, replaying any events already recorded.
    ///
    /// Expired records are skipped during replay but still advance the
    /// subject's sequence counter, so sequence numbers are never reused.
    /// If any were skipped the journal is compacted before this returns.
    ///
    /// The journal is locked for the lifetime of the log; opening a journal
    /// another process holds fails with [`EventError::Journal`].
    pub fn open(path: &Path, config: &EventsConfig) -> Result<Self, EventError> {
        let (journal, records) = Journal::open(path)?;
        let journal = Arc::new(journal);
        let inner = Inner::new(config, Some(Arc::clone(&journal)));
        let cutoff = inner.cutoff(Utc::now());

        let total = records.len();
        let mut replayed: usize = 0;
        for record in records {
            let Some(subject_log) = inner.subjects.get(&record.subject) else {
                continue;
            };
            let mut state = lock(&subject_log.state);
            if record.sequence <= state.last_sequence {
                warn!(
                    subject = %record.subject,
                    sequence = record.sequence,
                    "skipping out-of-order journal record"
                );
                continue;
            }
            state.allocated = record.sequence;
            state.last_sequence = record.sequence;
            if let Some(payload) = record.payload
                && cutoff.is_none_or(|cutoff| record.published_at > cutoff)
            {
                state.entries.push_back(Entry {
                    sequence: record.sequence,
                    published_at: record.published_at,
                    payload: Bytes::from(payload),
                });
                replayed = replayed.saturating_add(1);
            }
            subject_log.tail.send_replace(state.last_sequence);
        }

        if replayed < total {
            let records = inner.journal_records();
            journal.rewrite(&records)?;
            debug!(
                kept = records.len(),
                dropped = total.saturating_sub(replayed),
                "journal compacted"
            );
        }
        info!(
            path = %path.display(),
            replayed,
            "event journal opened"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    #[cfg(test)]
    fn with_journal(config: &EventsConfig, journal: Journal) -> Self {
        Self {
            inner: Arc::new(Inner::new(config, Some(Arc::new(journal)))),
        }
    }

    /// Remove expired entries from every subject. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let Some(cutoff) = self.inner.cutoff(Utc::now()) else {
            return 0;
        };
        let removed = self
            .inner
            .subjects
            .values()
            .map(|subject_log| lock(&subject_log.state).sweep(cutoff))
            .fold(0_usize, usize::saturating_add);
        self.inner.mark_swept(removed);
        removed
    }

    /// Rewrite the journal so it holds only the entries still retained.
    ///
    /// Publishes wait while the rewrite runs. Returns the number of records
    /// written; a log without a journal returns 0.
    pub async fn compact_journal(&self) -> Result<usize, EventError> {
        let Some(journal) = &self.inner.journal else {
            return Ok(0);
        };
        let mut gates = Vec::with_capacity(self.inner.subjects.len());
        for subject_log in self.inner.subjects.values() {
            gates.push(subject_log.publish_gate.lock().await);
        }

        self.inner.journal_stale.store(false, Ordering::Relaxed);
        let records = self.inner.journal_records();
        let kept = records.len();
        let journal = Arc::clone(journal);
        let rewritten = tokio::task::spawn_blocking(move || journal.rewrite(&records))
            .await
            .map_err(std::io::Error::other)
            .and_then(|result| result);
        drop(gates);
        if let Err(e) = rewritten {
            self.inner.journal_stale.store(true, Ordering::Relaxed);
            return Err(e.into());
        }
        debug!(kept, "journal compacted");
        Ok(kept)
    }

    /// Number of entries currently retained for `subject`, expired or not.
    pub fn retained(&self, subject: Subject) -> usize {
        self.inner
            .subjects
            .get(&subject)
            .map_or(0, |subject_log| lock(&subject_log.state).entries.len())
    }

    /// Spawn a task that calls [`sweep_expired`](Self::sweep_expired) every `interval`.
    ///
    /// After a sweep that left stale records in the journal the task also
    /// runs [`compact_journal`](Self::compact_journal). It stops when
    /// `shutdown` is cancelled.
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let log = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = log.sweep_expired();
                        if removed > 0 {
                            debug!(removed, "swept expired events");
                        }
                        if log.inner.journal_stale.load(Ordering::Relaxed)
                            && let Err(e) = log.compact_journal().await
                        {
                            warn!(error = %e, "journal compaction failed");
                        }
                    }
                }
            }
        })
    }

    fn subject_log(&self, subject: Subject) -> Result<&SubjectLog, EventError> {
        self.inner
            .subjects
            .get(&subject)
            .ok_or_else(|| EventError::Subscription(format!("subject {subject} is not configured")))
    }
}

impl Inner {
    fn new(config: &EventsConfig, journal: Option<Arc<Journal>>) -> Self {
        let subjects = Subject::ALL
            .into_iter()
            .map(|subject| {
                let (tail, _) = watch::channel(0);
                (
                    subject,
                    SubjectLog {
                        publish_gate: AsyncMutex::new(()),
                        state: Mutex::new(SubjectState::default()),
                        tail,
                    },
                )
            })
            .collect();
        Self {
            subjects,
            journal,
            journal_stale: AtomicBool::new(false),
            max_age: TimeDelta::from_std(config.max_age).unwrap_or(TimeDelta::MAX),
            redelivery_delay: config.redelivery_delay,
            delivery_limit: config.delivery_limit(),
            deliver_from: config.deliver_from,
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Entries published at or before the returned instant are expired.
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.max_age)
    }

    /// Pick up the first entry at or after `cursor` and advance the subscription's pin past it.
    fn take_next(&self, subject: Subject, id: u64, cursor: u64) -> Option<LogMessage> {
        let subject_log = self.subjects.get(&subject)?;
        let mut state = lock(&subject_log.state);
        let index = state.entries.partition_point(|entry| entry.sequence < cursor);
        let entry = state.entries.get(index).cloned()?;
        state.cursors.insert(id, entry.sequence.saturating_add(1));
        Some(LogMessage {
            subject,
            sequence: entry.sequence,
            payload: entry.payload,
        })
    }

    fn mark_swept(&self, removed: usize) {
        if removed > 0 && self.journal.is_some() {
            self.journal_stale.store(true, Ordering::Relaxed);
        }
    }

    /// Retained entries as journal records, plus a payload-less record for
    /// any subject whose counter has moved past its last retained entry.
    fn journal_records(&self) -> Vec<JournalRecord> {
        let now = Utc::now();
        let mut records = Vec::new();
        for (&subject, subject_log) in &self.subjects {
            let state = lock(&subject_log.state);
            records.extend(state.entries.iter().map(|entry| JournalRecord {
                subject,
                sequence: entry.sequence,
                published_at: entry.published_at,
                payload: Some(entry.payload.to_vec()),
            }));
            let newest = state.entries.back().map_or(0, |entry| entry.sequence);
            if state.allocated > newest {
                records.push(JournalRecord {
                    subject,
                    sequence: state.allocated,
                    published_at: now,
                    payload: None,
                });
            }
        }
        records
    }

    fn release(&self, subject: Subject, id: u64) {
        if let Some(subject_log) = self.subjects.get(&subject) {
            lock(&subject_log.state).cursors.remove(&id);
        }
    }
}

impl SubjectState {
    /// Drop expired entries from the front, stopping at the lowest pinned sequence.
    fn sweep(&mut self, cutoff: DateTime<Utc>) -> usize {
        let pinned = self.cursors.values().min().copied();
        let mut removed: usize = 0;
        while let Some(front) = self.entries.front() {
            let expired = front.published_at <= cutoff;
            let is_pinned = pinned.is_some_and(|pin| front.sequence >= pin);
            if !expired || is_pinned {
                break;
            }
            self.entries.pop_front();
            removed = removed.saturating_add(1);
        }
        removed
    }
}

impl EventLog for MemoryLog {
    type Subscription = MemorySubscription;

    async fn publish(&self, subject: Subject, payload: Bytes) -> Result<u64, EventError> {
        let subject_log = self.subject_log(subject)?;
        let _gate = subject_log.publish_gate.lock().await;
        let published_at = Utc::now();

        // A sequence is spent once allocated, even if the append fails, since
        // the record may already have reached the file.
        let sequence = {
            let mut state = lock(&subject_log.state);
            let sequence = state.allocated.checked_add(1).ok_or_else(|| {
                EventError::Publish(format!("sequence space exhausted on {subject}"))
            })?;
            state.allocated = sequence;
            sequence
        };

        // Durable before visible: nothing is acknowledged or delivered
        // until the journal has it on disk.
        if let Some(journal) = &self.inner.journal {
            let path = journal.path().display().to_string();
            let journal = Arc::clone(journal);
            let record = JournalRecord {
                subject,
                sequence,
                published_at,
                payload: Some(payload.to_vec()),
            };
            let appended = tokio::task::spawn_blocking(move || journal.append(&record))
                .await
                .map_err(std::io::Error::other)
                .and_then(|result| result);
            if let Err(e) = appended {
                return Err(EventError::Publish(format!(
                    "journal append to {path} failed: {e}"
                )));
            }
        }

        {
            let mut state = lock(&subject_log.state);
            state.last_sequence = sequence;
            state.entries.push_back(Entry {
                sequence,
                published_at,
                payload,
            });
            if let Some(cutoff) = self.inner.cutoff(published_at) {
                let removed = state.sweep(cutoff);
                self.inner.mark_swept(removed);
            }
        }

        subject_log.tail.send_replace(sequence);
        debug!(subject = %subject, sequence, "appended event");
        Ok(sequence)
    }

    async fn subscribe(
        &self,
        subject: Subject,
        handler: MessageHandler,
    ) -> Result<MemorySubscription, EventError> {
        let subject_log = self.subject_log(subject)?;
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);

        let (start, tail) = {
            let mut state = lock(&subject_log.state);
            let after_tail = state.last_sequence.saturating_add(1);
            let start = match self.inner.deliver_from {
                DeliverFrom::New => after_tail,
                DeliverFrom::All => state
                    .entries
                    .front()
                    .map_or(after_tail, |entry| entry.sequence),
            };
            state.cursors.insert(id, start);
            (start, subject_log.tail.subscribe())
        };

        let token = CancellationToken::new();
        let worker = DeliveryWorker {
            inner: Arc::clone(&self.inner),
            subject,
            id,
            handler,
            token: token.clone(),
        };
        let task = tokio::spawn(worker.run(start, tail));

        info!(subject = %subject, subscription = id, start, "subscription registered");
        Ok(MemorySubscription {
            inner: Arc::clone(&self.inner),
            subject,
            id,
            token,
            task: Some(task),
        })
    }

    async fn last_message(&self, subject: Subject) -> Result<LogMessage, EventError> {
        let subject_log = self.subject_log(subject)?;
        let cutoff = self.inner.cutoff(Utc::now());
        let state = lock(&subject_log.state);
        state
            .entries
            .back()
            .filter(|entry| cutoff.is_none_or(|cutoff| entry.published_at > cutoff))
            .map(|entry| LogMessage {
                subject,
                sequence: entry.sequence,
                payload: entry.payload.clone(),
            })
            .ok_or(EventError::NotFound { subject })
    }
}

/// Handle for a [`MemoryLog`] subscription.
///
/// Dropping the handle stops delivery after the current handler invocation;
/// [`unsubscribe`](LogSubscription::unsubscribe) additionally waits for it.
#[derive(Debug)]
pub struct MemorySubscription {
    inner: Arc<Inner>,
    subject: Subject,
    id: u64,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LogSubscription for MemorySubscription {
    fn subject(&self) -> Subject {
        self.subject
    }

    async fn unsubscribe(mut self) -> Result<(), EventError> {
        self.token.cancel();
        let joined = match self.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        };
        self.inner.release(self.subject, self.id);
        joined.map_err(|e| {
            EventError::Unsubscribe(format!(
                "{} subscription {} did not stop cleanly: {e}",
                self.subject, self.id
            ))
        })?;
        debug!(subject = %self.subject, subscription = self.id, "unsubscribed");
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.token.cancel();
        if self.task.is_some() {
            self.inner.release(self.subject, self.id);
        }
    }
}

/// The per-subscription delivery loop.
struct DeliveryWorker {
    inner: Arc<Inner>,
    subject: Subject,
    id: u64,
    handler: MessageHandler,
    token: CancellationToken,
}

impl DeliveryWorker {
    async fn run(self, start: u64, mut tail: watch::Receiver<u64>) {
        let mut cursor = start;
        while !self.token.is_cancelled() {
            tail.borrow_and_update();
            if let Some(message) = self.inner.take_next(self.subject, self.id, cursor) {
                cursor = message.sequence.saturating_add(1);
                if !self.deliver(message).await {
                    break;
                }
                continue;
            }

            tokio::select! {
                () = self.token.cancelled() => break,
                changed = tail.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(subject = %self.subject, subscription = self.id, "delivery loop stopped");
    }

    /// Deliver one message until it is acked, terminated or given up on.
    ///
    /// Returns `false` if cancelled while waiting to redeliver.
    async fn deliver(&self, message: LogMessage) -> bool {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let delivery = Delivery {
                message: message.clone(),
                attempt,
            };
            match invoke(&self.handler, delivery).await {
                Disposition::Ack => return true,
                Disposition::Term => {
                    debug!(
                        subject = %self.subject,
                        sequence = message.sequence,
                        "message terminated, not redelivering"
                    );
                    return true;
                }
                Disposition::Nak => {
                    if self.inner.delivery_limit.is_some_and(|limit| attempt >= limit) {
                        warn!(
                            subject = %self.subject,
                            sequence = message.sequence,
                            attempt,
                            "delivery limit reached, dropping message"
                        );
                        return true;
                    }
                    debug!(
                        subject = %self.subject,
                        sequence = message.sequence,
                        attempt,
                        "message nacked, scheduling redelivery"
                    );
                    tokio::select! {
                        () = self.token.cancelled() => return false,
                        () = tokio::time::sleep(self.inner.redelivery_delay) => {}
                    }
                }
            }
        }
    }
}

fn lock(state: &Mutex<SubjectState>) -> MutexGuard<'_, SubjectState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
