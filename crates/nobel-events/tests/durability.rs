//! Journal-backed `MemoryLog` across restarts.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use nobel_events::{EventError, EventsConfig, LastMessageQuery, MemoryLog, Publisher, Subject};
use nobel_types::{Category, NonBlank, Prize};

fn prize(year: &str) -> Prize {
    Prize {
        year: year.to_owned(),
        category: Category::Chemistry,
        laureates: Vec::new(),
        overall_motivation: NonBlank::new("not awarded"),
    }
}

#[tokio::test]
async fn published_events_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let config = EventsConfig::default();

    {
        let log = MemoryLog::open(&path, &config).unwrap();
        let publisher = Publisher::new(log);
        publisher.publish_prize_created(&prize("1916")).await.unwrap();
        publisher.publish_prize_created(&prize("1917")).await.unwrap();
    }

    let log = MemoryLog::open(&path, &config).unwrap();
    assert_eq!(log.retained(Subject::PrizeCreated), 2);
    let last = LastMessageQuery::new(log.clone()).last_prize().await.unwrap();
    assert_eq!(last, prize("1917"));

    let next = Publisher::new(log)
        .publish_prize_created(&prize("1919"))
        .await
        .unwrap();
    assert_eq!(next, 3);
}

#[tokio::test]
async fn expired_records_are_not_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let config = EventsConfig {
        max_age: Duration::from_millis(20),
        ..EventsConfig::default()
    };

    {
        let log = MemoryLog::open(&path, &config).unwrap();
        Publisher::new(log)
            .publish_prize_created(&prize("1940"))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(60)).await;

    let log = MemoryLog::open(&path, &config).unwrap();
    assert_eq!(log.retained(Subject::PrizeCreated), 0);
    let err = LastMessageQuery::new(log.clone())
        .last_prize()
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    // The sequence counter still moved past the expired record.
    let next = Publisher::new(log)
        .publish_prize_created(&prize("1941"))
        .await
        .unwrap();
    assert_eq!(next, 2);
}

#[tokio::test]
async fn journal_is_held_by_one_log_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let config = EventsConfig::default();

    let first = MemoryLog::open(&path, &config).unwrap();
    let second = MemoryLog::open(&path, &config);
    assert!(matches!(second, Err(EventError::Journal(_))));

    drop(first);
    let reopened = MemoryLog::open(&path, &config).unwrap();
    Publisher::new(reopened)
        .publish_prize_created(&prize("1920"))
        .await
        .unwrap();
}

#[tokio::test]
async fn reopen_compacts_expired_records_away() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let config = EventsConfig {
        max_age: Duration::from_millis(20),
        ..EventsConfig::default()
    };

    {
        let log = MemoryLog::open(&path, &config).unwrap();
        Publisher::new(log)
            .publish_prize_created(&prize("1942"))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(60)).await;

    let _log = MemoryLog::open(&path, &config).unwrap();
    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk.lines().count(), 1);
    assert!(!on_disk.contains("payload"));
}
