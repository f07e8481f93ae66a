//! Loads a Nobel API dump and publishes it as domain events.
//!
//! Laureates go out first (one event per unique laureate id), then one
//! event per prize. A failed publish is logged and counted; it never stops
//! the rest of the feed.

use std::path::PathBuf;

use nobel_events::{EventLog, Publisher};
use nobel_types::{NobelResponse, unique_laureates};
use tracing::{debug, info, warn};

use crate::error::FeedError;

/// Public Nobel prize API endpoint.
pub const DEFAULT_NOBEL_API_URL: &str = "http://api.nobelprize.org/v1/prize.json";

/// Where to read the feed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// A JSON dump on disk.
    File(PathBuf),
    /// An HTTP endpoint returning the same JSON.
    Url(String),
}

/// Counts from one feed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedReport {
    /// Laureate events appended.
    pub laureates: usize,
    /// Prize events appended.
    pub prizes: usize,
    /// Events that could not be published.
    pub failed: usize,
}

/// Read and decode the feed.
pub async fn load(source: &FeedSource) -> Result<NobelResponse, FeedError> {
    let body = match source {
        FeedSource::File(path) => {
            info!(path = %path.display(), "reading feed file");
            tokio::fs::read(path).await?
        }
        FeedSource::Url(url) => fetch(url).await?,
    };
    Ok(serde_json::from_slice(&body)?)
}

async fn fetch(url: &str) -> Result<Vec<u8>, FeedError> {
    info!(url, "fetching feed");
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .map_err(|e| FeedError::Fetch(format!("request to {url} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::Fetch(format!("{url} returned {status}")));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| FeedError::Fetch(format!("failed to read body from {url}: {e}")))?;
    Ok(body.to_vec())
}

/// Convert `response` and publish every laureate, then every prize.
///
/// # Errors
///
/// [`FeedError::Model`] if any record fails conversion; nothing is published
/// in that case.
pub async fn publish_feed<L: EventLog>(
    publisher: &Publisher<L>,
    response: NobelResponse,
) -> Result<FeedReport, FeedError> {
    let prizes = response.into_prizes()?;
    let laureates = unique_laureates(&prizes);
    info!(
        prizes = prizes.len(),
        laureates = laureates.len(),
        "feed converted"
    );

    let mut report = FeedReport::default();
    for laureate in &laureates {
        match publisher.publish_laureate_created(laureate).await {
            Ok(sequence) => {
                debug!(id = laureate.id, sequence, "laureate published");
                report.laureates = report.laureates.saturating_add(1);
            }
            Err(e) => {
                warn!(id = laureate.id, error = %e, "failed to publish laureate");
                report.failed = report.failed.saturating_add(1);
            }
        }
    }
    for prize in &prizes {
        match publisher.publish_prize_created(prize).await {
            Ok(sequence) => {
                debug!(year = %prize.year, category = %prize.category, sequence, "prize published");
                report.prizes = report.prizes.saturating_add(1);
            }
            Err(e) => {
                warn!(
                    year = %prize.year,
                    category = %prize.category,
                    error = %e,
                    "failed to publish prize"
                );
                report.failed = report.failed.saturating_add(1);
            }
        }
    }

    info!(
        laureates = report.laureates,
        prizes = report.prizes,
        failed = report.failed,
        "feed published"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use nobel_events::{EventsConfig, LastMessageQuery, MemoryLog, Subject};

    use super::*;

    const DUMP: &str = r#"{
        "prizes": [
            {
                "year": "1911",
                "category": "chemistry",
                "laureates": [
                    {"id": "6", "firstname": "Marie", "surname": "Curie", "motivation": "\"radium\"", "share": "1"}
                ]
            },
            {
                "year": "1903",
                "category": "physics",
                "laureates": [
                    {"id": "4", "firstname": "Henri", "surname": "Becquerel", "motivation": "\"radioactivity\"", "share": "2"},
                    {"id": "5", "firstname": "Pierre", "surname": "Curie", "motivation": "\"radiation\"", "share": "4"},
                    {"id": "6", "firstname": "Marie", "surname": "Curie", "motivation": "\"radiation\"", "share": "4"}
                ]
            },
            {
                "year": "1940",
                "category": "medicine",
                "overallMotivation": "No Nobel Prize was awarded this year."
            }
        ]
    }"#;

    #[tokio::test]
    async fn publishes_unique_laureates_then_prizes() {
        let log = MemoryLog::new(&EventsConfig::default());
        let publisher = Publisher::new(log.clone());
        let response: NobelResponse = serde_json::from_str(DUMP).unwrap();

        let report = publish_feed(&publisher, response).await.unwrap();
        assert_eq!(
            report,
            FeedReport {
                laureates: 3,
                prizes: 3,
                failed: 0,
            }
        );
        assert_eq!(log.retained(Subject::LaureateCreated), 3);

        let last = LastMessageQuery::new(log).last_prize().await.unwrap();
        assert_eq!(last.year, "1940");
        assert!(last.laureates.is_empty());
    }

    #[tokio::test]
    async fn conversion_failure_publishes_nothing() {
        let log = MemoryLog::new(&EventsConfig::default());
        let publisher = Publisher::new(log.clone());
        let response: NobelResponse = serde_json::from_str(
            r#"{"prizes": [{"year": "2001", "category": "peace", "laureates": [
                {"id": "x", "firstname": "A", "motivation": "", "share": "1"}
            ]}]}"#,
        )
        .unwrap();

        let result = publish_feed(&publisher, response).await;
        assert!(matches!(result, Err(FeedError::Model(_))));
        assert_eq!(log.retained(Subject::PrizeCreated), 0);
        assert_eq!(log.retained(Subject::LaureateCreated), 0);
    }

    #[tokio::test]
    async fn loads_dump_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prize.json");
        tokio::fs::write(&path, DUMP).await.unwrap();

        let response = load(&FeedSource::File(path)).await.unwrap();
        assert_eq!(response.prizes.len(), 3);
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(&FeedSource::File(dir.path().join("absent.json"))).await;
        assert!(matches!(result, Err(FeedError::Read(_))));
    }
}
