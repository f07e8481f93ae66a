//! `last` command: print the newest retained event of one kind.

use clap::ValueEnum;
use nobel_events::{EventError, EventLog, LastMessageQuery};
use nobel_types::{Laureate, NonBlank, Prize};
use tracing::info;

/// Which subject to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventKind {
    /// `prize.created`
    Prize,
    /// `laureate.created`
    Laureate,
}

/// Fetch the last event of `kind` and render it for a terminal.
///
/// An empty subject renders as "no messages yet" rather than an error.
pub async fn run<L: EventLog>(log: L, kind: EventKind) -> Result<String, EventError> {
    let query = LastMessageQuery::new(log);
    let rendered = match kind {
        EventKind::Prize => query.last_prize().await.map(|prize| render_prize(&prize)),
        EventKind::Laureate => query
            .last_laureate()
            .await
            .map(|laureate| render_laureate(&laureate)),
    };
    match rendered {
        Ok(text) => {
            info!(kind = ?kind, "retrieved last message");
            Ok(text)
        }
        Err(EventError::NotFound { subject }) => Ok(format!("no messages yet on {subject}\n")),
        Err(e) => Err(e),
    }
}

/// Multi-line summary of a prize.
pub fn render_prize(prize: &Prize) -> String {
    let mut out = format!(
        "Last Prize Message:\nYear: {}\nCategory: {}\nOverall Motivation: {}\nNumber of Laureates: {}\n",
        prize.year,
        prize.category,
        prize.overall_motivation.as_ref().map_or("-", NonBlank::as_str),
        prize.laureates.len()
    );
    for (number, laureate) in (1_usize..).zip(&prize.laureates) {
        out.push_str(&format!("  Laureate {number}: {}\n", laureate.full_name()));
    }
    out
}

/// Multi-line summary of a laureate.
pub fn render_laureate(laureate: &Laureate) -> String {
    format!(
        "Last Laureate Message:\nID: {}\nName: {}\nMotivation: {}\nShare: {}\n",
        laureate.id,
        laureate.full_name(),
        laureate.motivation,
        laureate.share
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use nobel_events::{EventsConfig, MemoryLog, Publisher};
    use nobel_types::{Category, Share};

    use super::*;

    fn curie() -> Laureate {
        Laureate {
            id: 6,
            firstname: "Marie".to_owned(),
            surname: NonBlank::new("Curie"),
            motivation: "\"radium\"".to_owned(),
            share: Share::WHOLE,
        }
    }

    #[test]
    fn prize_summary_lists_laureates() {
        let prize = Prize {
            year: "1911".to_owned(),
            category: Category::Chemistry,
            laureates: vec![curie()],
            overall_motivation: None,
        };
        let text = render_prize(&prize);
        assert!(text.contains("Year: 1911"));
        assert!(text.contains("Category: chemistry"));
        assert!(text.contains("Overall Motivation: -"));
        assert!(text.contains("  Laureate 1: Marie Curie"));
    }

    #[test]
    fn laureate_summary_shows_share_as_fraction() {
        let text = render_laureate(&curie());
        assert!(text.contains("ID: 6"));
        assert!(text.contains("Share: 1/1"));
    }

    #[tokio::test]
    async fn empty_subject_is_not_an_error() {
        let log = MemoryLog::new(&EventsConfig::default());
        let text = run(log, EventKind::Laureate).await.unwrap();
        assert_eq!(text, "no messages yet on laureate.created\n");
    }

    #[tokio::test]
    async fn prints_most_recent_laureate() {
        let log = MemoryLog::new(&EventsConfig::default());
        Publisher::new(log.clone())
            .publish_laureate_created(&curie())
            .await
            .unwrap();
        let text = run(log, EventKind::Laureate).await.unwrap();
        assert!(text.starts_with("Last Laureate Message:\n"));
        assert!(text.contains("Name: Marie Curie"));
    }
}
