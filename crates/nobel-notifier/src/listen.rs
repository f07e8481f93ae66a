//! `listen` command: log every prize and laureate event until Ctrl-C.

use nobel_events::{EventLog, Subscriber};
use nobel_types::{Laureate, Prize};
use tracing::{error, info};

/// Subscribe to both subjects and block until interrupted.
pub async fn run<L: EventLog>(log: L) -> anyhow::Result<()> {
    let mut subscriber = Subscriber::new(log);

    subscriber
        .subscribe_prize_created(|prize: Prize| async move {
            let json = serde_json::to_string_pretty(&prize)?;
            info!(prize = %json, "received prize created event");
            anyhow::Ok(())
        })
        .await?;
    subscriber
        .subscribe_laureate_created(|laureate: Laureate| async move {
            let json = serde_json::to_string_pretty(&laureate)?;
            info!(laureate = %json, "received laureate created event");
            anyhow::Ok(())
        })
        .await?;

    info!(active = subscriber.active(), "listening for events, Ctrl-C to stop");
    let interrupted = tokio::signal::ctrl_c().await;

    info!("shutting down");
    if let Err(e) = subscriber.close().await {
        error!(error = %e, "failed to close subscriptions cleanly");
        return Err(e.into());
    }
    interrupted?;
    info!("listener stopped");
    Ok(())
}
