//! Scheduled and command-triggered jobs.

use tracing::{error, info};

use crate::bot;
use crate::error::AppResult;
use crate::ingest::{run_ingest, IngestOutcome};
use crate::server_config::cfg;
use crate::state::ServerState;

/// Re-ingest the inbox and, when the index was rebuilt, swap it in.
pub async fn run_refresh(state: &ServerState) -> AppResult<IngestOutcome> {
    let outcome = run_ingest(&state.inbox, state.embedder.as_ref(), &state.settings).await?;
    if let IngestOutcome::Indexed { .. } = outcome {
        state.reload_index().await?;
    }
    Ok(outcome)
}

/// Daily job: refresh the index and push a summary to every subscriber.
///
/// Nothing is pushed when the inbox had no unread mail.
pub async fn run_daily_summary(state: &ServerState) -> AppResult<()> {
    let outcome = run_refresh(state).await?;
    if outcome == IngestOutcome::NoNewEmails {
        info!("Daily summary skipped, no new emails");
        return Ok(());
    }

    let summary = state.answerer.answer(&cfg.summary.question).await?;

    let subscribers = state.subscriber_ids().await;
    info!(subscribers = subscribers.len(), "Pushing daily summary");
    for chat_id in subscribers {
        if let Err(e) = bot::send_message(&state.http_client, chat_id, &summary).await {
            error!("Error sending daily summary to {}: {:?}", chat_id, e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::testing::common::fake_state;

    #[tokio::test]
    async fn test_refresh_propagates_mailbox_failures() {
        let state = fake_state("ok");

        let result = run_refresh(&state).await;
        assert!(matches!(result, Err(AppError::Mailbox(_))));
    }
}
