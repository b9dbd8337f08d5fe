//! Telegram bot surface: long polling, command dispatch, replies.

use std::time::Duration;

use anyhow::anyhow;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::server_config::cfg;
use crate::state::ServerState;
use crate::tasks;
use crate::HttpClient;

const POLL_TIMEOUT_SECS: i64 = 50;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Refresh,
    Subscribe,
    Unsubscribe,
    Question(&'a str),
}

/// Classify an incoming message.
///
/// `/start`, `/refresh`, and `/greet` all trigger a refresh. Unknown slash
/// commands and plain text are treated as questions. A `@botname` suffix on
/// a command is ignored.
pub fn parse_command(text: &str) -> Command<'_> {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix('/') {
        let name = rest.split_whitespace().next().unwrap_or("");
        let name = name.split('@').next().unwrap_or(name);
        match name {
            "start" | "refresh" | "greet" => return Command::Refresh,
            "subscribe" => return Command::Subscribe,
            "unsubscribe" => return Command::Unsubscribe,
            _ => {}
        }
    }
    Command::Question(trimmed)
}

pub fn greeting(owner_name: &str) -> String {
    format!(
        "Hello, {}. Let's get working. I have access to your emails",
        owner_name
    )
}

/// Reply sent when handling failed. Index problems carry their own
/// remediation text; anything else gets a generic notice.
fn failure_reply(error: &AppError) -> String {
    match error {
        AppError::IndexNotReady | AppError::IndexPairMismatch => error.to_string(),
        _ => "Something went wrong handling that. Try again in a bit.".to_string(),
    }
}

fn api_url(method: &str) -> String {
    format!("https://api.telegram.org/bot{}/{}", cfg.bot_token, method)
}

async fn get_updates(http_client: &HttpClient, offset: i64) -> AppResult<Vec<Update>> {
    let resp = http_client
        .get(api_url("getUpdates"))
        .query(&[("offset", offset), ("timeout", POLL_TIMEOUT_SECS)])
        .send()
        .await?
        .json::<ApiResponse<Vec<Update>>>()
        .await?;

    if !resp.ok {
        return Err(anyhow!(
            "getUpdates failed: {}",
            resp.description.unwrap_or_default()
        )
        .into());
    }

    Ok(resp.result.unwrap_or_default())
}

pub async fn send_message(http_client: &HttpClient, chat_id: i64, text: &str) -> AppResult<()> {
    let resp = http_client
        .post(api_url("sendMessage"))
        .json(&json!({ "chat_id": chat_id, "text": text }))
        .send()
        .await?
        .json::<ApiResponse<serde_json::Value>>()
        .await?;

    if !resp.ok {
        return Err(anyhow!(
            "sendMessage to {} failed: {}",
            chat_id,
            resp.description.unwrap_or_default()
        )
        .into());
    }

    Ok(())
}

async fn handle_message(state: &ServerState, chat_id: i64, text: &str) -> AppResult<String> {
    match parse_command(text) {
        Command::Refresh => {
            let outcome = tasks::run_refresh(state).await?;
            Ok(format!(
                "{}\n{}",
                greeting(&cfg.assistant.owner_name),
                outcome
            ))
        }
        Command::Subscribe => Ok(if state.subscribe(chat_id).await {
            "Subscribed. The daily summary will be sent here.".to_string()
        } else {
            "Already subscribed.".to_string()
        }),
        Command::Unsubscribe => Ok(if state.unsubscribe(chat_id).await {
            "Unsubscribed. No more daily summaries here.".to_string()
        } else {
            "This chat was not subscribed.".to_string()
        }),
        Command::Question(question) => state.answerer.answer(question).await,
    }
}

/// Long-poll loop. Handler errors are logged and answered with a failure
/// notice; polling errors are logged and retried. The loop never returns.
pub async fn run(state: ServerState) {
    println!("Bot started and waiting for new messages");

    let mut offset: i64 = 0;
    loop {
        let updates = match get_updates(&state.http_client, offset).await {
            Ok(updates) => updates,
            Err(e) => {
                error!("Error polling updates: {:?}", e);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            if update.update_id >= offset {
                offset = update.update_id + 1;
            }
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };
            let chat_id = message.chat.id;
            info!(chat_id, "Message received: {}", text);

            let reply = match handle_message(&state, chat_id, &text).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!("Error handling message: {:?}", e);
                    failure_reply(&e)
                }
            };
            if let Err(e) = send_message(&state.http_client, chat_id, &reply).await {
                error!("Error sending reply to {}: {:?}", chat_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::common::fake_state;

    #[test]
    fn test_parse_command_refresh_aliases() {
        assert_eq!(parse_command("/start"), Command::Refresh);
        assert_eq!(parse_command("/refresh"), Command::Refresh);
        assert_eq!(parse_command("/greet"), Command::Refresh);
        assert_eq!(parse_command("  /refresh  "), Command::Refresh);
        assert_eq!(parse_command("/refresh@InboxBot"), Command::Refresh);
    }

    #[test]
    fn test_parse_command_subscriptions() {
        assert_eq!(parse_command("/subscribe"), Command::Subscribe);
        assert_eq!(parse_command("/unsubscribe"), Command::Unsubscribe);
    }

    #[test]
    fn test_everything_else_is_a_question() {
        assert_eq!(
            parse_command("When is rent due?"),
            Command::Question("When is rent due?")
        );
        assert_eq!(parse_command("/help"), Command::Question("/help"));
        assert_eq!(
            parse_command(" did anything arrive today "),
            Command::Question("did anything arrive today")
        );
    }

    #[test]
    fn test_greeting_text() {
        assert_eq!(
            greeting("Ritik"),
            "Hello, Ritik. Let's get working. I have access to your emails"
        );
    }

    #[test]
    fn test_failure_replies() {
        assert_eq!(
            failure_reply(&AppError::IndexNotReady),
            AppError::IndexNotReady.to_string()
        );
        assert_eq!(
            failure_reply(&AppError::Internal(anyhow!("boom"))),
            "Something went wrong handling that. Try again in a bit."
        );
    }

    #[tokio::test]
    async fn test_subscription_replies() {
        let state = fake_state("ok");

        assert_eq!(
            handle_message(&state, 7, "/subscribe").await.unwrap(),
            "Subscribed. The daily summary will be sent here."
        );
        assert_eq!(
            handle_message(&state, 7, "/subscribe").await.unwrap(),
            "Already subscribed."
        );
        assert_eq!(state.subscriber_ids().await, vec![7]);

        assert_eq!(
            handle_message(&state, 9, "/unsubscribe").await.unwrap(),
            "This chat was not subscribed."
        );
        assert_eq!(
            handle_message(&state, 7, "/unsubscribe").await.unwrap(),
            "Unsubscribed. No more daily summaries here."
        );
        assert!(state.subscriber_ids().await.is_empty());
    }

    #[test]
    fn test_parse_update_payload() {
        let body = serde_json::json!({
            "ok": true,
            "result": [{
                "update_id": 8101,
                "message": {
                    "message_id": 44,
                    "chat": { "id": 5150, "type": "private" },
                    "text": "/refresh"
                }
            }]
        });
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_value(body).unwrap();
        assert!(parsed.ok);
        let updates = parsed.result.unwrap();
        assert_eq!(updates[0].update_id, 8101);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 5150);
        assert_eq!(message.text.as_deref(), Some("/refresh"));
    }
}
