pub mod openai;

use async_trait::async_trait;
use indoc::indoc;
use minijinja::render;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::index::SearchHit;

/// Chat completion seam. Production uses [`openai::OpenAiChat`]; tests swap
/// in a canned fake.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> AppResult<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    FunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: PromptUsage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiErrorBody {
    pub error: ChatApiError,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiErrorBody),
}

const QA_TEMPLATE: &str = indoc! {r#"
    Task: Understand the content & context of my emails and create a list of actionable items from the email content. Keep in mind that you're a chat-bot, respond to me as if you're chatting with me on WhatsApp/Telegram.
    Style: Like a regular human personal assistant with access to my emails
    Tone: Humane
    Audience: 20-year old
    Length: 2 paragraphs
    Note: A user may be having questions about certain emails. Respond to them appropriately without diverting the topic of the email or the conversation.

    Be smart enough to separate newsletter content from more important emails.

    Respond with only the format below:

    Hey, [greeting message of your choice].

    There are [NUMBER OF NEW EMAILS] new emails in your inbox. Here is a list of actionable items for you:

    [ACTIONABLE ITEM LIST ONLY BASED ON THE CONTENT OF THE EMAILS]

    Have a good one! [ADD A QUOTE TO MOTIVATE THE USER FOR HIS DAY]
    ---


    Context: {{ context }}

    Human: {{ question }}"#
};

/// Build the retrieval-augmented user prompt.
///
/// Retrieved chunks are stuffed into the template's context slot, best hit
/// first, separated by blank lines.
pub fn qa_prompt(hits: &[SearchHit], question: &str) -> String {
    let context = hits
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    render!(QA_TEMPLATE, context, question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StoredChunk;

    #[test]
    fn test_qa_prompt_stuffs_hits_and_question() {
        let hits = vec![
            SearchHit {
                score: 0.9,
                chunk: StoredChunk {
                    row: 0,
                    text: "From: alice@example.com\nSubject: Rent\nBody: Due Friday.".to_string(),
                },
            },
            SearchHit {
                score: 0.5,
                chunk: StoredChunk {
                    row: 3,
                    text: "From: bob@example.com\nSubject: Standup\nBody: Moved to 10am."
                        .to_string(),
                },
            },
        ];

        let prompt = qa_prompt(&hits, "When is rent due?");

        assert!(prompt.starts_with("Task: Understand the content"));
        assert!(prompt.contains(
            "From: alice@example.com\nSubject: Rent\nBody: Due Friday.\n\nFrom: bob@example.com"
        ));
        assert!(prompt.ends_with("Human: When is rent due?"));
    }

    #[test]
    fn test_qa_prompt_with_no_hits() {
        let prompt = qa_prompt(&[], "Anything new?");

        assert!(prompt.contains("Context: \n"));
        assert!(prompt.ends_with("Human: Anything new?"));
    }

    #[test]
    fn test_parse_chat_response() {
        let body = serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Rent is due Friday." },
                "finish_reason": "stop",
            }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128 },
        });
        let parsed: ChatApiResponseOrError = serde_json::from_value(body).unwrap();
        let ChatApiResponseOrError::Response(response) = parsed else {
            panic!("expected the response arm");
        };
        assert_eq!(response.choices[0].message.content, "Rent is due Friday.");
        assert_eq!(response.usage.total_tokens, 128);
    }

    #[test]
    fn test_parse_chat_error() {
        let body = serde_json::json!({
            "error": { "message": "Rate limit reached", "type": "tokens", "code": null }
        });
        let parsed: ChatApiResponseOrError = serde_json::from_value(body).unwrap();
        let ChatApiResponseOrError::Error(error) = parsed else {
            panic!("expected the error arm");
        };
        assert_eq!(error.error.message, "Rate limit reached");
    }
}
