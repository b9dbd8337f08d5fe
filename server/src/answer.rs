//! Retrieval-augmented question answering with conversation memory.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::RwLock;

use crate::embed::Embedder;
use crate::error::{AppError, AppResult};
use crate::index::VectorIndex;
use crate::prompt::{qa_prompt, ChatMessage, ChatModel};

/// Answers questions over the indexed mail.
///
/// Every answered turn is appended to a shared conversation buffer, which is
/// replayed ahead of the next question. The buffer is unbounded.
pub struct AnswerService {
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    index: Arc<RwLock<Option<VectorIndex>>>,
    memory: Arc<RwLock<Vec<ChatMessage>>>,
    top_k: usize,
}

impl AnswerService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        index: Arc<RwLock<Option<VectorIndex>>>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            chat,
            index,
            memory: Arc::new(RwLock::new(Vec::new())),
            top_k,
        }
    }

    /// Answer a question from the index.
    ///
    /// Fails with [`AppError::IndexNotReady`] while no index has been built.
    pub async fn answer(&self, question: &str) -> AppResult<String> {
        let query = self
            .embedder
            .embed(&[question.to_string()])
            .await?
            .into_iter()
            .next()
            .context("Embeddings API returned no vector for the question")?;

        let hits = {
            let guard = self.index.read().await;
            let index = guard.as_ref().ok_or(AppError::IndexNotReady)?;
            index.search(&query, self.top_k)
        };

        let prompt = qa_prompt(&hits, question);
        let mut messages = self.memory.read().await.clone();
        messages.push(ChatMessage::user(prompt));

        let reply = self.chat.complete(&messages).await?;

        let mut memory = self.memory.write().await;
        memory.push(ChatMessage::user(question));
        memory.push(ChatMessage::assistant(reply.clone()));

        Ok(reply)
    }

    /// Number of messages in the conversation buffer.
    pub async fn memory_len(&self) -> usize {
        self.memory.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StoredChunk;
    use crate::testing::common::{FakeChat, FakeEmbedder};

    async fn indexed_service(chat: Arc<FakeChat>) -> AnswerService {
        let embedder = Arc::new(FakeEmbedder::new());
        let chunks = vec![
            StoredChunk {
                row: 0,
                text: "From: landlord@example.com\nSubject: Rent\nBody: Rent is due Friday."
                    .to_string(),
            },
            StoredChunk {
                row: 1,
                text: "From: gym@example.com\nSubject: Class\nBody: Yoga moved to Sunday."
                    .to_string(),
            },
        ];
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await.unwrap();
        let index = VectorIndex::new("fake-embedding-001".to_string(), vectors, chunks).unwrap();

        AnswerService::new(
            embedder,
            chat,
            Arc::new(RwLock::new(Some(index))),
            4,
        )
    }

    #[tokio::test]
    async fn test_answer_stuffs_retrieved_context() {
        let chat = Arc::new(FakeChat::new("Rent is due on Friday."));
        let service = indexed_service(chat.clone()).await;

        let reply = service.answer("When is rent due?").await.unwrap();

        assert_eq!(reply, "Rent is due on Friday.");
        let seen = chat.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let request = &seen[0];
        assert_eq!(request.len(), 1);
        assert_eq!(request[0].role, "user");
        assert!(request[0].content.contains("Subject: Rent"));
        assert!(request[0].content.ends_with("Human: When is rent due?"));
    }

    #[tokio::test]
    async fn test_conversation_memory_grows_without_bound() {
        let chat = Arc::new(FakeChat::new("Noted."));
        let service = indexed_service(chat.clone()).await;

        service.answer("First question?").await.unwrap();
        service.answer("Second question?").await.unwrap();
        assert_eq!(service.memory_len().await, 4);

        let seen = chat.seen.lock().unwrap();
        // Second request replays the first turn before the new prompt.
        let second = &seen[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].role, "user");
        assert_eq!(second[0].content, "First question?");
        assert_eq!(second[1].role, "assistant");
        assert_eq!(second[1].content, "Noted.");
        assert!(second[2].content.ends_with("Human: Second question?"));
    }

    #[tokio::test]
    async fn test_answer_without_an_index_fails() {
        let chat = Arc::new(FakeChat::new("unused"));
        let service = AnswerService::new(
            Arc::new(FakeEmbedder::new()),
            chat,
            Arc::new(RwLock::new(None)),
            4,
        );

        let result = service.answer("Anything new?").await;
        assert!(matches!(result, Err(AppError::IndexNotReady)));
    }
}
