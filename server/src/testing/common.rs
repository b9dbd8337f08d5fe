use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexSet;
use tokio::sync::RwLock;

use crate::answer::AnswerService;
use crate::embed::Embedder;
use crate::error::AppResult;
use crate::ingest::IngestSettings;
use crate::mail::client::InboxClient;
use crate::prompt::{ChatMessage, ChatModel};
use crate::state::{ServerState, SharedIndex};
use crate::HttpClient;

/// Unique path under the system temp directory for a single test.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "{}_{}_{}",
        std::process::id(),
        Utc::now().timestamp_millis(),
        name
    ))
}

/// Path to a checked-in fixture under `tests/`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(format!("{}/tests/{}", env!("CARGO_MANIFEST_DIR"), name))
}

/// Deterministic embedder with no network access.
///
/// Vectors are byte histograms, so texts sharing words land close together
/// under cosine similarity and repeat runs produce identical vectors.
pub struct FakeEmbedder {
    dimension: usize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self { dimension: 32 }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str {
        "fake-embedding-001"
    }

    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimension];
                for byte in text.bytes() {
                    vector[byte as usize % self.dimension] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Chat model that returns a canned reply and records every request.
pub struct FakeChat {
    pub reply: String,
    pub seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeChat {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, messages: &[ChatMessage]) -> AppResult<String> {
        self.seen.lock().unwrap().push(messages.to_vec());
        Ok(self.reply.clone())
    }
}

/// Server state wired to in-memory fakes, for handler tests.
pub fn fake_state(reply: &str) -> ServerState {
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new());
    let index: SharedIndex = Arc::new(RwLock::new(None));
    let answerer = AnswerService::new(
        embedder.clone(),
        Arc::new(FakeChat::new(reply)),
        index.clone(),
        4,
    );

    ServerState {
        http_client: HttpClient::new(),
        inbox: InboxClient::new(
            "localhost".to_string(),
            993,
            "user@example.com".to_string(),
            "hunter2".to_string(),
            "INBOX".to_string(),
        ),
        embedder,
        index,
        subscribers: Arc::new(RwLock::new(IndexSet::new())),
        answerer: Arc::new(answerer),
        settings: IngestSettings {
            corpus_path: PathBuf::from("data.csv"),
            index_path: PathBuf::from("docs.index"),
            store_path: PathBuf::from("docs_store.json"),
            chunk_size: 1000,
            chunk_overlap: 100,
        },
    }
}
