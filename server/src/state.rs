use std::sync::Arc;

use indexmap::IndexSet;
use tokio::sync::RwLock;

use crate::answer::AnswerService;
use crate::embed::{Embedder, OpenAiEmbedder};
use crate::error::AppResult;
use crate::index::VectorIndex;
use crate::ingest::IngestSettings;
use crate::mail::client::InboxClient;
use crate::prompt::openai::OpenAiChat;
use crate::prompt::ChatModel;
use crate::server_config::cfg;
use crate::HttpClient;

pub type SharedIndex = Arc<RwLock<Option<VectorIndex>>>;
pub type SubscriberSet = Arc<RwLock<IndexSet<i64>>>;

#[derive(Clone)]
pub struct ServerState {
    pub http_client: HttpClient,
    pub inbox: InboxClient,
    pub embedder: Arc<dyn Embedder>,
    pub index: SharedIndex,
    pub subscribers: SubscriberSet,
    pub answerer: Arc<AnswerService>,
    pub settings: IngestSettings,
}

impl ServerState {
    pub fn new(http_client: HttpClient) -> Self {
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::from_config(http_client.clone()));
        let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChat::from_config(http_client.clone()));
        let index: SharedIndex = Arc::new(RwLock::new(None));

        let mut subscribers = IndexSet::new();
        if let Some(chat_id) = cfg.owner_chat_id {
            subscribers.insert(chat_id);
        }

        let answerer = Arc::new(AnswerService::new(
            embedder.clone(),
            chat,
            index.clone(),
            cfg.retrieval.top_k,
        ));

        Self {
            http_client,
            inbox: InboxClient::from_config(),
            embedder,
            index,
            subscribers: Arc::new(RwLock::new(subscribers)),
            answerer,
            settings: IngestSettings::from_config(),
        }
    }

    /// Swap in whatever index pair is on disk right now.
    pub async fn reload_index(&self) -> AppResult<()> {
        let loaded = VectorIndex::load(&self.settings.index_path, &self.settings.store_path)?;
        let mut guard = self.index.write().await;
        *guard = loaded;
        Ok(())
    }

    /// Add a chat to the daily summary audience. Returns false if it was
    /// already subscribed.
    pub async fn subscribe(&self, chat_id: i64) -> bool {
        self.subscribers.write().await.insert(chat_id)
    }

    /// Remove a chat from the daily summary audience. Returns false if it
    /// was not subscribed.
    pub async fn unsubscribe(&self, chat_id: i64) -> bool {
        self.subscribers.write().await.shift_remove(&chat_id)
    }

    /// Snapshot of the current subscriber chats, in subscription order.
    pub async fn subscriber_ids(&self) -> Vec<i64> {
        self.subscribers.read().await.iter().copied().collect()
    }
}
