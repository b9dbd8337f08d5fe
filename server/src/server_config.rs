use config::Config;
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub mailbox: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorpusConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    pub index_path: String,
    pub store_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    pub owner_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryConfig {
    pub daily_at: String,
    pub question: String,
}

impl SummaryConfig {
    /// Six-field cron expression for the daily summary job, validated at startup.
    pub fn cron_expr(&self) -> String {
        let (hour, minute) = self
            .daily_at
            .split_once(':')
            .expect("summary.daily_at must be formatted as HH:MM");
        let hour: u32 = hour.parse().expect("summary.daily_at hour is invalid");
        let minute: u32 = minute.parse().expect("summary.daily_at minute is invalid");
        assert!(hour < 24 && minute < 60, "summary.daily_at is out of range");
        format!("0 {} {} * * *", minute, hour)
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    imap: ImapConfig,
    corpus: CorpusConfig,
    chunking: ChunkingConfig,
    embedding: EmbeddingConfig,
    model: ModelConfig,
    retrieval: RetrievalConfig,
    index: IndexConfig,
    assistant: AssistantConfig,
    summary: SummaryConfig,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub imap: ImapConfig,
    pub corpus: CorpusConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub model: ModelConfig,
    pub retrieval: RetrievalConfig,
    pub index: IndexConfig,
    pub assistant: AssistantConfig,
    pub summary: SummaryConfig,
    pub email_address: String,
    pub email_password: String,
    pub api_key: String,
    pub bot_token: String,
    pub owner_chat_id: Option<i64>,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\nImap: {:?}\n\nCorpus: {:?}\n\nChunking: {:?}\n\nEmbedding: {:?}\n\nModel: {:?}\n\nRetrieval: {:?}\n\nIndex: {:?}\n\nAssistant: {:?}\n\nSummary: {:?}\n\nEmail address: {}\n\nOwner chat id: {:?}",
            self.imap,
            self.corpus,
            self.chunking,
            self.embedding,
            self.model,
            self.retrieval,
            self.index,
            self.assistant,
            self.summary,
            self.email_address,
            self.owner_chat_id,
        )
    }
}

lazy_static! {
    pub static ref cfg: ServerConfig = {
        let root = env::var("APP_DIR").unwrap_or_else(|_| {
            let dir =
                env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
            let dir = Path::new(&dir).parent().unwrap().display().to_string();
            format!("{}/config", dir)
        });
        let path = format!("{root}/config.toml");
        let cfg_file: ConfigFile = Config::builder()
            .add_source(config::File::with_name(&path))
            .build()
            .expect("config.toml is required")
            .try_deserialize()
            .expect("config.toml is invalid");

        let ConfigFile {
            imap,
            corpus,
            chunking,
            embedding,
            model,
            retrieval,
            index,
            assistant,
            summary,
        } = cfg_file;

        let email_address =
            env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS is not set in .env file");
        let email_password =
            env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD is not set in .env file");
        let api_key = env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY is not set in .env file");
        let bot_token = env::var("BOT_TOKEN").expect("BOT_TOKEN is not set in .env file");
        let owner_chat_id = env::var("OWNER_CHAT_ID").ok().map(|v| {
            v.parse::<i64>()
                .expect("OWNER_CHAT_ID must be a numeric chat id")
        });

        ServerConfig {
            imap,
            corpus,
            chunking,
            embedding,
            model,
            retrieval,
            index,
            assistant,
            summary,
            email_address,
            email_password,
            api_key,
            bot_token,
            owner_chat_id,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_expr_from_daily_at() {
        let summary = SummaryConfig {
            daily_at: "08:00".to_string(),
            question: "Summarize my inbox.".to_string(),
        };
        assert_eq!(summary.cron_expr(), "0 0 8 * * *");

        let summary = SummaryConfig {
            daily_at: "17:30".to_string(),
            question: "Summarize my inbox.".to_string(),
        };
        assert_eq!(summary.cron_expr(), "0 30 17 * * *");
    }
}
