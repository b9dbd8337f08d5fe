//! End-to-end ingestion: fetch unread mail, rewrite the corpus, rebuild the
//! index pair.

use std::path::PathBuf;

use derive_more::derive::Display;
use tracing::info;

use crate::embed::chunker::split_text;
use crate::embed::Embedder;
use crate::error::AppResult;
use crate::index::{StoredChunk, VectorIndex};
use crate::mail::client::InboxClient;
use crate::mail::corpus::{load_corpus, write_corpus};
use crate::mail::normalizer::normalize_message;
use crate::server_config::cfg;

/// Outcome of one ingest run, rendered directly into bot replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IngestOutcome {
    #[display("Indexed {record_count} emails into {chunk_count} chunks.")]
    Indexed {
        record_count: usize,
        chunk_count: usize,
    },
    #[display("No new emails.")]
    NoNewEmails,
}

/// File targets and chunking knobs for one ingest run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub corpus_path: PathBuf,
    pub index_path: PathBuf,
    pub store_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl IngestSettings {
    pub fn from_config() -> Self {
        Self {
            corpus_path: PathBuf::from(&cfg.corpus.path),
            index_path: PathBuf::from(&cfg.index.index_path),
            store_path: PathBuf::from(&cfg.index.store_path),
            chunk_size: cfg.chunking.chunk_size,
            chunk_overlap: cfg.chunking.chunk_overlap,
        }
    }
}

/// Fetch unread mail, overwrite the corpus with it, and rebuild the index.
pub async fn run_ingest(
    client: &InboxClient,
    embedder: &dyn Embedder,
    settings: &IngestSettings,
) -> AppResult<IngestOutcome> {
    let raw_messages = client.fetch_unread().await?;
    info!(count = raw_messages.len(), "Fetched unread messages");

    let mut records = Vec::new();
    for raw in &raw_messages {
        records.extend(normalize_message(raw));
    }
    write_corpus(&settings.corpus_path, &records)?;
    info!(
        path = %settings.corpus_path.display(),
        records = records.len(),
        "Corpus written"
    );

    build_index_from_corpus(embedder, settings).await
}

/// Rebuild the index pair from the corpus file on disk.
///
/// An empty corpus reports [`IngestOutcome::NoNewEmails`] and leaves any
/// existing index artifacts untouched.
pub async fn build_index_from_corpus(
    embedder: &dyn Embedder,
    settings: &IngestSettings,
) -> AppResult<IngestOutcome> {
    let documents = load_corpus(&settings.corpus_path)?;
    if documents.is_empty() {
        return Ok(IngestOutcome::NoNewEmails);
    }

    let mut chunks = Vec::new();
    for document in &documents {
        for chunk in split_text(&document.text, settings.chunk_size, settings.chunk_overlap) {
            chunks.push(StoredChunk {
                row: document.row,
                text: chunk.text,
            });
        }
    }
    if chunks.is_empty() {
        return Ok(IngestOutcome::NoNewEmails);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;
    let index = VectorIndex::new(embedder.model_id().to_string(), vectors, chunks)?;
    index.save(&settings.index_path, &settings.store_path)?;
    info!(
        path = %settings.index_path.display(),
        chunks = index.len(),
        "Index pair written"
    );

    Ok(IngestOutcome::Indexed {
        record_count: documents.len(),
        chunk_count: index.len(),
    })
}
