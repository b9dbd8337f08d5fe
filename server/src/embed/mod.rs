pub mod chunker;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::server_config::cfg;
use crate::HttpClient;

const EMBEDDINGS_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

/// Embedding provider seam. Production uses [`OpenAiEmbedder`]; tests swap in
/// a deterministic fake.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded alongside persisted vectors.
    fn model_id(&self) -> &str;

    /// Embed every text, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiError {
    error: EmbeddingApiErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponseOrError {
    Response(EmbeddingResponse),
    Error(EmbeddingApiError),
}

pub struct OpenAiEmbedder {
    http_client: HttpClient,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(http_client: HttpClient, api_key: String, model: String) -> Self {
        Self {
            http_client,
            api_key,
            model,
        }
    }

    pub fn from_config(http_client: HttpClient) -> Self {
        Self::new(http_client, cfg.api_key.clone(), cfg.embedding.model.clone())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let resp = self
            .http_client
            .post(EMBEDDINGS_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        let parsed = serde_json::from_value::<EmbeddingResponseOrError>(resp.clone())
            .context(format!("Could not parse embeddings response: {}", resp))?;

        let mut response = match parsed {
            EmbeddingResponseOrError::Error(error) => {
                return Err(anyhow!("Embeddings API error: {}", error.error.message).into());
            }
            EmbeddingResponseOrError::Response(response) => response,
        };

        response.data.sort_by_key(|d| d.index);
        if response.data.len() != texts.len() {
            return Err(anyhow!(
                "Embeddings API returned {} vectors for {} inputs",
                response.data.len(),
                texts.len()
            )
            .into());
        }

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &a), 1.0);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
    }

    #[test]
    fn test_parse_embeddings_response() {
        let body = json!({
            "object": "list",
            "data": [
                { "object": "embedding", "index": 1, "embedding": [0.25, 0.5] },
                { "object": "embedding", "index": 0, "embedding": [1.0, 2.0] },
            ],
            "model": "text-embedding-ada-002",
        });
        let parsed: EmbeddingResponseOrError = serde_json::from_value(body).unwrap();
        let EmbeddingResponseOrError::Response(mut response) = parsed else {
            panic!("expected the response arm");
        };
        response.data.sort_by_key(|d| d.index);
        assert_eq!(response.data[0].embedding, vec![1.0, 2.0]);
        assert_eq!(response.data[1].embedding, vec![0.25, 0.5]);
    }

    #[test]
    fn test_parse_embeddings_error() {
        let body = json!({
            "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
        });
        let parsed: EmbeddingResponseOrError = serde_json::from_value(body).unwrap();
        let EmbeddingResponseOrError::Error(error) = parsed else {
            panic!("expected the error arm");
        };
        assert_eq!(error.error.message, "Incorrect API key provided");
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_embed_live() {
        dotenvy::dotenv().ok();
        let embedder = OpenAiEmbedder::from_config(HttpClient::new());
        let vectors = embedder
            .embed(&["The rent invoice is due Friday.".to_string()])
            .await
            .expect("embedding failed");
        assert_eq!(vectors.len(), 1);
        assert!(!vectors[0].is_empty());
    }
}
