//! Vector index construction, persistence, and retrieval.
//!
//! An index is persisted as two paired artifacts: a binary vector file and a
//! JSON document store. Both carry the same content fingerprint, and loading
//! refuses pairs where one half is missing or the fingerprints disagree.

pub mod format;

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embed::cosine_similarity;
use crate::error::{AppError, AppResult};
use format::{IndexHeader, HEADER_SIZE, MAGIC, VERSION};

/// One chunk of a corpus document, stored for retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Zero-based corpus row the chunk came from.
    pub row: usize,
    pub text: String,
}

/// Document store half of an index pair.
#[derive(Debug, Serialize, Deserialize)]
struct DocStore {
    model: String,
    dimension: usize,
    fingerprint: String,
    chunks: Vec<StoredChunk>,
}

/// A retrieval hit with its similarity score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub chunk: StoredChunk,
}

#[derive(Debug)]
pub struct VectorIndex {
    model: String,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<StoredChunk>,
}

impl VectorIndex {
    /// Pair up vectors and chunks produced by one embedding run.
    pub fn new(
        model: String,
        vectors: Vec<Vec<f32>>,
        chunks: Vec<StoredChunk>,
    ) -> anyhow::Result<Self> {
        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "Embedding produced {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        if vectors.iter().any(|v| v.len() != dimension) {
            anyhow::bail!("Embedding vectors have mixed dimensions");
        }

        Ok(Self {
            model,
            dimension,
            vectors,
            chunks,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embedding model the stored vectors were produced with.
    pub fn model_id(&self) -> &str {
        &self.model
    }

    /// Return the `top_k` chunks most similar to the query vector,
    /// best first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| (cosine_similarity(query, vector), i))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(score, i)| SearchHit {
                score,
                chunk: self.chunks[i].clone(),
            })
            .collect()
    }

    /// Write both halves of the index pair, overwriting prior artifacts.
    pub fn save(&self, index_path: &Path, store_path: &Path) -> anyhow::Result<()> {
        let print = fingerprint(&self.model, &self.chunks);

        let header = IndexHeader {
            magic: *MAGIC,
            version: VERSION,
            vector_count: self.vectors.len() as u64,
            dimension: self.dimension as u32,
            fingerprint: print,
        };
        let header_bytes = bincode::serialize(&header)?;
        let vector_bytes = bincode::serialize(&self.vectors)?;

        // Pad header to HEADER_SIZE
        let mut padded_header = vec![0u8; HEADER_SIZE];
        let copy_len = header_bytes.len().min(HEADER_SIZE);
        padded_header[..copy_len].copy_from_slice(&header_bytes[..copy_len]);

        let mut file = File::create(index_path)
            .with_context(|| format!("Could not create index file {}", index_path.display()))?;
        file.write_all(&padded_header)?;
        file.write_all(&vector_bytes)?;
        file.flush()?;

        let store = DocStore {
            model: self.model.clone(),
            dimension: self.dimension,
            fingerprint: to_hex(&print),
            chunks: self.chunks.clone(),
        };
        let store_json = serde_json::to_string(&store)?;
        std::fs::write(store_path, store_json)
            .with_context(|| format!("Could not write store file {}", store_path.display()))?;

        Ok(())
    }

    /// Load an index pair from disk.
    ///
    /// Returns `Ok(None)` when neither artifact exists yet. A pair with one
    /// half missing, or whose fingerprints disagree, fails with
    /// [`AppError::IndexPairMismatch`] so the caller can ask for a rebuild.
    pub fn load(index_path: &Path, store_path: &Path) -> AppResult<Option<Self>> {
        let index_exists = index_path.exists();
        let store_exists = store_path.exists();
        if !index_exists && !store_exists {
            return Ok(None);
        }
        if index_exists != store_exists {
            return Err(AppError::IndexPairMismatch);
        }

        let data = std::fs::read(index_path)
            .with_context(|| format!("Could not read index file {}", index_path.display()))?;
        if data.len() < HEADER_SIZE {
            return Err(anyhow!("Index file {} is truncated", index_path.display()).into());
        }

        let header: IndexHeader = bincode::deserialize(&data[..HEADER_SIZE])
            .with_context(|| format!("Could not decode index header in {}", index_path.display()))?;
        header
            .validate()
            .map_err(|reason| anyhow!("Invalid index file {}: {reason}", index_path.display()))?;

        let vectors: Vec<Vec<f32>> = bincode::deserialize(&data[HEADER_SIZE..])
            .with_context(|| format!("Could not decode vectors in {}", index_path.display()))?;
        if vectors.len() as u64 != header.vector_count {
            return Err(anyhow!(
                "Index file {} holds {} vectors but its header claims {}",
                index_path.display(),
                vectors.len(),
                header.vector_count
            )
            .into());
        }

        let store_raw = std::fs::read_to_string(store_path)
            .with_context(|| format!("Could not read store file {}", store_path.display()))?;
        let store: DocStore = serde_json::from_str(&store_raw)
            .with_context(|| format!("Could not decode store file {}", store_path.display()))?;

        let expected = fingerprint(&store.model, &store.chunks);
        if header.fingerprint != expected
            || store.fingerprint != to_hex(&expected)
            || store.chunks.len() != vectors.len()
            || store.dimension != header.dimension as usize
        {
            return Err(AppError::IndexPairMismatch);
        }
        if vectors.iter().any(|v| v.len() != store.dimension) {
            return Err(anyhow!(
                "Index file {} holds vectors of the wrong dimension",
                index_path.display()
            )
            .into());
        }

        Ok(Some(Self {
            model: store.model,
            dimension: store.dimension,
            vectors,
            chunks: store.chunks,
        }))
    }
}

/// SHA-256 over the embedding model id and every stored chunk.
fn fingerprint(model: &str, chunks: &[StoredChunk]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    for chunk in chunks {
        hasher.update(chunk.row.to_le_bytes());
        hasher.update(chunk.text.as_bytes());
    }
    hasher.finalize().into()
}

fn to_hex(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
