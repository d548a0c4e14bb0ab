use crate::chunk_text::Chunk;
use crate::config::Config;
use crate::embed_chunks::{embed_in_batches, Embedder};
use crate::error::{RagError, Result};

#[derive(Clone, Debug)]
pub struct Hit {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Clone, Debug)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory cosine-similarity index. Owns chunk text, so queries never touch the file.
#[derive(Clone, Debug, Default)]
pub struct VectorIndex {
    entries: Vec<Entry>,
}

impl VectorIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Top `k` chunks by descending similarity; `k` is clamped to the index size.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Hit> {
        let mut hits: Vec<Hit> = self
            .entries
            .iter()
            .map(|e| Hit {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k.min(self.entries.len()));
        hits
    }

    pub fn from_parts(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Embedding(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Entry { chunk, vector })
            .collect();
        Ok(Self { entries })
    }
}

pub fn build_index(cfg: &Config, embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Result<VectorIndex> {
    if chunks.is_empty() {
        return Err(RagError::NoDocument);
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embed_in_batches(embedder, &texts, cfg.embed_batch_size)?;
    let index = VectorIndex::from_parts(chunks, vectors)?;
    tracing::info!(chunks = index.len(), "vector index built");
    Ok(index)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
