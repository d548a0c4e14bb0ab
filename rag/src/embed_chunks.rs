use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{RagError, Result};
use crate::http::{Auth, HttpClient};

/// Turns text into vectors. One call may carry several texts.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
pub(crate) struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Deserialize)]
struct EmbedItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    http: HttpClient,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(cfg: &Config, http: HttpClient) -> Self {
        Self {
            http,
            url: format!("{}/embeddings", cfg.openai_base_url),
            api_key: cfg.openai_api_key.clone(),
            model: cfg.embed_model.clone(),
        }
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let req = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let res: EmbedResponse = self
            .http
            .post_json(&self.url, Auth::Bearer(&self.api_key), &req)
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        parse_embeddings(res, texts.len())
    }
}

pub(crate) fn parse_embeddings(res: EmbedResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut items = res.data;
    if items.len() != expected {
        return Err(RagError::Embedding(format!(
            "expected {} embeddings, got {}",
            expected,
            items.len()
        )));
    }
    items.sort_by_key(|item| item.index);
    let vectors: Vec<Vec<f32>> = items.into_iter().map(|item| item.embedding).collect();
    if vectors.iter().any(|v| v.is_empty()) {
        return Err(RagError::Embedding("provider returned an empty vector".to_string()));
    }
    Ok(vectors)
}

/// Embeds `texts` in provider calls of at most `batch_size` items, preserving order.
pub fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(texts.len());
    for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
        tracing::debug!(batch = batch_no, size = batch.len(), "embedding batch");
        let batch_vectors = embedder.embed(batch)?;
        if batch_vectors.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "batch {} returned {} vectors for {} texts",
                batch_no,
                batch_vectors.len(),
                batch.len()
            )));
        }
        vectors.extend(batch_vectors);
    }
    Ok(vectors)
}
