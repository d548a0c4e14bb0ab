use crate::embed_chunks::Embedder;
use crate::error::{RagError, Result};

pub fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| RagError::Embedding("no vector returned for the question".to_string()))
}
