mod build_prompt;
mod chunk_text;
mod config;
mod embed_chunks;
mod embed_query;
mod error;
mod generate;
mod http;
mod load_pdf;
mod session;
mod vector_index;

use std::path::Path;

pub use build_prompt::{
    build_prompt_with_context, format_context_from_hits, recommended_fields_question, Message,
    QueryTemplate, FALLBACK_INSTRUCTION,
};
pub use chunk_text::{chunk_pages, split_windows, Chunk, PageText};
pub use config::{ChatProvider, Config};
pub use embed_chunks::{embed_in_batches, Embedder, OpenAiEmbedder};
pub use embed_query::embed_query;
pub use error::{RagError, Result};
pub use generate::{AzureChat, ChatModel, OpenAiChat};
pub use http::{backoff_delay, Auth, HttpClient, HttpError};
pub use load_pdf::{ingest, is_pdf, DocumentFingerprint};
pub use session::{
    Phase, QueryJob, QueryKind, QueryOutcome, QueryRejection, Session, StagedDocument,
};
pub use vector_index::{build_index, cosine_similarity, Hit, VectorIndex};

/// Answer text plus the retrieved context it was generated from.
#[derive(Clone, Debug)]
pub struct Answer {
    pub text: String,
    pub context: String,
    pub sources: Vec<Hit>,
}

impl Answer {
    /// The model returned nothing usable.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Configuration and model providers, passed explicitly to every stage.
pub struct Pipeline {
    cfg: Config,
    embedder: Box<dyn Embedder>,
    chat: Box<dyn ChatModel>,
}

impl Pipeline {
    pub fn new(cfg: Config, embedder: Box<dyn Embedder>, chat: Box<dyn ChatModel>) -> Self {
        Self { cfg, embedder, chat }
    }

    pub fn from_config(cfg: Config) -> Result<Self> {
        let http = HttpClient::from_config(&cfg).map_err(|e| RagError::Configuration(e.to_string()))?;
        let embedder = Box::new(OpenAiEmbedder::new(&cfg, http.clone()));
        let chat: Box<dyn ChatModel> = match cfg.chat_provider {
            ChatProvider::Azure => Box::new(AzureChat::new(&cfg, http)),
            ChatProvider::OpenAi => Box::new(OpenAiChat::new(&cfg, http)),
        };
        tracing::info!(
            embed_model = %cfg.embed_model,
            provider = ?cfg.chat_provider,
            temperature = cfg.temperature,
            "model settings configured"
        );
        Ok(Self::new(cfg, embedder, chat))
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn ingest(&self, path: &Path) -> Result<Vec<Chunk>> {
        ingest(&self.cfg, path)
    }

    pub fn build_index(&self, chunks: Vec<Chunk>) -> Result<VectorIndex> {
        build_index(&self.cfg, self.embedder.as_ref(), chunks)
    }

    /// Retrieves the closest chunks for `question` and asks the model to answer from them.
    pub fn answer(
        &self,
        index: &VectorIndex,
        question: &str,
        template: &QueryTemplate,
    ) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidQuery("question is empty".to_string()));
        }
        self.ask(index, question.trim(), &template.augment(question))
    }

    /// Ingest, index and answer in one call, without any cache.
    pub fn search_result(&self, path: &Path, question: &str) -> Result<Answer> {
        let chunks = self.ingest(path)?;
        let index = self.build_index(chunks)?;
        self.answer(&index, question, &QueryTemplate::standalone())
    }

    /// Asks which fields of the document matter most for data-driven decisions.
    pub fn recommend_fields(&self, index: &VectorIndex) -> Result<Answer> {
        let question = recommended_fields_question(self.cfg.answer_language.as_deref());
        self.ask(index, &question, &question)
    }

    fn ask(&self, index: &VectorIndex, retrieval_text: &str, query: &str) -> Result<Answer> {
        if index.is_empty() {
            return Err(RagError::NoDocument);
        }
        let query_vec = embed_query(self.embedder.as_ref(), retrieval_text)?;
        let sources = index.search(&query_vec, self.cfg.top_k);
        tracing::debug!(hits = sources.len(), "retrieved context");
        let (messages, context) = build_prompt_with_context(query, &sources);
        let text = self.chat.complete(&messages)?;
        tracing::info!(chars = text.len(), "answer generated");
        Ok(Answer {
            text,
            context,
            sources,
        })
    }
}
