use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RagError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatProvider {
    Azure,
    OpenAi,
}

impl FromStr for ChatProvider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" | "azure_openai" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAi),
            other => Err(RagError::Configuration(format!(
                "unknown LLM_PROVIDER '{}' (expected 'azure' or 'openai')",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub embed_model: String,
    pub embed_batch_size: usize,
    pub chat_provider: ChatProvider,
    pub azure_api_key: String,
    pub azure_endpoint: String,
    pub azure_deployment: String,
    pub azure_api_version: String,
    pub chat_model: String,
    pub temperature: f32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub answer_language: Option<String>,
    pub upload_path: PathBuf,
    pub request_timeout: Duration,
    /// Upper bound for the pdf-extract fallback, which can spin on broken fonts.
    pub pdf_extract_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env if present so credentials work without manual `source .env`.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| {
                RagError::Configuration(format!("environment variable {} is not set", key))
            })
        };

        let chat_provider = match var("LLM_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => ChatProvider::Azure,
        };

        // Embeddings always go through OpenAI; the chat credentials depend on the provider.
        let openai_api_key = required("OPENAI_API_KEY")?;
        let (azure_api_key, azure_endpoint) = match chat_provider {
            ChatProvider::Azure => (
                required("AZURE_OPENAI_API_KEY")?,
                required("AZURE_OPENAI_ENDPOINT")?,
            ),
            ChatProvider::OpenAi => (
                var("AZURE_OPENAI_API_KEY").unwrap_or_default(),
                var("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
            ),
        };

        Ok(Self {
            openai_api_key,
            openai_base_url: trim_url(
                var("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            ),
            embed_model: var("OPENAI_EMBED_MODEL")
                .unwrap_or_else(|| "text-embedding-ada-002".to_string()),
            embed_batch_size: parse_or(var("RAG_EMBED_BATCH_SIZE"), 10).max(1),
            chat_provider,
            azure_api_key,
            azure_endpoint: trim_url(azure_endpoint),
            azure_deployment: var("AZURE_OPENAI_DEPLOYMENT").unwrap_or_else(|| "gpt-4o".to_string()),
            azure_api_version: var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| "2024-06-01".to_string()),
            chat_model: var("OPENAI_CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            temperature: parse_or(var("LLM_TEMPERATURE"), 0.0),
            chunk_size: parse_or(var("RAG_CHUNK_SIZE"), 1200),
            chunk_overlap: parse_or(var("RAG_CHUNK_OVERLAP"), 200),
            top_k: parse_or(var("RAG_TOP_K"), 2).max(1),
            answer_language: var("RAG_ANSWER_LANGUAGE").map(|v| v.trim().to_string()),
            upload_path: var("RAG_UPLOAD_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("portfolio_navigator_upload.pdf")),
            request_timeout: Duration::from_secs(parse_or(var("RAG_REQUEST_TIMEOUT_SECS"), 120)),
            pdf_extract_timeout: Duration::from_secs(parse_or(var("RAG_PDF_TIMEOUT_SECS"), 60)),
            max_retries: parse_or(var("RAG_MAX_RETRIES"), 3),
            retry_base_delay: Duration::from_millis(parse_or(var("RAG_RETRY_BASE_MS"), 500)),
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn trim_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
