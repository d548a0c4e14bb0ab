use serde::{Deserialize, Serialize};

use crate::build_prompt::Message;
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::http::{Auth, HttpClient};

/// Produces a reply for a chat transcript.
pub trait ChatModel: Send + Sync {
    fn complete(&self, messages: &[Message]) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [Message],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Azure OpenAI deployment; the model is implied by the deployment name.
pub struct AzureChat {
    http: HttpClient,
    url: String,
    api_key: String,
    temperature: f32,
}

impl AzureChat {
    pub fn new(cfg: &Config, http: HttpClient) -> Self {
        Self {
            http,
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                cfg.azure_endpoint, cfg.azure_deployment, cfg.azure_api_version
            ),
            api_key: cfg.azure_api_key.clone(),
            temperature: cfg.temperature,
        }
    }
}

impl ChatModel for AzureChat {
    fn complete(&self, messages: &[Message]) -> Result<String> {
        let req = ChatRequest {
            model: None,
            messages,
            temperature: self.temperature,
        };
        let res = self
            .http
            .post_json::<ChatResponse, _>(&self.url, Auth::ApiKey(&self.api_key), &req)
            .map_err(|e| RagError::Generation(e.to_string()))?;
        first_choice(res)
    }
}

pub struct OpenAiChat {
    http: HttpClient,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(cfg: &Config, http: HttpClient) -> Self {
        Self {
            http,
            url: format!("{}/chat/completions", cfg.openai_base_url),
            api_key: cfg.openai_api_key.clone(),
            model: cfg.chat_model.clone(),
            temperature: cfg.temperature,
        }
    }
}

impl ChatModel for OpenAiChat {
    fn complete(&self, messages: &[Message]) -> Result<String> {
        let req = ChatRequest {
            model: Some(&self.model),
            messages,
            temperature: self.temperature,
        };
        let res = self
            .http
            .post_json::<ChatResponse, _>(&self.url, Auth::Bearer(&self.api_key), &req)
            .map_err(|e| RagError::Generation(e.to_string()))?;
        first_choice(res)
    }
}

fn first_choice(res: ChatResponse) -> Result<String> {
    res.choices
        .into_iter()
        .next()
        .map(|choice| choice.message.and_then(|m| m.content).unwrap_or_default())
        .ok_or_else(|| RagError::Generation("response contained no choices".to_string()))
}
