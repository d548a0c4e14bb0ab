use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::from_str;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to build http client: {0}")]
    Client(String),

    #[error("POST {url} failed: {status} {body}")]
    Status { url: String, status: u16, body: String },

    #[error("POST {url} failed: {message}")]
    Transport {
        url: String,
        message: String,
        transient: bool,
    },

    #[error("POST {url} decode failed: {message} | {body}")]
    Decode {
        url: String,
        message: String,
        body: String,
    },
}

impl HttpError {
    /// Timeouts, refused connections, throttling and server errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(*status, 408 | 429) || *status >= 500,
            Self::Transport { transient, .. } => *transient,
            Self::Client(_) | Self::Decode { .. } => false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Auth<'a> {
    Bearer(&'a str),
    ApiKey(&'a str),
}

#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpClient {
    pub fn from_config(cfg: &Config) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;
        Ok(Self::from_client(client, cfg.max_retries, cfg.retry_base_delay))
    }

    pub fn from_client(client: Client, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            client,
            max_retries,
            base_delay,
        }
    }

    pub fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        auth: Auth<'_>,
        body: &B,
    ) -> Result<T, HttpError> {
        let mut attempt = 0u32;
        loop {
            match self.post_once(url, auth, body) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = backoff_delay(self.base_delay, attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying: {}",
                        err
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn post_once<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        auth: Auth<'_>,
        body: &B,
    ) -> Result<T, HttpError> {
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        let request = match auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::ApiKey(key) => request.header("api-key", key),
        };
        let resp = request.send().map_err(|e| HttpError::Transport {
            url: url.to_string(),
            transient: e.is_timeout() || e.is_connect(),
            message: e.to_string(),
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        // A reset or timeout while reading the body is a network failure, not bad JSON.
        let text = resp.text().map_err(|e| HttpError::Transport {
            url: url.to_string(),
            transient: e.is_timeout() || e.is_body() || e.is_decode(),
            message: format!("reading response body: {}", e),
        })?;
        from_str::<T>(&text).map_err(|e| HttpError::Decode {
            url: url.to_string(),
            message: e.to_string(),
            body: text,
        })
    }
}

pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}
