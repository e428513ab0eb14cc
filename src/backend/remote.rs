//! OpenAI-compatible HTTP clients for embeddings and chat completions.
//!
//! Both clients share one request loop with exponential backoff:
//! - HTTP 401/403 → the credential was rejected; fail immediately with a
//!   configuration error.
//! - HTTP 429 and 5xx → retry.
//! - Other 4xx → fail immediately.
//! - Network errors and timeouts → retry.
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{ChatMessage, ChatModel, Embedder};
use crate::config::{EmbeddingConfig, LlmConfig};
use crate::credential::Credential;
use crate::error::{Backend, Error, Result};

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

fn build_client(timeout_secs: u64, backend: Backend) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::remote(backend, format!("failed to build HTTP client: {}", e)))
}

/// POST `body` to `url` and decode the JSON reply, retrying transient failures.
async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    credential: &Credential,
    body: &B,
    max_retries: u32,
    backend: Backend,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(%backend, attempt, ?delay, "retrying remote call");
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(url)
            .bearer_auth(credential.expose())
            .json(body)
            .send()
            .await;

        let response = match resp {
            Ok(r) => r,
            Err(e) => {
                warn!(%backend, attempt, error = %e, "remote call failed");
                last_err = Some(Error::remote(backend, e.to_string()));
                continue;
            }
        };

        let status = response.status();
        if status.is_success() {
            return response.json::<R>().await.map_err(|e| {
                Error::remote(backend, format!("invalid response body: {}", e))
            });
        }

        let body_text = response.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Configuration(format!(
                "the {} backend rejected the API credential (HTTP {})",
                backend,
                status.as_u16()
            )));
        }

        let err = Error::RemoteBackend {
            backend,
            status: Some(status.as_u16()),
            message: body_text,
        };

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            warn!(%backend, attempt, status = status.as_u16(), "transient remote error");
            last_err = Some(err);
            continue;
        }

        return Err(err);
    }

    Err(last_err.unwrap_or_else(|| Error::remote(backend, "request failed after retries")))
}

// ============ Embeddings ============

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

/// Embeddings via `POST {url}/embeddings`.
pub struct RemoteEmbedder {
    http: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
    credential: Credential,
}

impl RemoteEmbedder {
    pub fn new(config: &EmbeddingConfig, credential: Credential) -> Result<Self> {
        Ok(Self {
            http: build_client(config.timeout_secs, Backend::Embedding)?,
            url: endpoint(&config.url, "embeddings"),
            model: config.model.clone(),
            max_retries: config.max_retries,
            credential,
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, texts), fields(model = %self.model, batch = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let resp: EmbedResponse = post_json(
            &self.http,
            &self.url,
            &self.credential,
            &body,
            self.max_retries,
            Backend::Embedding,
        )
        .await?;
        order_embeddings(resp.data, texts.len())
    }
}

/// Put embeddings back in input order and check the count.
fn order_embeddings(mut data: Vec<EmbedData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(Error::remote(
            Backend::Embedding,
            format!("expected {} embeddings, got {}", expected, data.len()),
        ));
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

// ============ Chat completions ============

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [&'a str]>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completions via `POST {url}/chat/completions`.
pub struct RemoteChatModel {
    http: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    context_window: usize,
    max_retries: u32,
    credential: Credential,
}

/// Generation stops before the model invents its own tool results.
const STOP_SEQUENCES: &[&str] = &["\nObservation:"];

impl RemoteChatModel {
    pub fn new(config: &LlmConfig, credential: Credential) -> Result<Self> {
        Ok(Self {
            http: build_client(config.timeout_secs, Backend::Completion)?,
            url: endpoint(&config.url, "chat/completions"),
            model: config.model.clone(),
            temperature: config.temperature,
            context_window: config.context_window,
            max_retries: config.max_retries,
            credential,
        })
    }
}

#[async_trait]
impl ChatModel for RemoteChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stop: Some(STOP_SEQUENCES),
        };
        let resp: ChatResponse = post_json(
            &self.http,
            &self.url,
            &self.credential,
            &body,
            self.max_retries,
            Backend::Completion,
        )
        .await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::remote(Backend::Completion, "response contained no message"))
    }
}
