//! Remote backend abstraction.
//!
//! The session talks to two remote services through narrow traits:
//! - **[`Embedder`]**: text → vector, used to build and query the index.
//! - **[`ChatModel`]**: conversation → next message, used by the query
//!   tool's answer synthesis and by the reasoning agent.
//!
//! [`Backends`] bundles one of each. [`Backends::remote`] builds the
//! OpenAI-compatible HTTP clients in [`remote`] from a [`Credential`];
//! tests and embedders bind their own implementations instead.

pub mod remote;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::credential::Credential;
use crate::error::Result;

pub use remote::{RemoteChatModel, RemoteEmbedder};

/// Text embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded alongside the vectors it produced.
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Chat completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Context-length ceiling in tokens.
    fn context_window(&self) -> usize;

    /// Produce the assistant's next message for `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The embedding and completion backends bound to a session.
#[derive(Clone)]
pub struct Backends {
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
}

impl Backends {
    pub fn new(embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>) -> Self {
        Self { embedder, chat }
    }

    /// OpenAI-compatible HTTP backends keyed by `credential`.
    pub fn remote(config: &Config, credential: &Credential) -> Result<Self> {
        let embedder = RemoteEmbedder::new(&config.embedding, credential.clone())?;
        let chat = RemoteChatModel::new(&config.llm, credential.clone())?;
        Ok(Self::new(Arc::new(embedder), Arc::new(chat)))
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("embedder", &self.embedder.model_name())
            .field("chat", &self.chat.model_name())
            .finish()
    }
}

/// Rough token count at four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(docent_core::chunk::CHARS_PER_TOKEN)
}

/// Longest prefix of `text` whose estimate fits in `max_tokens`, cut on a
/// char boundary.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let mut end = max_tokens.saturating_mul(docent_core::chunk::CHARS_PER_TOKEN);
    if end >= text.len() {
        return text;
    }
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
