//! Query tools the reasoning agent can call.
//!
//! A [`QueryTool`] is the whole contract surface between the agent and a
//! retrieval capability: a name, a description, and `query(text) -> text`.
//! The agent sees only what [`describe`](QueryTool::describe) returns, so
//! any backend (the built-in [`IndexQueryTool`], a remote search service,
//! a test double) can stand behind it.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use docent::error::Result;
//! use docent::tool::QueryTool;
//!
//! pub struct GlossaryTool;
//!
//! #[async_trait]
//! impl QueryTool for GlossaryTool {
//!     fn name(&self) -> &str { "glossary" }
//!     fn description(&self) -> &str { "Defines vessel module abbreviations" }
//!
//!     async fn query(&self, input: &str) -> Result<String> {
//!         Ok(format!("No glossary entry for {}", input))
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use docent_core::index::DocumentIndex;
use tracing::{debug, instrument};

use crate::backend::{estimate_tokens, truncate_to_tokens, ChatMessage, ChatModel, Embedder};
use crate::error::{Backend, Error, Result};

/// A named, described retrieval capability.
#[async_trait]
pub trait QueryTool: Send + Sync {
    /// Identifier the agent uses in `Action:` lines. Lowercase with underscores.
    fn name(&self) -> &str;

    /// One-line description the agent uses to decide whether to call the tool.
    fn description(&self) -> &str;

    /// `(name, description)` as presented to the agent.
    fn describe(&self) -> (String, String) {
        (self.name().to_string(), self.description().to_string())
    }

    /// Answer a plain-text question.
    async fn query(&self, input: &str) -> Result<String>;
}

/// Reply used when retrieval finds nothing to ground an answer on.
pub const NO_CONTEXT_REPLY: &str = "No relevant information was found in the uploaded documents.";

/// Share of the context window reserved for retrieved text.
const CONTEXT_SHARE: f32 = 0.75;

/// Retrieval-augmented answers over one [`DocumentIndex`].
///
/// Each query embeds the question, takes the `top_k` most similar nodes,
/// and asks the chat model to answer from those excerpts only.
pub struct IndexQueryTool {
    name: String,
    description: String,
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    top_k: usize,
}

impl IndexQueryTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        index: Arc<DocumentIndex>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            index,
            embedder,
            chat,
            top_k: top_k.max(1),
        }
    }

    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }

    /// Join retrieved excerpts, stopping before the token budget is exceeded.
    /// A first excerpt larger than the whole budget is cut to fit.
    fn build_context(&self, excerpts: &[(&str, &str)]) -> String {
        let budget = (self.chat.context_window() as f32 * CONTEXT_SHARE) as usize;
        let mut used = 0usize;
        let mut parts = Vec::new();
        for (source, text) in excerpts {
            let part = format!("[source: {}]\n{}", source, text);
            let cost = estimate_tokens(&part);
            if used + cost > budget {
                if parts.is_empty() {
                    debug!(cost, budget, "first excerpt truncated");
                    parts.push(truncate_to_tokens(&part, budget).to_string());
                }
                break;
            }
            used += cost;
            parts.push(part);
        }
        parts.join("\n\n")
    }
}

pub(crate) fn synthesis_prompt(context: &str, question: &str) -> String {
    format!(
        "Context information from the uploaded documents is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Using only the context information and no prior knowledge, answer the question.\n\
         Question: {}\n\
         Answer: ",
        context, question
    )
}

#[async_trait]
impl QueryTool for IndexQueryTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    #[instrument(skip(self, input), fields(tool = %self.name, top_k = self.top_k))]
    async fn query(&self, input: &str) -> Result<String> {
        let vectors = self.embedder.embed(&[input.to_string()]).await?;
        let query_vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::remote(Backend::Embedding, "empty embedding response"))?;

        let hits = self.index.top_k(&query_vec, self.top_k);
        debug!(hits = hits.len(), "retrieved nodes");
        if hits.is_empty() {
            return Ok(NO_CONTEXT_REPLY.to_string());
        }

        let excerpts: Vec<(&str, &str)> = hits
            .iter()
            .map(|h| (h.node.document_name.as_str(), h.node.text.as_str()))
            .collect();
        let context = self.build_context(&excerpts);

        let messages = [ChatMessage::user(synthesis_prompt(&context, input))];
        let answer = self.chat.complete(&messages).await?;
        Ok(answer.trim().to_string())
    }
}

/// The tools bound to one agent.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn QueryTool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn QueryTool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Arc<dyn QueryTool>] {
        &self.tools
    }

    /// Find a tool by name, ignoring case and surrounding whitespace.
    pub fn find(&self, name: &str) -> Option<&Arc<dyn QueryTool>> {
        let wanted = name.trim();
        self.tools
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl From<Vec<Arc<dyn QueryTool>>> for ToolSet {
    fn from(tools: Vec<Arc<dyn QueryTool>>) -> Self {
        Self { tools }
    }
}
