//! Deterministic backends and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docent::backend::{Backends, ChatMessage, ChatModel, Embedder, Role};
use docent::config::Config;
use docent::error::{Error, Result};
use docent::materialize::UploadedDocument;

pub const DIMS: usize = 64;

/// Bag-of-words embedder: each lowercase word hashes into one of
/// [`DIMS`] buckets, and the vector is L2-normalized.
#[derive(Default)]
pub struct HashEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub reject: AtomicBool,
}

fn fnv1a(word: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        v[(fnv1a(&word.to_lowercase()) % DIMS as u64) as usize] += 1.0;
    }
    docent_core::embedding::normalize(&mut v);
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "test-bag-of-words"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::Configuration(
                "the embedding backend rejected the API credential (HTTP 401)".to_string(),
            ));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::RemoteBackend {
                backend: docent::error::Backend::Embedding,
                status: Some(503),
                message: "embedding service unavailable".to_string(),
            });
        }
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// How [`ScriptedChat`] behaves in agent steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Call the document tool once, then answer with its observation.
    UseTool,
    /// Call the document tool forever.
    NeverAnswer,
    /// Reject the credential on every call.
    RejectCredential,
}

/// Chat model that follows the ReAct protocol mechanically.
///
/// Synthesis prompts (from the query tool) are answered with the first
/// retrieved line that shares a word with the question.
pub struct ScriptedChat {
    pub script: Script,
    pub agent_steps: AtomicUsize,
    pub synthesis_calls: AtomicUsize,
}

impl ScriptedChat {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            agent_steps: AtomicUsize::new(0),
            synthesis_calls: AtomicUsize::new(0),
        }
    }
}

fn last_user(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

/// The user's question: the first line of the current exchange.
fn question(messages: &[ChatMessage]) -> String {
    last_user(messages).lines().next().unwrap_or_default().to_string()
}

fn synthesize(prompt: &str) -> String {
    let question = prompt
        .lines()
        .find_map(|l| l.strip_prefix("Question: "))
        .unwrap_or_default()
        .to_lowercase();
    let words: Vec<&str> = question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .collect();
    prompt
        .lines()
        .filter(|l| !l.starts_with("[source:") && !l.starts_with("---"))
        .find(|l| {
            let lower = l.to_lowercase();
            words.iter().any(|w| lower.contains(w))
        })
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| "I don't know.".to_string())
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "test-scripted"
    }

    fn context_window(&self) -> usize {
        40_000
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let current = last_user(messages);
        if current.starts_with("Context information") {
            self.synthesis_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(synthesize(current));
        }
        self.agent_steps.fetch_add(1, Ordering::SeqCst);

        match self.script {
            Script::RejectCredential => Err(Error::Configuration(
                "the completion backend rejected the API credential (HTTP 401)".to_string(),
            )),
            Script::UseTool if current.contains("Observation: ") => {
                let observation = current
                    .rsplit("Observation: ")
                    .next()
                    .unwrap_or_default()
                    .trim();
                Ok(format!(
                    "Thought: I can answer without using any more tools.\nAnswer: {}",
                    observation
                ))
            }
            Script::UseTool | Script::NeverAnswer => Ok(format!(
                "Thought: I need to use a tool to help me answer the question.\n\
                 Action: document_index\n\
                 Action Input: {{\"input\": \"{}\"}}",
                question(messages)
            )),
        }
    }
}

/// Answers immediately with the question, after a delay, while recording
/// how many calls overlap.
#[derive(Default)]
pub struct EchoChat {
    pub delay: Duration,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl EchoChat {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ChatModel for EchoChat {
    fn model_name(&self) -> &str {
        "test-echo"
    }

    fn context_window(&self) -> usize {
        40_000
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("Answer: echo: {}", question(messages)))
    }
}

pub fn backends(embedder: Arc<HashEmbedder>, chat: Arc<dyn ChatModel>) -> Backends {
    Backends::new(embedder, chat)
}

/// Config with the store and scratch directories under `root`, text and
/// PDF uploads allowed, and no streaming delay.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.store.path = root.join("storage");
    config.upload.allowed_extensions = vec!["pdf".to_string(), "txt".to_string()];
    config.upload.scratch_dir = Some(root.join("scratch"));
    std::fs::create_dir_all(root.join("scratch")).unwrap();
    config.chunking.max_tokens = 64;
    config.chunking.overlap_tokens = 8;
    config.chat.stream_delay_ms = 0;
    config
}

pub fn txt(name: &str, text: &str) -> UploadedDocument {
    UploadedDocument::new(name, text.as_bytes().to_vec())
}

/// Minimal single-page PDF showing `text` in Helvetica. Builds the body,
/// then the xref table with correct byte offsets.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

pub fn scratch_is_empty(root: &Path) -> bool {
    std::fs::read_dir(root.join("scratch"))
        .map(|mut d| d.next().is_none())
        .unwrap_or(true)
}
