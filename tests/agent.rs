//! Reasoning loop and query tool behavior with scripted models.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use common::*;
use docent::agent::ConversationAgent;
use docent::backend::{estimate_tokens, ChatMessage, ChatModel, Embedder, Role};
use docent::error::{Error, Result};
use docent::tool::{IndexQueryTool, QueryTool, ToolSet, NO_CONTEXT_REPLY};
use docent_core::chunk::chunk_document;
use docent_core::index::DocumentIndex;
use docent_core::models::{ExtractedDocument, IndexNode};

/// Replies from a fixed list and records every request.
struct Replay {
    replies: Mutex<Vec<String>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
    window: usize,
}

impl Replay {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            seen: Mutex::new(Vec::new()),
            window: 40_000,
        }
    }
}

#[async_trait]
impl ChatModel for Replay {
    fn model_name(&self) -> &str {
        "replay"
    }

    fn context_window(&self) -> usize {
        self.window
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.seen.lock().unwrap().push(messages.to_vec());
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| "Answer: out of script".to_string()))
    }
}

struct FailingTool;

#[async_trait]
impl QueryTool for FailingTool {
    fn name(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn query(&self, _input: &str) -> Result<String> {
        Err(Error::IndexUnavailable)
    }
}

/// Returns the same long text for every query.
struct VerboseTool;

#[async_trait]
impl QueryTool for VerboseTool {
    fn name(&self) -> &str {
        "verbose"
    }

    fn description(&self) -> &str {
        "Returns a very long result"
    }

    async fn query(&self, _input: &str) -> Result<String> {
        Ok("pressure reading ".repeat(500))
    }
}

/// Embeds into a different space than the test index.
struct NarrowEmbedder;

#[async_trait]
impl Embedder for NarrowEmbedder {
    fn model_name(&self) -> &str {
        "narrow"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

fn prompt_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

fn index_of(texts: &[(&str, &str)]) -> Arc<DocumentIndex> {
    let nodes: Vec<IndexNode> = texts
        .iter()
        .flat_map(|(name, text)| chunk_document(&ExtractedDocument::new(*name, *text), 64, 8))
        .map(|c| {
            let v = bag_of_words(&c.text);
            IndexNode::from_chunk(c, v)
        })
        .collect();
    Arc::new(DocumentIndex::new("test-bag-of-words", nodes).unwrap())
}

#[tokio::test]
async fn unknown_tool_becomes_observation() {
    let chat = Arc::new(Replay::new(&[
        "Thought: try it\nAction: missing_tool\nAction Input: {\"input\": \"x\"}",
        "Thought: I can answer without using any more tools.\nAnswer: fine",
    ]));
    let mut agent = ConversationAgent::new(chat.clone(), ToolSet::new(), 5);

    assert_eq!(agent.chat("hello").await.unwrap(), "fine");
    let seen = chat.seen.lock().unwrap();
    let second = &seen[1];
    let current = &second.last().unwrap().content;
    assert!(current.contains("Observation: Error: there is no tool named \"missing_tool\""));
}

#[tokio::test]
async fn tool_errors_are_fed_back() {
    let chat = Arc::new(Replay::new(&[
        "Action: flaky\nAction Input: anything",
        "Answer: recovered",
    ]));
    let tools = ToolSet::from(vec![Arc::new(FailingTool) as Arc<dyn QueryTool>]);
    let mut agent = ConversationAgent::new(chat.clone(), tools, 5);

    assert_eq!(agent.chat("q").await.unwrap(), "recovered");
    let seen = chat.seen.lock().unwrap();
    assert!(seen[1]
        .last()
        .unwrap()
        .content
        .contains("Observation: Error: no document index is available"));
}

#[tokio::test]
async fn system_prompt_lists_tools() {
    let chat = Arc::new(Replay::new(&["Answer: ok"]));
    let tool = IndexQueryTool::new(
        "document_index",
        "Provides information from the uploaded documents.",
        index_of(&[("a.txt", "text")]),
        Arc::new(HashEmbedder::default()),
        chat.clone(),
        3,
    );
    let tools = ToolSet::from(vec![Arc::new(tool) as Arc<dyn QueryTool>]);
    let mut agent = ConversationAgent::new(chat.clone(), tools, 5);
    agent.chat("q").await.unwrap();

    let seen = chat.seen.lock().unwrap();
    let system = &seen[0][0];
    assert_eq!(system.role, Role::System);
    assert!(system
        .content
        .contains("> document_index: Provides information from the uploaded documents."));
}

#[tokio::test]
async fn memory_is_trimmed_oldest_first() {
    let mut replay = Replay::new(&["Answer: one", "Answer: two", "Answer: three"]);
    // The system prompt, "third" and the scratchpad separator take 116
    // tokens; 49 more fit one exchange.
    replay.window = 165;
    let chat = Arc::new(replay);
    let mut agent = ConversationAgent::new(chat.clone(), ToolSet::new(), 2);

    agent.chat(&"first ".repeat(20)).await.unwrap();
    agent.chat(&"second ".repeat(20)).await.unwrap();
    agent.chat("third").await.unwrap();
    assert_eq!(agent.memory().len(), 6);

    let seen = chat.seen.lock().unwrap();
    let last = &seen[2];
    assert!(!last.iter().any(|m| m.content.starts_with("first")));
    assert!(last.iter().any(|m| m.content.starts_with("second")));
}

#[tokio::test]
async fn index_tool_answers_from_retrieved_context() {
    let chat = Arc::new(ScriptedChat::new(Script::UseTool));
    let tool = IndexQueryTool::new(
        "document_index",
        "docs",
        index_of(&[
            ("spec.pdf", "Pressure limit is 50 bar."),
            ("other.pdf", "Unrelated cafeteria menu."),
        ]),
        Arc::new(HashEmbedder::default()),
        chat.clone(),
        1,
    );
    let answer = tool.query("What is the pressure limit?").await.unwrap();
    assert_eq!(answer, "Pressure limit is 50 bar.");
    assert_eq!(tool.describe().0, "document_index");
}

#[tokio::test]
async fn step_budget_is_enforced() {
    let chat = Arc::new(Replay::new(&[
        "Action: none\nAction Input: a",
        "Action: none\nAction Input: b",
        "Action: none\nAction Input: c",
    ]));
    let mut agent = ConversationAgent::new(chat.clone(), ToolSet::new(), 2);
    let err = agent.chat("q").await.unwrap_err();
    assert!(matches!(err, Error::StepBudgetExhausted(2)));
    assert_eq!(chat.seen.lock().unwrap().len(), 2);
    assert!(agent.memory().is_empty());
}

#[tokio::test]
async fn scratchpad_stays_inside_context_window() {
    let mut replay = Replay::new(&[
        "Action: verbose\nAction Input: a",
        "Action: verbose\nAction Input: b",
        "Action: verbose\nAction Input: c",
        "Answer: done",
    ]);
    replay.window = 400;
    let chat = Arc::new(replay);
    let tools = ToolSet::from(vec![Arc::new(VerboseTool) as Arc<dyn QueryTool>]);
    let mut agent = ConversationAgent::new(chat.clone(), tools, 5);

    assert_eq!(agent.chat("q").await.unwrap(), "done");
    let seen = chat.seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    for messages in seen.iter() {
        assert!(prompt_tokens(messages) <= 400, "{}", prompt_tokens(messages));
    }
    // The newest observation survives trimming.
    let last = &seen[3].last().unwrap().content;
    assert!(last.contains("Action Input: c\nObservation: pressure reading"));
    assert!(!last.contains("Action Input: a"));
}

#[tokio::test]
async fn oversized_excerpt_is_truncated_to_budget() {
    let mut replay = Replay::new(&["the answer"]);
    replay.window = 40;
    let chat = Arc::new(replay);
    let tool = IndexQueryTool::new(
        "document_index",
        "docs",
        index_of(&[(
            "long.txt",
            "Pressure readings are logged hourly at every separator inlet and outlet, \
             and each reading is compared against the design pressure of the vessel \
             before the shift supervisor signs the operating log.",
        )]),
        Arc::new(HashEmbedder::default()),
        chat.clone(),
        1,
    );
    assert_eq!(tool.query("pressure readings").await.unwrap(), "the answer");

    let seen = chat.seen.lock().unwrap();
    let prompt = &seen[0][0].content;
    let context = prompt.split("---------------------").nth(1).unwrap().trim();
    assert!(context.starts_with("[source: long.txt]"));
    // 75% of a 40-token window.
    assert!(estimate_tokens(context) <= 30, "{}", context);
}

#[tokio::test]
async fn mismatched_embedding_space_finds_no_context() {
    let chat = Arc::new(ScriptedChat::new(Script::UseTool));
    let tool = IndexQueryTool::new(
        "document_index",
        "docs",
        index_of(&[("spec.pdf", "Pressure limit is 50 bar.")]),
        Arc::new(NarrowEmbedder),
        chat.clone(),
        3,
    );
    let answer = tool.query("What is the pressure limit?").await.unwrap();
    assert_eq!(answer, NO_CONTEXT_REPLY);
    assert_eq!(chat.synthesis_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unrelated_question_finds_no_context() {
    let chat = Arc::new(ScriptedChat::new(Script::UseTool));
    let tool = IndexQueryTool::new(
        "document_index",
        "docs",
        index_of(&[("spec.pdf", "Pressure limit is 50 bar.")]),
        Arc::new(HashEmbedder::default()),
        chat.clone(),
        3,
    );
    assert_eq!(tool.query("weather tomorrow").await.unwrap(), NO_CONTEXT_REPLY);
    assert_eq!(chat.synthesis_calls.load(Ordering::SeqCst), 0);
}
