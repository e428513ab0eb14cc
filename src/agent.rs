//! Bounded-step ReAct conversation agent.
//!
//! The agent answers a user message by alternating model completions and
//! tool calls in a plain-text protocol:
//!
//! ```text
//! Thought: I need to look this up.
//! Action: document_index
//! Action Input: {"input": "What is the pressure limit?"}
//! Observation: The pressure limit is 50 bar.
//! Thought: I can answer without using any more tools.
//! Answer: The pressure limit is 50 bar.
//! ```
//!
//! Each completion is one step; [`ConversationAgent::chat`] gives up with
//! [`Error::StepBudgetExhausted`] after `max_steps`. Completed exchanges
//! are kept as chat memory so follow-up questions have context. Memory and
//! the per-message scratchpad are both trimmed oldest-first, and each
//! observation is capped at half the window, so a step's prompt stays
//! inside the model's context window.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::backend::{estimate_tokens, truncate_to_tokens, ChatMessage, ChatModel};
use crate::error::{Error, Result};
use crate::tool::ToolSet;

/// One parsed model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Call `tool` with `input`.
    Action { tool: String, input: String },
    /// Final answer for the user.
    Answer(String),
}

/// Parse a model reply into a [`Step`].
///
/// An `Answer:` line wins over an `Action:` line that follows it. A reply
/// with neither marker is taken verbatim as the answer.
pub fn parse_step(reply: &str) -> Step {
    let answer_at = find_marker(reply, "Answer:");
    let action_at = find_marker(reply, "Action:");

    match (answer_at, action_at) {
        (Some(a), Some(b)) if a < b => Step::Answer(after_marker(reply, a, "Answer:")),
        (Some(a), None) => Step::Answer(after_marker(reply, a, "Answer:")),
        (_, Some(b)) => {
            let rest = &reply[b + "Action:".len()..];
            let (tool_line, tail) = rest.split_once('\n').unwrap_or((rest, ""));
            let input = find_marker(tail, "Action Input:")
                .map(|i| after_marker(tail, i, "Action Input:"))
                .unwrap_or_default();
            Step::Action {
                tool: tool_line.trim().to_string(),
                input: tool_input(&input),
            }
        }
        (None, None) => Step::Answer(reply.trim().to_string()),
    }
}

/// Byte offset of `marker` at the start of a line.
fn find_marker(text: &str, marker: &str) -> Option<usize> {
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with(marker) {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

/// Protocol lines that end an `Answer:` or `Action Input:` span.
const SPAN_TERMINATORS: [&str; 4] = ["Action:", "Action Input:", "Thought:", "Observation:"];

fn after_marker(text: &str, at: usize, marker: &str) -> String {
    let rest = &text[at + marker.len()..];
    let end = SPAN_TERMINATORS
        .iter()
        .filter_map(|m| find_marker(rest, m))
        .min()
        .unwrap_or(rest.len());
    rest[..end].trim().to_string()
}

/// Accept `{"input": "..."}` (the prompted form), any single-string JSON
/// object, a JSON string, or bare text.
fn tool_input(raw: &str) -> String {
    let raw = raw.trim();
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map
            .get("input")
            .or_else(|| map.values().next())
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| raw.to_string()),
        Ok(serde_json::Value::String(s)) => s,
        _ => raw.to_string(),
    }
}

/// A reasoning loop bound to one chat model and a fixed set of tools.
pub struct ConversationAgent {
    chat: Arc<dyn ChatModel>,
    tools: ToolSet,
    max_steps: u32,
    memory: Vec<ChatMessage>,
}

impl ConversationAgent {
    pub fn new(chat: Arc<dyn ChatModel>, tools: ToolSet, max_steps: u32) -> Self {
        Self {
            chat,
            tools,
            max_steps: max_steps.max(1),
            memory: Vec::new(),
        }
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Completed exchanges, oldest first.
    pub fn memory(&self) -> &[ChatMessage] {
        &self.memory
    }

    fn system_prompt(&self) -> String {
        let mut tool_lines = String::new();
        for tool in self.tools.tools() {
            let (name, description) = tool.describe();
            tool_lines.push_str(&format!("> {}: {}\n", name, description));
        }
        format!(
            "You are a methods engineer assistant answering questions about the user's documents.\n\
             \n\
             You have access to these tools:\n\
             {tools}\n\
             To use a tool, reply in exactly this format:\n\
             \n\
             Thought: <why you need the tool>\n\
             Action: <one of: {names}>\n\
             Action Input: {{\"input\": \"<a detailed plain text question>\"}}\n\
             \n\
             You will then receive:\n\
             Observation: <tool result>\n\
             \n\
             Repeat as needed. When you can answer, reply:\n\
             \n\
             Thought: I can answer without using any more tools.\n\
             Answer: <your answer>\n",
            tools = tool_lines,
            names = self.tools.names().join(", "),
        )
    }

    /// Messages for one step: system prompt, trimmed memory, then the
    /// current exchange (user message plus the newest scratchpad entries
    /// that fit).
    fn build_messages(&self, message: &str, scratchpad: &[String]) -> Vec<ChatMessage> {
        let system = self.system_prompt();
        let window = self.chat.context_window();
        // One token for the separator between message and scratchpad.
        let mut budget =
            window.saturating_sub(estimate_tokens(&system) + estimate_tokens(message) + 1);

        let mut steps_kept = 0usize;
        for entry in scratchpad.iter().rev() {
            let cost = estimate_tokens(entry);
            if cost > budget {
                break;
            }
            budget -= cost;
            steps_kept += 1;
        }
        if steps_kept < scratchpad.len() {
            debug!(dropped = scratchpad.len() - steps_kept, "scratchpad trimmed");
        }

        let mut current = message.to_string();
        if steps_kept > 0 {
            current.push_str("\n\n");
            for entry in &scratchpad[scratchpad.len() - steps_kept..] {
                current.push_str(entry);
            }
        }

        // Keep the newest whole exchanges (user + assistant pairs) that fit.
        let mut kept = 0usize;
        let mut used = 0usize;
        for pair in self.memory.rchunks(2) {
            let cost: usize = pair.iter().map(|m| estimate_tokens(&m.content)).sum();
            if used + cost > budget {
                break;
            }
            used += cost;
            kept += pair.len();
        }

        let mut messages = Vec::with_capacity(kept + 2);
        messages.push(ChatMessage::system(system));
        messages.extend_from_slice(&self.memory[self.memory.len() - kept..]);
        messages.push(ChatMessage::user(current));
        messages
    }

    /// Run the reasoning loop for one user message.
    ///
    /// Remote and credential errors propagate. A failing tool or an unknown
    /// tool name is reported back to the model as an observation.
    #[instrument(skip(self, message), fields(max_steps = self.max_steps))]
    pub async fn chat(&mut self, message: &str) -> Result<String> {
        let mut scratchpad: Vec<String> = Vec::new();
        let observation_cap = self.chat.context_window() / 2;

        for step in 1..=self.max_steps {
            let messages = self.build_messages(message, &scratchpad);
            let reply = self.chat.complete(&messages).await?;
            debug!(step, "agent step");

            match parse_step(&reply) {
                Step::Answer(answer) => {
                    info!(steps = step, "agent answered");
                    self.memory.push(ChatMessage::user(message));
                    self.memory.push(ChatMessage::assistant(answer.clone()));
                    return Ok(answer);
                }
                Step::Action { tool, input } => {
                    let observation = match self.tools.find(&tool) {
                        Some(t) => match t.query(&input).await {
                            Ok(out) => out,
                            Err(e @ (Error::RemoteBackend { .. } | Error::Configuration(_))) => {
                                return Err(e)
                            }
                            Err(e) => {
                                warn!(tool = %tool, error = %e, "tool failed");
                                format!("Error: {}", e)
                            }
                        },
                        None => format!(
                            "Error: there is no tool named {:?}. Available tools: {}",
                            tool,
                            self.tools.names().join(", ")
                        ),
                    };
                    scratchpad.push(format!(
                        "{}\nObservation: {}\n",
                        reply.trim_end(),
                        truncate_to_tokens(&observation, observation_cap)
                    ));
                }
            }
        }

        warn!(max_steps = self.max_steps, "agent step budget exhausted");
        Err(Error::StepBudgetExhausted(self.max_steps))
    }
}
