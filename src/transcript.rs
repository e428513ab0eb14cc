//! Session-scoped conversation history.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a turn's response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The agent answered.
    Answered,
    /// No agent was available; the fixed fallback reply was used.
    Fallback,
    /// The agent call failed; the response describes the failure.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub user: String,
    pub response: String,
    pub outcome: Outcome,
    pub at: DateTime<Utc>,
}

/// Append-only list of turns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, user: String, response: String, outcome: Outcome) -> &ConversationTurn {
        self.turns.push(ConversationTurn {
            user,
            response,
            outcome,
            at: Utc::now(),
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent turn, for redrawing only the latest exchange.
    pub fn last_exchange(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }
}
