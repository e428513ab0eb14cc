//! Event handlers for an interactive front end.
//!
//! [`SessionController`] owns one [`Session`] behind an async mutex and
//! exposes one method per user event. Each returns what the front end
//! should show: a list of [`Notice`]s and which [`View`] to redraw. The
//! lock is held for the whole operation, including the agent call, so
//! concurrent sends are answered one at a time in arrival order.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::backend::Backends;
use crate::config::Config;
use crate::credential::Credential;
use crate::error::Error;
use crate::materialize::UploadedDocument;
use crate::session::{IndexSource, IndexSummary, Session, SessionState};
use crate::stream::ReplyStream;
use crate::transcript::{ConversationTurn, Outcome};

/// Shown whenever a backend rejects the bound credential.
pub const CREDENTIAL_REJECTED: &str = "The API credential was rejected. Please enter it again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Screen region affected by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Sidebar,
    Chat,
}

/// Result of a sidebar event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub notices: Vec<Notice>,
    pub redraw: View,
}

impl Feedback {
    fn sidebar(notices: Vec<Notice>) -> Self {
        Self {
            notices,
            redraw: View::Sidebar,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.notices.iter().any(|n| n.level == NoticeLevel::Error)
    }
}

/// Result of sending a chat message.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub feedback: Feedback,
    /// The recorded turn; `None` when the message was rejected.
    pub turn: Option<ConversationTurn>,
    stream_delay: Duration,
}

impl ChatReply {
    /// The response as a word-by-word stream.
    pub fn stream(&self) -> Option<ReplyStream> {
        self.turn
            .as_ref()
            .map(|t| ReplyStream::new(&t.response, self.stream_delay))
    }
}

pub struct SessionController {
    session: Mutex<Session>,
}

impl SessionController {
    pub fn new(config: Config) -> Self {
        Self::from_session(Session::new(config))
    }

    pub fn from_session(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    /// Exclusive access to the session, waiting behind any running event.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }

    /// Credential entered. Binds remote backends; if an index is active the
    /// agent is rebuilt against them.
    pub async fn on_credential(&self, secret: &str) -> Feedback {
        let credential = match Credential::new(secret) {
            Ok(c) => c,
            Err(_) => {
                return Feedback::sidebar(vec![Notice::warning(
                    "Please enter your API credential to continue.",
                )])
            }
        };
        let mut session = self.lock().await;
        if let Err(e) = session.initialize(&credential) {
            return Feedback::sidebar(vec![Notice::error(e.to_string())]);
        }
        let mut notices = vec![Notice::success("API credential set.")];
        if session.active_index().is_some() {
            notices.push(agent_notice(&mut session));
        }
        Feedback::sidebar(notices)
    }

    /// Bind caller-supplied backends, then rebuild the agent like
    /// [`on_credential`](Self::on_credential).
    pub async fn on_backends(&self, backends: Backends) -> Feedback {
        let mut session = self.lock().await;
        session.bind_backends(backends);
        let mut notices = vec![Notice::success("Backends bound.")];
        if session.active_index().is_some() {
            notices.push(agent_notice(&mut session));
        }
        Feedback::sidebar(notices)
    }

    /// Documents uploaded. Builds or loads the index, then builds the
    /// agent if an index is active.
    pub async fn on_upload(&self, documents: Vec<UploadedDocument>) -> Feedback {
        let mut session = self.lock().await;
        if session.state() == SessionState::Uninitialized {
            return Feedback::sidebar(vec![Notice::warning(
                "Please enter your API credential before uploading documents.",
            )]);
        }

        let summary = match session.build_or_load_index(&documents).await {
            Ok(s) => s,
            Err(e) if e.is_credential_rejection() => {
                return Feedback::sidebar(vec![Notice::error(CREDENTIAL_REJECTED)])
            }
            Err(e) => {
                return Feedback::sidebar(vec![Notice::error(format!(
                    "Indexing failed: {}",
                    e
                ))])
            }
        };
        let store_dir = session.store().dir().display().to_string();
        let mut notices = summary_notices(&summary, &store_dir);
        if session.active_index().is_some() {
            notices.push(agent_notice(&mut session));
        }
        info!(session = %session.id(), state = ?session.state(), "upload handled");
        Feedback::sidebar(notices)
    }

    pub async fn on_build_agent(&self) -> Feedback {
        let mut session = self.lock().await;
        Feedback::sidebar(vec![agent_notice(&mut session)])
    }

    /// Chat message submitted.
    pub async fn on_send(&self, message: &str) -> ChatReply {
        let mut session = self.lock().await;
        let stream_delay = Duration::from_millis(session.config().chat.stream_delay_ms);

        let (turn, notices) = match session.converse(message).await {
            Ok(turn) => {
                let mut notices = Vec::new();
                if turn.outcome == Outcome::Failed
                    && session.state() == SessionState::Uninitialized
                {
                    notices.push(Notice::error(CREDENTIAL_REJECTED));
                }
                (Some(turn), notices)
            }
            Err(Error::EmptyMessage) => (None, vec![Notice::warning("Please enter a message.")]),
            Err(e) => (None, vec![Notice::error(e.to_string())]),
        };

        ChatReply {
            feedback: Feedback {
                notices,
                redraw: View::Chat,
            },
            turn,
            stream_delay,
        }
    }

    pub async fn transcript(&self) -> Vec<ConversationTurn> {
        self.lock().await.transcript().turns().to_vec()
    }

    pub async fn last_exchange(&self) -> Option<ConversationTurn> {
        self.lock().await.transcript().last_exchange().cloned()
    }

    pub async fn state(&self) -> SessionState {
        self.lock().await.state()
    }
}

fn agent_notice(session: &mut Session) -> Notice {
    match session.build_agent() {
        Ok(()) => Notice::success("Documents processed and AI assistant created successfully!"),
        Err(Error::IndexUnavailable) => {
            Notice::warning("Agent unavailable: upload documents to build an index first.")
        }
        Err(e) => Notice::error(format!("Could not create the assistant: {}", e)),
    }
}

fn summary_notices(summary: &IndexSummary, store_dir: &str) -> Vec<Notice> {
    let mut notices: Vec<Notice> = summary
        .failed
        .iter()
        .map(|(name, reason)| Notice::warning(format!("Skipped {}: {}", name, reason)))
        .collect();

    match summary.source {
        IndexSource::Loaded => {
            notices.push(Notice::success(format!(
                "Loaded the saved document index ({} documents).",
                summary.indexed
            )));
            if summary.ignored_uploads > 0 {
                notices.push(Notice::warning(format!(
                    "{} uploaded document(s) were not indexed because a saved index exists at {}.",
                    summary.ignored_uploads, store_dir
                )));
            }
        }
        IndexSource::Built => notices.push(Notice::success(format!(
            "Indexed {} document(s).",
            summary.indexed
        ))),
        IndexSource::None => notices.push(Notice::warning("No documents were indexed.")),
    }

    if let Some(warning) = &summary.persist_warning {
        notices.push(Notice::warning(format!(
            "The index could not be saved and will be lost when the session ends: {}",
            warning
        )));
    }
    notices
}
