//! The session index manager.
//!
//! A [`Session`] turns uploaded documents into a conversational agent:
//!
//! ```text
//! initialize ──▶ build_or_load_index ──▶ build_agent ──▶ converse …
//! (Configured)   (Indexed)               (Ready)
//! ```
//!
//! The session owns at most one active [`DocumentIndex`] and at most one
//! agent bound to it. Rebuilding the index always discards the agent, so
//! an agent never answers from an index that is no longer active.
//!
//! # Load before build
//!
//! When the configured store directory holds a valid persisted index,
//! [`Session::build_or_load_index`] loads it and does not look at the
//! uploads. The returned [`IndexSummary`] reports this as
//! [`IndexSource::Loaded`] together with the number of uploads that were
//! ignored. A store that fails validation is logged and rebuilt over.

use std::sync::Arc;

use docent_core::chunk::chunk_document;
use docent_core::index::DocumentIndex;
use docent_core::models::{ExtractedDocument, IndexNode};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::agent::ConversationAgent;
use crate::backend::Backends;
use crate::config::Config;
use crate::credential::Credential;
use crate::error::{Backend, Error, Result};
use crate::extract::{extract_file, DocumentKind};
use crate::materialize::{MaterializedFile, UploadedDocument};
use crate::store::PersistedIndexStore;
use crate::tool::{IndexQueryTool, QueryTool, ToolSet};
use crate::transcript::{ConversationTurn, Outcome, Transcript};

/// Lifecycle position, derived from what the session currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No backends bound.
    Uninitialized,
    /// Backends bound, no index.
    Configured,
    /// Index active, no agent.
    Indexed,
    /// Agent built over the active index.
    Ready,
}

/// Where the index produced by a build-or-load call came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    /// Read from the persisted store; uploads were not indexed.
    Loaded,
    /// Built from the uploads.
    Built,
    /// No new index (nothing indexable and no store).
    None,
}

/// Report of one [`Session::build_or_load_index`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub source: IndexSource,
    /// Documents in the resulting index (or successfully extracted, when built).
    pub indexed: usize,
    /// `(file name, reason)` for each upload that could not be extracted.
    pub failed: Vec<(String, String)>,
    /// Uploads not looked at because a persisted index was loaded.
    pub ignored_uploads: usize,
    /// Whether the built index was written to the store.
    pub persisted: bool,
    /// Why persisting a built index failed.
    pub persist_warning: Option<String>,
}

impl IndexSummary {
    fn empty(source: IndexSource) -> Self {
        Self {
            source,
            indexed: 0,
            failed: Vec::new(),
            ignored_uploads: 0,
            persisted: false,
            persist_warning: None,
        }
    }
}

/// One user's document index, agent and conversation.
pub struct Session {
    id: Uuid,
    config: Config,
    store: PersistedIndexStore,
    backends: Option<Backends>,
    index: Option<Arc<DocumentIndex>>,
    agent: Option<ConversationAgent>,
    transcript: Transcript,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let store = PersistedIndexStore::new(config.store.path.clone());
        Self {
            id: Uuid::new_v4(),
            config,
            store,
            backends: None,
            index: None,
            agent: None,
            transcript: Transcript::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &PersistedIndexStore {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        match (&self.backends, &self.index, &self.agent) {
            (None, _, _) => SessionState::Uninitialized,
            (Some(_), None, _) => SessionState::Configured,
            (Some(_), Some(_), None) => SessionState::Indexed,
            (Some(_), Some(_), Some(_)) => SessionState::Ready,
        }
    }

    pub fn backends(&self) -> Option<&Backends> {
        self.backends.as_ref()
    }

    pub fn active_index(&self) -> Option<&Arc<DocumentIndex>> {
        self.index.as_ref()
    }

    pub fn has_agent(&self) -> bool {
        self.agent.is_some()
    }

    pub fn agent(&self) -> Option<&ConversationAgent> {
        self.agent.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Drop backends, index, agent and transcript. The persisted store is
    /// left alone.
    pub fn reset(&mut self) {
        info!(session = %self.id, "session reset");
        self.backends = None;
        self.index = None;
        self.agent = None;
        self.transcript = Transcript::new();
    }

    /// Bind the remote embedding and completion backends for `credential`.
    ///
    /// Replaces any previous binding and discards a built agent, which
    /// holds the previous completion backend.
    #[instrument(skip_all, fields(session = %self.id))]
    pub fn initialize(&mut self, credential: &Credential) -> Result<()> {
        let backends = Backends::remote(&self.config, credential)?;
        self.bind_backends(backends);
        Ok(())
    }

    /// Bind arbitrary backend implementations. Same semantics as
    /// [`initialize`](Self::initialize).
    pub fn bind_backends(&mut self, backends: Backends) {
        info!(session = %self.id, ?backends, "backends bound");
        self.backends = Some(backends);
        self.agent = None;
    }

    /// Make an index active: the persisted one if valid, else one built
    /// from `documents`.
    ///
    /// Per-document extraction failures are collected in the summary. An
    /// embedding failure aborts the build and leaves the previous index
    /// active. A failed persist keeps the built index active and is
    /// reported in [`IndexSummary::persist_warning`].
    #[instrument(skip_all, fields(session = %self.id, uploads = documents.len()))]
    pub async fn build_or_load_index(
        &mut self,
        documents: &[UploadedDocument],
    ) -> Result<IndexSummary> {
        let backends = self.backends.clone().ok_or_else(unbound)?;
        self.agent = None;

        match self.store.load() {
            Ok(Some(index)) => {
                if index.embed_model() != backends.embedder.model_name() {
                    warn!(
                        stored = index.embed_model(),
                        bound = backends.embedder.model_name(),
                        "persisted index was built with a different embedding model"
                    );
                }
                let mut summary = IndexSummary::empty(IndexSource::Loaded);
                summary.indexed = index.document_count();
                summary.ignored_uploads = documents.len();
                if !documents.is_empty() {
                    info!(
                        ignored = documents.len(),
                        "persisted index found; uploads not indexed"
                    );
                }
                self.index = Some(Arc::new(index));
                return Ok(summary);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "persisted index is unusable; rebuilding"),
        }

        let mut extracted = Vec::new();
        let mut failed = Vec::new();
        for doc in documents {
            match self.extract_upload(doc).await {
                Ok(text) => extracted.push(ExtractedDocument::new(doc.name.clone(), text)),
                Err(e) => {
                    warn!(document = %doc.name, error = %e, "document skipped");
                    let reason = match e {
                        Error::DocumentExtraction { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    failed.push((doc.name.clone(), reason));
                }
            }
        }

        if extracted.is_empty() {
            info!(failed = failed.len(), "nothing to index");
            let mut summary = IndexSummary::empty(IndexSource::None);
            summary.failed = failed;
            return Ok(summary);
        }

        let index = match self.embed_documents(&backends, &extracted).await {
            Ok(index) => index,
            Err(e) => {
                if e.is_credential_rejection() {
                    warn!("credential rejected during indexing; backends unbound");
                    self.backends = None;
                }
                return Err(e);
            }
        };
        let mut summary = IndexSummary::empty(IndexSource::Built);
        summary.indexed = extracted.len();
        summary.failed = failed;

        match self.store.persist(&index) {
            Ok(_) => summary.persisted = true,
            Err(e) => {
                warn!(error = %e, "index kept in memory only");
                summary.persist_warning = Some(e.to_string());
            }
        }

        info!(
            documents = summary.indexed,
            nodes = index.len(),
            failed = summary.failed.len(),
            "index built"
        );
        self.index = Some(Arc::new(index));
        Ok(summary)
    }

    /// Materialize one upload, extract its text on a blocking worker, and
    /// remove the temporary file.
    async fn extract_upload(&self, doc: &UploadedDocument) -> Result<String> {
        let fail = |reason: String| Error::DocumentExtraction {
            name: doc.name.clone(),
            reason,
        };

        let ext = doc.extension().unwrap_or_default();
        if !self.config.upload.allowed_extensions.iter().any(|a| *a == ext) {
            return Err(fail(format!("file type {:?} is not accepted", ext)));
        }
        let kind = DocumentKind::from_extension(&ext)
            .ok_or_else(|| fail(format!("no text extractor for {:?} files", ext)))?;
        if let Some(limit) = self.config.upload.max_upload_bytes {
            if doc.bytes.len() as u64 > limit {
                return Err(fail(format!(
                    "{} bytes exceeds the {} byte upload limit",
                    doc.bytes.len(),
                    limit
                )));
            }
        }

        let file = MaterializedFile::create(doc, self.config.upload.scratch_dir.as_deref())?;
        debug!(document = %doc.name, path = %file.path().display(), "materialized upload");

        // The file moves into the worker and is dropped there, even if the
        // extractor panics.
        let joined = tokio::task::spawn_blocking(move || extract_file(file.path(), kind)).await;
        match joined {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(fail(e.to_string())),
            Err(e) => Err(fail(format!("extractor crashed: {}", e))),
        }
    }

    /// Chunk and embed `documents` into a new index.
    async fn embed_documents(
        &self,
        backends: &Backends,
        documents: &[ExtractedDocument],
    ) -> Result<DocumentIndex> {
        let chunking = &self.config.chunking;
        let chunks: Vec<_> = documents
            .iter()
            .flat_map(|d| chunk_document(d, chunking.max_tokens, chunking.overlap_tokens))
            .collect();
        debug!(chunks = chunks.len(), "documents chunked");

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = backends.embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(Error::remote(
                    Backend::Embedding,
                    format!(
                        "expected {} vectors, received {}",
                        texts.len(),
                        embedded.len()
                    ),
                ));
            }
            vectors.extend(embedded);
        }

        let nodes: Vec<IndexNode> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexNode::from_chunk(chunk, vector))
            .collect();
        DocumentIndex::new(backends.embedder.model_name(), nodes)
            .map_err(|e| Error::remote(Backend::Embedding, e.to_string()))
    }

    /// Wrap the active index in a query tool and build a fresh agent over it.
    #[instrument(skip_all, fields(session = %self.id))]
    pub fn build_agent(&mut self) -> Result<()> {
        let backends = self.backends.as_ref().ok_or_else(unbound)?;
        let index = self.index.clone().ok_or(Error::IndexUnavailable)?;

        let agent_cfg = &self.config.agent;
        let tool = IndexQueryTool::new(
            agent_cfg.tool_name.clone(),
            agent_cfg.tool_description.clone(),
            index,
            backends.embedder.clone(),
            backends.chat.clone(),
            self.config.retrieval.similarity_top_k,
        );
        let tools = ToolSet::from(vec![Arc::new(tool) as Arc<dyn QueryTool>]);
        self.agent = Some(ConversationAgent::new(
            backends.chat.clone(),
            tools,
            agent_cfg.max_steps,
        ));
        info!(tool = %agent_cfg.tool_name, max_steps = agent_cfg.max_steps, "agent built");
        Ok(())
    }

    /// Answer `message` and record the turn.
    ///
    /// Without an agent the configured fallback reply is used. Agent
    /// failures become a visible error reply; a rejected credential also
    /// unbinds the backends. Nothing is recorded if the returned future is
    /// dropped before it completes, or if `message` is blank.
    #[instrument(skip_all, fields(session = %self.id))]
    pub async fn converse(&mut self, message: &str) -> Result<ConversationTurn> {
        if message.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }

        let result = match self.agent.as_mut() {
            Some(agent) => Some(agent.chat(message).await),
            None => None,
        };

        let (response, outcome) = match result {
            None => {
                debug!("no agent; fallback reply");
                (self.config.chat.fallback_message.clone(), Outcome::Fallback)
            }
            Some(Ok(answer)) => (answer, Outcome::Answered),
            Some(Err(e)) => {
                if e.is_credential_rejection() {
                    warn!("credential rejected; backends unbound");
                    self.backends = None;
                    self.agent = None;
                } else {
                    warn!(error = %e, "agent failed");
                }
                (failure_reply(&e), Outcome::Failed)
            }
        };

        Ok(self
            .transcript
            .push(message.to_string(), response, outcome)
            .clone())
    }
}

fn unbound() -> Error {
    Error::Configuration("enter an API credential first".to_string())
}

fn failure_reply(e: &Error) -> String {
    match e {
        Error::Configuration(_) => {
            "The API credential was rejected. Please enter a valid credential to continue."
                .to_string()
        }
        Error::StepBudgetExhausted(n) => format!(
            "I could not reach an answer within {} reasoning steps. Please try rephrasing the question.",
            n
        ),
        other => format!("Sorry, I could not answer that: {}", other),
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("store", &self.store.dir())
            .field("turns", &self.transcript.len())
            .finish()
    }
}
