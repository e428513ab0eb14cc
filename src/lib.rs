//! # Docent
//!
//! Session-scoped document question answering. A user supplies an API
//! credential and uploads documents; the session extracts their text,
//! builds (or reloads) a vector index, wraps it in a query tool, and puts
//! a reasoning agent in front of it that answers chat messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Uploads  │──▶│ Materialize  │──▶│ Chunk+Embed  │──▶│   Index   │◀──▶ ./storage
//! │ (bytes)  │   │ + Extract    │   │ (core crate) │   │ (session) │
//! └──────────┘   └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                                            │
//!                            ┌────────────┐   ┌──────────────┴┐
//!              message ─────▶│   Agent    │──▶│  Query tool   │
//!              reply   ◀─────│  (ReAct)   │◀──│ (top-k + LLM) │
//!                            └────────────┘   └───────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use docent::config::Config;
//! use docent::credential::Credential;
//! use docent::materialize::UploadedDocument;
//! use docent::session::Session;
//!
//! # async fn run() -> docent::Result<()> {
//! let config = Config::default();
//! let credential = Credential::from_config(&config)?;
//! let mut session = Session::new(config);
//! session.initialize(&credential)?;
//!
//! let pdf = std::fs::read("spec.pdf").unwrap_or_default();
//! session
//!     .build_or_load_index(&[UploadedDocument::new("spec.pdf", pdf)])
//!     .await?;
//! session.build_agent()?;
//!
//! let turn = session.converse("What is the pressure limit?").await?;
//! println!("{}", turn.response);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`credential`] | Redacted API credential |
//! | [`backend`] | Embedding and chat traits, OpenAI-compatible clients |
//! | [`materialize`] | Temporary files for uploads |
//! | [`extract`] | PDF, DOCX and plain-text extraction |
//! | [`store`] | Persisted index |
//! | [`tool`] | Query tools |
//! | [`agent`] | ReAct conversation agent |
//! | [`session`] | Session index manager |
//! | [`transcript`] | Conversation history |
//! | [`stream`] | Word-by-word reply streams |
//! | [`handlers`] | Front-end event handlers |
//! | [`logging`] | `tracing` subscriber setup |

pub mod agent;
pub mod backend;
pub mod config;
pub mod credential;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod logging;
pub mod materialize;
pub mod session;
pub mod store;
pub mod stream;
pub mod tool;
pub mod transcript;

pub use error::{Error, Result};
