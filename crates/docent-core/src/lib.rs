//! # Docent Core
//!
//! Pure logic shared by Docent: document models, chunking, vector math,
//! and the in-memory [`DocumentIndex`](index::DocumentIndex).
//!
//! This crate contains no tokio, network, or filesystem I/O. Embedding
//! backends, persistence and the agent live in the `docent` crate.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
