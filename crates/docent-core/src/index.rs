//! In-memory document index with top-k similarity retrieval.
//!
//! A [`DocumentIndex`] is an immutable collection of [`IndexNode`]s that
//! all share one vector dimensionality. Retrieval is brute-force cosine
//! similarity, which is adequate for the few documents a single session
//! uploads.
//!
//! The index is serializable so the application can persist it, and it
//! exposes a [`fingerprint`](DocumentIndex::fingerprint) that identifies
//! its exact content (used to verify that a reload is faithful).

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embedding::cosine_similarity;
use crate::models::{IndexNode, ScoredNode};

/// Searchable set of embedded chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentIndex {
    /// Name of the embedding model that produced the vectors.
    embed_model: String,
    dims: usize,
    nodes: Vec<IndexNode>,
}

impl DocumentIndex {
    /// Build an index from embedded nodes.
    ///
    /// # Errors
    ///
    /// Fails if `nodes` is empty or if any vector's length differs from
    /// the first one's.
    pub fn new(embed_model: impl Into<String>, nodes: Vec<IndexNode>) -> Result<Self> {
        let dims = match nodes.first() {
            Some(n) => n.vector.len(),
            None => bail!("cannot build an index without nodes"),
        };
        if dims == 0 {
            bail!("embedding vectors must not be empty");
        }
        if let Some(bad) = nodes.iter().find(|n| n.vector.len() != dims) {
            bail!(
                "node {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                dims
            );
        }
        Ok(Self {
            embed_model: embed_model.into(),
            dims,
            nodes,
        })
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn nodes(&self) -> &[IndexNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of the documents represented in the index, sorted.
    pub fn document_names(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|n| n.document_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of distinct documents represented in the index.
    pub fn document_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.document_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Return the `k` nodes most similar to `query_vec`, best first.
    ///
    /// Ties are broken by node order so results are deterministic. Only
    /// nodes with a positive score are returned, and a query vector of the
    /// wrong dimensionality matches nothing.
    pub fn top_k(&self, query_vec: &[f32], k: usize) -> Vec<ScoredNode<'_>> {
        if query_vec.len() != self.dims {
            return Vec::new();
        }
        let mut scored: Vec<(usize, ScoredNode<'_>)> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                (
                    i,
                    ScoredNode {
                        node,
                        score: cosine_similarity(query_vec, &node.vector),
                    },
                )
            })
            .filter(|(_, s)| s.score > 0.0)
            .collect();
        scored.sort_by(|(ia, a), (ib, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ia.cmp(ib))
        });
        scored.into_iter().take(k).map(|(_, s)| s).collect()
    }

    /// SHA-256 over the model name, node ids, texts and vectors.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.embed_model.as_bytes());
        for node in &self.nodes {
            hasher.update(node.id.as_bytes());
            hasher.update(node.text.as_bytes());
            for x in &node.vector {
                hasher.update(x.to_le_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}
