//! Durable on-disk storage for a [`DocumentIndex`].
//!
//! A store is a directory holding two files:
//!
//! | File | Content |
//! |------|---------|
//! | `index.json` | The serialized index (nodes, vectors, embedding model). |
//! | `manifest.json` | Format version, creation time, counts, and the SHA-256 of `index.json`. |
//!
//! Each file is written to a temporary file in the store directory and
//! renamed into place, `index.json` first and `manifest.json` last. The
//! manifest rename is the commit point: a reader racing a writer sees
//! either the previous complete store or a checksum mismatch, and a
//! mismatch is reported as "no valid store".

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use docent_core::index::DocumentIndex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};

const INDEX_FILE: &str = "index.json";
const MANIFEST_FILE: &str = "manifest.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub embed_model: String,
    pub dims: usize,
    pub node_count: usize,
    pub document_names: Vec<String>,
    /// SHA-256 of `index.json`.
    pub checksum: String,
}

/// The persisted index at one fixed directory.
#[derive(Debug, Clone)]
pub struct PersistedIndexStore {
    dir: PathBuf,
}

impl PersistedIndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a manifest is present. Says nothing about validity; use
    /// [`load`](Self::load) for that.
    pub fn exists(&self) -> bool {
        self.dir.join(MANIFEST_FILE).is_file()
    }

    /// Read the manifest alone.
    pub fn manifest(&self) -> Result<Manifest> {
        let path = self.dir.join(MANIFEST_FILE);
        let raw = std::fs::read(&path).map_err(|e| Error::persistence(&path, e))?;
        serde_json::from_slice(&raw).map_err(|e| Error::persistence(&path, e))
    }

    /// Load and validate the stored index.
    ///
    /// Returns `Ok(None)` when no store exists, and an error when one
    /// exists but cannot be read or fails validation.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn load(&self) -> Result<Option<DocumentIndex>> {
        if !self.exists() {
            debug!("no persisted index");
            return Ok(None);
        }

        let manifest = self.manifest()?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::persistence(
                &self.dir,
                format!(
                    "unsupported format version {} (expected {})",
                    manifest.format_version, FORMAT_VERSION
                ),
            ));
        }

        let index_path = self.dir.join(INDEX_FILE);
        let raw = std::fs::read(&index_path).map_err(|e| Error::persistence(&index_path, e))?;
        let checksum = sha256_hex(&raw);
        if checksum != manifest.checksum {
            return Err(Error::persistence(
                &index_path,
                "checksum does not match manifest",
            ));
        }

        let index: DocumentIndex =
            serde_json::from_slice(&raw).map_err(|e| Error::persistence(&index_path, e))?;
        if index.len() != manifest.node_count {
            return Err(Error::persistence(
                &index_path,
                format!(
                    "manifest lists {} nodes, index has {}",
                    manifest.node_count,
                    index.len()
                ),
            ));
        }

        info!(nodes = index.len(), model = index.embed_model(), "loaded persisted index");
        Ok(Some(index))
    }

    /// Write `index`, replacing whatever the store held.
    #[instrument(skip(self, index), fields(dir = %self.dir.display(), nodes = index.len()))]
    pub fn persist(&self, index: &DocumentIndex) -> Result<Manifest> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::persistence(&self.dir, e))?;

        let index_bytes =
            serde_json::to_vec(index).map_err(|e| Error::persistence(&self.dir, e))?;
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            embed_model: index.embed_model().to_string(),
            dims: index.dims(),
            node_count: index.len(),
            document_names: index.document_names(),
            checksum: sha256_hex(&index_bytes),
        };
        let manifest_bytes =
            serde_json::to_vec_pretty(&manifest).map_err(|e| Error::persistence(&self.dir, e))?;

        self.publish(INDEX_FILE, &index_bytes)?;
        self.publish(MANIFEST_FILE, &manifest_bytes)?;

        info!(checksum = %manifest.checksum, "persisted index");
        Ok(manifest)
    }

    /// Atomically replace `name` in the store directory with `bytes`.
    fn publish(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let target = self.dir.join(name);
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| Error::persistence(&self.dir, e))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::persistence(tmp.path(), e))?;
        tmp.persist(&target)
            .map_err(|e| Error::persistence(&target, e.error))?;
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
