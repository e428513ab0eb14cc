//! Scoped on-disk copies of uploaded documents.
//!
//! Text extraction works on filesystem paths, while uploads arrive as
//! bytes. A [`MaterializedFile`] writes the bytes to a uniquely named
//! temporary file that keeps the upload's extension and removes it when
//! dropped, including during unwinding.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// One uploaded document: original file name and raw bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lowercase extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

impl std::fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// A temporary file holding one document's bytes. Deleted on drop.
#[derive(Debug)]
pub struct MaterializedFile {
    file: NamedTempFile,
}

impl MaterializedFile {
    /// Write `doc` to a new temporary file in `dir` (or the OS temp dir).
    pub fn create(doc: &UploadedDocument, dir: Option<&Path>) -> Result<Self> {
        let suffix = doc
            .extension()
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix("docent-upload-").suffix(&suffix);
        let created = match dir {
            Some(d) => builder.tempfile_in(d),
            None => builder.tempfile(),
        };
        let mut file = created.map_err(|e| extraction_io(doc, e))?;
        file.write_all(&doc.bytes)
            .and_then(|_| file.flush())
            .map_err(|e| extraction_io(doc, e))?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

fn extraction_io(doc: &UploadedDocument, e: std::io::Error) -> Error {
    Error::DocumentExtraction {
        name: doc.name.clone(),
        reason: format!("could not materialize upload: {}", e),
    }
}
