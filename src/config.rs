//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or [`Config::default`])
//! describes a working setup pointed at the OctoAI OpenAI-compatible
//! endpoints. [`load_config`] parses and validates a file.
//!
//! ```toml
//! [store]
//! path = "./storage"
//!
//! [llm]
//! model = "meta-llama-3.1-70b-instruct"
//! context_window = 40000
//!
//! [agent]
//! max_steps = 10
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub upload: UploadConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory of the persisted index.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./storage"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    /// Lowercase file extensions accepted for indexing.
    pub allowed_extensions: Vec<String>,
    /// Per-document size limit; unlimited when absent.
    pub max_upload_bytes: Option<u64>,
    /// Where materialized uploads are written; the OS temp dir when absent.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["pdf".to_string()],
            max_upload_bytes: None,
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            overlap_tokens: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub similarity_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API (without `/embeddings`).
    pub url: String,
    pub model: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_api_base(),
            model: "thenlper/gte-large".to_string(),
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub url: String,
    pub model: String,
    /// Context-length ceiling in tokens.
    pub context_window: usize,
    pub temperature: f32,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_api_base(),
            model: "meta-llama-3.1-70b-instruct".to_string(),
            context_window: 40_000,
            temperature: 0.1,
            max_retries: 3,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    /// Reasoning steps allowed per user message.
    pub max_steps: u32,
    pub tool_name: String,
    pub tool_description: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            tool_name: "document_index".to_string(),
            tool_description: "Provides information from the uploaded documents. \
                Use a detailed plain text question as input to the tool."
                .to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    /// Reply used when no agent is available.
    pub fallback_message: String,
    /// Delay between streamed words.
    pub stream_delay_ms: u64,
    /// Environment variable holding the API credential.
    pub credential_env: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            fallback_message: "Please upload documents first to enable the AI assistant."
                .to_string(),
            stream_delay_ms: 10,
            credential_env: "OCTOAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"docent=debug"`.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn default_api_base() -> String {
    "https://text.octoai.run/v1".to_string()
}

impl Config {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be > 0");
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            bail!("chunking.overlap_tokens must be smaller than chunking.max_tokens");
        }
        if self.retrieval.similarity_top_k == 0 {
            bail!("retrieval.similarity_top_k must be >= 1");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.url.trim().is_empty() || self.embedding.model.trim().is_empty() {
            bail!("embedding.url and embedding.model must be set");
        }
        if self.llm.url.trim().is_empty() || self.llm.model.trim().is_empty() {
            bail!("llm.url and llm.model must be set");
        }
        if self.llm.context_window == 0 {
            bail!("llm.context_window must be > 0");
        }
        if self.agent.max_steps == 0 {
            bail!("agent.max_steps must be >= 1");
        }
        if self.agent.tool_name.trim().is_empty() {
            bail!("agent.tool_name must not be empty");
        }
        if self.upload.allowed_extensions.is_empty() {
            bail!("upload.allowed_extensions must list at least one extension");
        }
        Ok(())
    }
}

/// Read, parse and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    for ext in &mut config.upload.allowed_extensions {
        *ext = ext.trim_start_matches('.').to_ascii_lowercase();
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.store.path, PathBuf::from("./storage"));
        assert_eq!(config.llm.context_window, 40_000);
        assert_eq!(config.agent.max_steps, 10);
        assert_eq!(config.retrieval.similarity_top_k, 3);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.agent.tool_name, "document_index");
        assert_eq!(config.upload.allowed_extensions, vec!["pdf"]);
    }

    #[test]
    fn test_partial_sections_override() {
        let file = write_config(
            r#"
[store]
path = "/tmp/idx"

[upload]
allowed_extensions = [".PDF", "txt"]

[agent]
max_steps = 4
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/idx"));
        assert_eq!(config.upload.allowed_extensions, vec!["pdf", "txt"]);
        assert_eq!(config.agent.max_steps, 4);
        assert_eq!(config.chunking.max_tokens, 1024);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let file = write_config("[chunking]\nmax_tokens = 100\noverlap_tokens = 100\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("overlap_tokens"));
    }

    #[test]
    fn test_zero_steps_rejected() {
        let file = write_config("[agent]\nmax_steps = 0\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
