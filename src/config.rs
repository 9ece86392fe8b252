use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Startup policy controlling how much of the vector corpus is resident in
/// the in-memory ANN index. Changing the mode requires a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// Load every stored vector into the ANN.
    Ram,
    /// Load at most `hybrid_limit` vectors, first-come first-kept.
    Hybrid,
    /// No ANN; semantic queries fall back to keyword search.
    Disk,
}

impl MemoryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryMode::Ram => "ram",
            MemoryMode::Hybrid => "hybrid",
            MemoryMode::Disk => "disk",
        }
    }
}

/// Daemon configuration, read from `config_dir/config.json`.
///
/// All keys are optional; missing keys (or a missing file) fall back to the
/// defaults below. The configuration is immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_memory_mode")]
    pub memory_mode: MemoryMode,

    /// Max ANN entries when `memory_mode` is `hybrid`.
    #[serde(default = "default_hybrid_limit")]
    pub hybrid_limit: usize,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding backend selector: `ollama`, `onnx`, or `openai`.
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: String,

    #[serde(default = "default_embedding_endpoint")]
    pub embedding_endpoint: String,

    /// OpenAI API key; the `OPENAI_API_KEY` environment variable takes
    /// precedence when set.
    #[serde(default)]
    pub openai_key: Option<String>,

    /// Override for the embedding vector width when the model is not in the
    /// built-in dimension table.
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    /// Lines per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Lines shared between consecutive chunks. Must be < `chunk_size`.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// File extensions the indexer worker accepts (without the dot).
    #[serde(default = "default_index_extensions")]
    pub index_extensions: Vec<String>,

    /// Embedding request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_memory_mode() -> MemoryMode {
    MemoryMode::Ram
}
fn default_hybrid_limit() -> usize {
    1000
}
fn default_embedding_model() -> String {
    "all-minilm".to_string()
}
fn default_embedding_backend() -> String {
    "ollama".to_string()
}
fn default_embedding_endpoint() -> String {
    "http://localhost:11434/api/embeddings".to_string()
}
fn default_chunk_size() -> usize {
    100
}
fn default_chunk_overlap() -> usize {
    10
}
fn default_index_extensions() -> Vec<String> {
    ["cpp", "hpp", "h", "md", "txt", "json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_mode: default_memory_mode(),
            hybrid_limit: default_hybrid_limit(),
            embedding_model: default_embedding_model(),
            embedding_backend: default_embedding_backend(),
            embedding_endpoint: default_embedding_endpoint(),
            openai_key: None,
            embedding_dimensions: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            index_extensions: default_index_extensions(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from a JSON file. A missing file yields the
    /// defaults; a malformed or invalid file is an error so a typo cannot
    /// silently fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let cfg = Config::default();
            cfg.validate()?;
            return Ok(cfg);
        }

        let content = std::fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        match self.embedding_backend.as_str() {
            "ollama" | "onnx" | "openai" => {}
            other => bail!(
                "unknown embedding backend: {:?} (expected ollama, onnx, or openai)",
                other
            ),
        }
        Ok(())
    }

    /// Resolved OpenAI key: environment first, then config.
    pub fn resolved_openai_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.openai_key.clone())
    }
}

/// `~/.config/kestr` on a typical Unix.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("kestr")
}

/// `~/.local/share/kestr` on a typical Unix.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join("kestr")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.memory_mode, MemoryMode::Ram);
        assert_eq!(cfg.hybrid_limit, 1000);
        assert_eq!(cfg.embedding_model, "all-minilm");
        assert_eq!(cfg.embedding_backend, "ollama");
        assert_eq!(cfg.chunk_size, 100);
        assert_eq!(cfg.chunk_overlap, 10);
        assert!(cfg.index_extensions.iter().any(|e| e == "md"));
        cfg.validate().unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/kestr/config.json")).unwrap();
        assert_eq!(cfg.memory_mode, MemoryMode::Ram);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"memory_mode": "hybrid", "hybrid_limit": 42}"#).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.memory_mode, MemoryMode::Hybrid);
        assert_eq!(cfg.hybrid_limit, 42);
        assert_eq!(cfg.embedding_backend, "ollama");
    }

    #[test]
    fn memory_mode_names_are_lowercase() {
        let cfg: Config = serde_json::from_str(r#"{"memory_mode": "disk"}"#).unwrap();
        assert_eq!(cfg.memory_mode, MemoryMode::Disk);
        assert_eq!(cfg.memory_mode.as_str(), "disk");
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let cfg: Config =
            serde_json::from_str(r#"{"chunk_size": 10, "chunk_overlap": 10}"#).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let cfg: Config = serde_json::from_str(r#"{"embedding_backend": "cohere"}"#).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
