//! Embedding backends.
//!
//! Defines the [`Embedder`] capability the indexing pipeline consumes and
//! the concrete backends selected once at startup:
//! - **[`OllamaEmbedder`]** — local Ollama instance (`/api/embeddings`).
//! - **[`OpenAiEmbedder`]** — OpenAI embeddings API.
//! - **`LocalEmbedder`** — in-process inference via fastembed, behind the
//!   `local-embeddings` feature (selected with `embedding_backend = "onnx"`).
//!
//! Also provides the f32↔BLOB helpers used to persist vectors in SQLite:
//! each `f32` is stored as 4 little-endian bytes. The store is host-local,
//! so the layout does not need to be portable.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

/// Capability interface for embedding generation. Backends are constructed
/// once at startup and shared immutably across tasks.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single text. Errors are transient by contract: the caller
    /// stores the chunk without a vector and moves on.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Width of the vectors this backend produces.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Known embedding model widths. `embedding_dimensions` in the config
/// overrides this table for models not listed here.
fn model_dimensions(model: &str) -> Option<usize> {
    match model {
        "all-minilm" | "all-minilm-l6-v2" => Some(384),
        "bge-small" | "bge-small-en-v1.5" => Some(384),
        "nomic-embed-text" => Some(768),
        "mxbai-embed-large" => Some(1024),
        "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "text-embedding-ada-002" => Some(1536),
        _ => None,
    }
}

fn resolve_dimension(config: &Config, model: &str) -> Result<usize> {
    config
        .embedding_dimensions
        .or_else(|| model_dimensions(model))
        .ok_or_else(|| {
            anyhow!(
                "unknown embedding model {:?}; set embedding_dimensions in the config",
                model
            )
        })
}

/// Constructs the backend selected by `embedding_backend`.
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedding_backend.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "onnx" => Ok(Arc::new(local::LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "onnx" => bail!("the onnx backend requires building with --features local-embeddings"),
        other => bail!("unknown embedding backend: {:?}", other),
    }
}

// ============ Ollama ============

/// Embedding backend calling a local Ollama instance.
pub struct OllamaEmbedder {
    model: String,
    endpoint: String,
    dims: usize,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &Config) -> Result<Self> {
        let model = config.embedding_model.clone();
        let dims = resolve_dimension(config, &model)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            model,
            endpoint: config.embedding_endpoint.clone(),
            dims,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("ollama request failed (is Ollama running?): {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("ollama API error {}: {}", status, detail);
        }

        let json: serde_json::Value = response.json().await?;
        parse_ollama_response(&json)
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("invalid ollama response: missing embedding array"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ OpenAI ============

/// Embedding backend calling the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    model: String,
    api_key: String,
    dims: usize,
    client: reqwest::Client,
}

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

impl OpenAiEmbedder {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .resolved_openai_key()
            .ok_or_else(|| anyhow!("openai backend selected but no API key configured"))?;

        // The ollama-centric default model name does not exist on the
        // OpenAI API.
        let model = if config.embedding_model == "all-minilm" {
            "text-embedding-3-small".to_string()
        } else {
            config.embedding_model.clone()
        };

        let dims = resolve_dimension(config, &model)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            model,
            api_key,
            dims,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(OPENAI_EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("openai API error {}: {}", status, detail);
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    if let Some(error) = json.get("error") {
        bail!("openai API error: {}", error);
    }

    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("invalid openai response: missing data[0].embedding"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-embeddings")]
mod local {
    use super::*;
    use std::sync::Mutex;

    /// In-process embedding via fastembed. The model is downloaded on first
    /// use and cached; after that no network access is needed.
    pub struct LocalEmbedder {
        model_name: String,
        dims: usize,
        model: Arc<Mutex<fastembed::TextEmbedding>>,
    }

    impl LocalEmbedder {
        pub fn new(config: &Config) -> Result<Self> {
            let model_name = config.embedding_model.clone();
            let fastembed_model = match model_name.as_str() {
                "all-minilm" | "all-minilm-l6-v2" => fastembed::EmbeddingModel::AllMiniLML6V2,
                "bge-small" | "bge-small-en-v1.5" => fastembed::EmbeddingModel::BGESmallENV15,
                "nomic-embed-text" => fastembed::EmbeddingModel::NomicEmbedTextV1,
                other => bail!("unknown local embedding model: {:?}", other),
            };
            let dims = resolve_dimension(config, &model_name)?;

            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
            )
            .map_err(|e| anyhow!("failed to initialize local embedding model: {}", e))?;

            Ok(Self {
                model_name,
                dims,
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let model = self.model.clone();
            let text = text.to_string();

            let mut vectors = tokio::task::spawn_blocking(move || {
                let mut model = model.lock().expect("embedding model mutex poisoned");
                model
                    .embed(vec![text], None)
                    .map_err(|e| anyhow!("local embedding failed: {}", e))
            })
            .await??;

            vectors
                .pop()
                .ok_or_else(|| anyhow!("empty local embedding result"))
        }

        fn dimension(&self) -> usize {
            self.dims
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }
    }
}

// ============ Vector <-> BLOB ============

/// Encodes a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decodes a BLOB back into a float vector. A trailing partial value is
/// discarded.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn blob_length_is_four_bytes_per_float() {
        assert_eq!(vec_to_blob(&[1.0, 2.0, 3.0]).len(), 12);
        assert!(vec_to_blob(&[]).is_empty());
    }

    #[test]
    fn known_model_dimensions() {
        assert_eq!(model_dimensions("all-minilm"), Some(384));
        assert_eq!(model_dimensions("nomic-embed-text"), Some(768));
        assert_eq!(model_dimensions("text-embedding-3-small"), Some(1536));
        assert_eq!(model_dimensions("made-up-model"), None);
    }

    #[test]
    fn config_override_wins_over_table() {
        let mut config = Config::default();
        config.embedding_dimensions = Some(512);
        assert_eq!(resolve_dimension(&config, "all-minilm").unwrap(), 512);
    }

    #[test]
    fn unknown_model_without_override_is_an_error() {
        let config = Config::default();
        assert!(resolve_dimension(&config, "made-up-model").is_err());
    }

    #[test]
    fn parses_ollama_embedding_array() {
        let json = serde_json::json!({ "embedding": [0.1, 0.2, 0.3] });
        let vec = parse_ollama_response(&json).unwrap();
        assert_eq!(vec.len(), 3);
        assert!((vec[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn ollama_response_without_embedding_is_an_error() {
        let json = serde_json::json!({ "error": "model not found" });
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn parses_openai_data_embedding() {
        let json = serde_json::json!({
            "data": [ { "embedding": [0.5, -0.5] } ],
            "model": "text-embedding-3-small"
        });
        let vec = parse_openai_response(&json).unwrap();
        assert_eq!(vec, vec![0.5, -0.5]);
    }

    #[test]
    fn openai_error_body_is_surfaced() {
        let json = serde_json::json!({ "error": { "message": "invalid key" } });
        assert!(parse_openai_response(&json).is_err());
    }

    #[test]
    fn unknown_backend_fails_construction() {
        let mut config = Config::default();
        config.embedding_backend = "cohere".to_string();
        assert!(create_embedder(&config).is_err());
    }
}
