//! Query and chunk embedding.
//!
//! [`Embedder`] wraps one configured backend:
//! - **`disabled`**: every call fails; only keyword indexes work.
//! - **`openai`**: `POST /v1/embeddings`, needs `OPENAI_API_KEY`.
//! - **`ollama`**: `POST /api/embed` on a local Ollama instance.
//! - **`local`**: fastembed with a bundled ONNX runtime. The model is
//!   downloaded on first use, then loaded once and reused.
//!
//! # Retry Strategy
//!
//! Embedding is a side-effect-free read, so the HTTP providers retry:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

pub use triage_harness_core::embedding::EmbeddingProvider;

use crate::config::EmbeddingConfig;

/// Provider metadata resolved from configuration.
struct ProviderInfo {
    model: String,
    dims: usize,
}

impl EmbeddingProvider for ProviderInfo {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// A configured embedding backend.
pub struct Embedder {
    config: EmbeddingConfig,
    info: ProviderInfo,
    client: reqwest::Client,
    #[cfg(feature = "local-embeddings-fastembed")]
    local: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

impl Embedder {
    /// Create the backend named by `config.provider`.
    ///
    /// # Errors
    ///
    /// Unknown providers, missing model/dims for HTTP providers, a missing
    /// `OPENAI_API_KEY`, or `local` without the fastembed feature.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let info = match config.provider.as_str() {
            "disabled" => ProviderInfo {
                model: "disabled".to_string(),
                dims: 0,
            },
            "openai" | "ollama" => {
                let model = config.model.clone().ok_or_else(|| {
                    anyhow!("embedding.model required for {} provider", config.provider)
                })?;
                let dims = config.dims.ok_or_else(|| {
                    anyhow!("embedding.dims required for {} provider", config.provider)
                })?;
                if config.provider == "openai" && std::env::var("OPENAI_API_KEY").is_err() {
                    bail!("OPENAI_API_KEY environment variable not set");
                }
                ProviderInfo { model, dims }
            }
            #[cfg(feature = "local-embeddings-fastembed")]
            "local" => {
                let (model, dims) = resolve_local_model(config);
                config_to_fastembed_model(&model)?;
                ProviderInfo { model, dims }
            }
            #[cfg(not(feature = "local-embeddings-fastembed"))]
            "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
            other => bail!("Unknown embedding provider: {}", other),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            info,
            client,
            #[cfg(feature = "local-embeddings-fastembed")]
            local: Default::default(),
        })
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        &self.info
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Texts per provider request when embedding chunks.
    pub fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// Embed a batch of texts, returning one vector per text in order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = match self.config.provider.as_str() {
            "openai" => self.embed_openai(texts).await?,
            "ollama" => self.embed_ollama(texts).await?,
            #[cfg(feature = "local-embeddings-fastembed")]
            "local" => self.embed_local(texts).await?,
            "disabled" => bail!("Embedding provider is disabled"),
            other => bail!("Unknown embedding provider: {}", other),
        };
        if vectors.len() != texts.len() {
            bail!(
                "Embedding provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))
    }

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;
        let body = serde_json::json!({
            "model": self.info.model,
            "input": texts,
        });
        let json = self
            .post_with_retry(
                "https://api.openai.com/v1/embeddings",
                Some(&api_key),
                &body,
                "OpenAI",
            )
            .await?;
        parse_openai_response(&json)
    }

    async fn embed_ollama(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self
            .config
            .url
            .as_deref()
            .unwrap_or("http://localhost:11434");
        let body = serde_json::json!({
            "model": self.info.model,
            "input": texts,
        });
        let json = self
            .post_with_retry(&format!("{}/api/embed", url), None, &body, "Ollama")
            .await?;
        parse_ollama_response(&json)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
        label: &str,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying {} embedding request", label);
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(url).json(body);
            if let Some(key) = bearer {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                        continue;
                    }
                    bail!("{} API error {}: {}", label, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow!("{} connection error ({}): {}", label, url, e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
    }

    #[cfg(feature = "local-embeddings-fastembed")]
    async fn embed_local(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model_name = self.info.model.clone();
        let batch_size = self.config.batch_size;
        let texts = texts.to_vec();
        let slot = self.local.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("Local embedding model lock poisoned"))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(config_to_fastembed_model(&model_name)?)
                        .with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow!("Local embedding model unavailable"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Extract `data[].embedding` arrays from an OpenAI response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    data.iter()
        .map(|item| {
            item.get("embedding")
                .and_then(|e| e.as_array())
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))
        })
        .collect()
}

/// Extract the `embeddings` arrays from an Ollama response.
fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

#[cfg(feature = "local-embeddings-fastembed")]
fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_provider() {
        let embedder = Embedder::new(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.provider().model_name(), "disabled");
        assert_eq!(embedder.provider().dims(), 0);
        assert!(!embedder.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_provider_refuses_to_embed() {
        let embedder = Embedder::new(&EmbeddingConfig::default()).unwrap();
        let err = embedder.embed_query("hello").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_ollama_requires_model() {
        let cfg = EmbeddingConfig {
            provider: "ollama".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(Embedder::new(&cfg).is_err());
    }

    #[test]
    fn test_unknown_provider() {
        let cfg = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(Embedder::new(&cfg).is_err());
    }

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.5, -1.0]}, {"embedding": [1.0, 0.0]}]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![0.5, -1.0], vec![1.0, 0.0]]);
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({ "embeddings": [[0.25, 0.75]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.25, 0.75]]);
        let bad = serde_json::json!({ "embeddings": ["nope"] });
        assert!(parse_ollama_response(&bad).is_err());
    }
}
